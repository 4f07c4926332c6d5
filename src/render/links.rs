//! 只留链接 - 正文超长时改发动作行和差异链接
//!
//! 完整正文写入一个不带提示的截断缓冲；同时把元数据、路径列表
//! 以及每个内容差异的动作行 + URL 抄写到链接缓冲。结束时若完整正文
//! 被截断，就改用链接缓冲。

use anyhow::Result;
use tracing::info;

use super::sink::BodyPart;
use super::truncate::TruncatingBuffer;
use super::writer::{DiffLink, PartWriter};
use crate::event::Change;

const LINKS_NOTE: &str =
    "\n[This mail would be too long, it was shortened to contain the URLs only.]\n\n";
const NO_LINKS_NOTE: &str = "\n[This mail would be too long, it should contain the URLs only, \
                             but no browser base url was configured...]\n";

/// 仓库浏览地址（ViewVC 风格的查询参数）
#[derive(Debug, Clone)]
pub struct BrowserLinks {
    base: String,
}

impl BrowserLinks {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn with_query(&self, path: Option<&str>, query: &str) -> String {
        let url = match path {
            Some(p) => format!("{}/{}", self.base, p),
            None => self.base.clone(),
        };
        let sep = if url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", url, sep, query)
    }

    /// 修订摘要页
    pub fn revision_url(&self, revision: u64) -> String {
        self.with_query(None, &format!("view=rev&rev={}", revision))
    }

    /// 单个变更的内容差异页；复制的目录没有内容差异
    pub fn content_diff_url(&self, change: &Change, revision: u64) -> Option<String> {
        let base_revision = change.base_revision(revision);
        let path = if change.was_deleted() {
            change.base_path()
        } else {
            change.path.as_str()
        };
        let path = if change.is_directory {
            format!("{}/", path)
        } else {
            path.to_string()
        };

        let query = if change.was_deleted() {
            format!("view=auto&rev={}", base_revision)
        } else if change.was_copied() {
            if change.is_directory {
                return None;
            }
            format!(
                "view=diff&rev={}&p1={}&r1={}&p2={}&r2={}",
                revision,
                change.base_path(),
                base_revision,
                change.path,
                revision
            )
        } else if change.was_added() {
            format!("view=auto&rev={}", revision)
        } else {
            format!("view=diff&r1={}&r2={}", base_revision, revision)
        };
        Some(self.with_query(Some(&path), &query))
    }
}

/// 只留链接策略
pub struct ShowLinksWriter {
    primary: TruncatingBuffer,
    links: String,
    /// 链接缓冲本身的上限（`/truncate` 子模式）
    links_limit: Option<usize>,
    links_configured: bool,
    in_summary: bool,
}

impl ShowLinksWriter {
    /// `links_configured`: 组是否配置了浏览地址
    pub fn new(max_bytes: usize, links_configured: bool) -> Self {
        Self {
            primary: TruncatingBuffer::new(max_bytes),
            links: String::new(),
            links_limit: None,
            links_configured,
            in_summary: true,
        }
    }

    pub fn with_truncate(mut self, max_bytes: usize) -> Self {
        self.links_limit = Some(max_bytes);
        self
    }

    fn links_content(&self) -> String {
        match self.links_limit {
            Some(limit) => {
                let mut buf = TruncatingBuffer::new(limit).with_note();
                buf.write(&self.links);
                buf.take()
            }
            None => self.links.clone(),
        }
    }
}

impl PartWriter for ShowLinksWriter {
    fn name(&self) -> &'static str {
        "showurls"
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.primary.write(text);
        if self.in_summary {
            self.links.push_str(text);
        }
        Ok(())
    }

    fn end_summary(&mut self) -> Result<()> {
        if !self.in_summary {
            return Ok(());
        }
        self.in_summary = false;
        self.links.push_str(if self.links_configured {
            LINKS_NOTE
        } else {
            NO_LINKS_NOTE
        });
        Ok(())
    }

    fn end_content_diff(&mut self, link: Option<&DiffLink>) -> Result<()> {
        if let Some(link) = link {
            self.links.push_str(&link.action);
            self.links.push_str(&format!("URL: {}\n", link.url));
            self.links.push('\n');
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<BodyPart>> {
        let dropped = self.primary.dropped_line_count();
        if dropped == 0 {
            return Ok(vec![BodyPart::from_text(self.primary.value())]);
        }
        info!(dropped_lines = dropped, "Body too long, sending links only");
        Ok(vec![BodyPart::from_text(self.links_content())])
    }
}
