//! 拆分 - 在差异块之间把正文切成多个不超过上限的分片
//!
//! # 流程
//! 1. 元数据和路径列表同时写入摘要缓冲
//! 2. 路径列表写完后整体转入最终缓冲，超过上限就切一刀
//! 3. 每个差异块写完后转入最终缓冲；放不下时先切一刀
//! 4. 结束时强制切最后一刀
//!
//! 分片数超过丢弃阈值时，所有分片作废，只发送摘要。

use anyhow::Result;
use tracing::{info, warn};

use super::sink::{BodyPart, SpoolBuffer, SpoolConfig};
use super::truncate::TruncatingBuffer;
use super::writer::{DiffLink, PartWriter};

/// 差异块暂存区：普通或截断
enum BlockBuffer {
    Plain(String),
    Truncating(TruncatingBuffer),
}

impl BlockBuffer {
    fn new(max_bytes: usize, truncate: bool) -> Self {
        if truncate {
            Self::Truncating(TruncatingBuffer::new(max_bytes).with_note())
        } else {
            Self::Plain(String::new())
        }
    }

    fn write(&mut self, text: &str) {
        match self {
            Self::Plain(buf) => buf.push_str(text),
            Self::Truncating(buf) => buf.write(text),
        }
    }

    fn take(&mut self) -> String {
        match self {
            Self::Plain(buf) => std::mem::take(buf),
            Self::Truncating(buf) => buf.take(),
        }
    }
}

/// 按分片组织的缓冲
pub struct SplittingBuffer {
    spool: SpoolConfig,
    current: SpoolBuffer,
    parts: Vec<SpoolBuffer>,
}

impl SplittingBuffer {
    pub fn new(spool: SpoolConfig) -> Self {
        Self {
            current: SpoolBuffer::new(spool.clone()),
            spool,
            parts: Vec::new(),
        }
    }

    pub fn write(&mut self, text: &str) -> Result<()> {
        self.current.write(text)
    }

    /// 当前分片已写入的字节数
    pub fn current_len(&self) -> usize {
        self.current.len()
    }

    /// 结束当前分片；空分片不计
    pub fn split(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let full = std::mem::replace(&mut self.current, SpoolBuffer::new(self.spool.clone()));
        self.parts.push(full);
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn into_parts(self) -> Vec<SpoolBuffer> {
        self.parts
    }
}

/// 拆分策略
pub struct SplitWriter {
    max_bytes: usize,
    drop_threshold: Option<usize>,
    /// 当前差异块
    scratch: BlockBuffer,
    /// 丢弃回退时使用的摘要
    summary: BlockBuffer,
    in_summary: bool,
    output: SplittingBuffer,
}

impl SplitWriter {
    pub fn new(max_bytes: usize, spool: SpoolConfig) -> Self {
        Self {
            max_bytes,
            drop_threshold: None,
            scratch: BlockBuffer::new(max_bytes, false),
            summary: BlockBuffer::new(max_bytes, false),
            in_summary: true,
            output: SplittingBuffer::new(spool),
        }
    }

    /// 每个差异块再单独截断
    pub fn with_truncate(mut self) -> Self {
        self.scratch = BlockBuffer::new(self.max_bytes, true);
        self.summary = BlockBuffer::new(self.max_bytes, true);
        self
    }

    pub fn with_drop_threshold(mut self, threshold: Option<usize>) -> Self {
        self.drop_threshold = threshold;
        self
    }

    /// 当前分片非空时补一个空行并切分
    fn close_part(&mut self) -> Result<()> {
        if self.output.current_len() > 0 {
            self.output.write("\n")?;
            self.output.split();
        }
        Ok(())
    }

    /// 把暂存的差异块转入输出，放不下时先切分
    fn flush_block(&mut self) -> Result<()> {
        let value = self.scratch.take();
        if value.is_empty() {
            return Ok(());
        }
        if self.output.current_len() > 0
            && self.output.current_len() + value.len() > self.max_bytes
        {
            self.close_part()?;
        }
        self.output.write(&value)
    }
}

impl PartWriter for SplitWriter {
    fn name(&self) -> &'static str {
        "split"
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.scratch.write(text);
        if self.in_summary {
            self.summary.write(text);
        }
        Ok(())
    }

    fn end_summary(&mut self) -> Result<()> {
        if !self.in_summary {
            return Ok(());
        }
        self.in_summary = false;
        let value = self.scratch.take();
        self.output.write(&value)?;
        if self.output.current_len() > self.max_bytes {
            self.close_part()?;
        }
        Ok(())
    }

    fn end_content_diff(&mut self, _link: Option<&DiffLink>) -> Result<()> {
        self.flush_block()
    }

    fn end_property_diffs(&mut self) -> Result<()> {
        self.flush_block()
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<BodyPart>> {
        self.end_summary()?;
        self.flush_block()?;
        self.close_part()?;

        let total = self.output.part_count();
        match total {
            0 => return Ok(vec![BodyPart::from_text(String::new())]),
            1 => {
                let part: Vec<BodyPart> =
                    self.output.into_parts().into_iter().map(BodyPart::single).collect();
                return Ok(part);
            }
            _ => {}
        }

        if let Some(limit) = self.drop_threshold.filter(|limit| total > *limit) {
            warn!(parts = total, limit, "Too many parts, sending the summary only");
            let mut summary = self.summary.take();
            summary.push_str(&format!(
                "\n[This commit notification would consist of {} parts, \
                 \nwhich exceeds the limit of {} ones, so it was shortened \
                 to the summary.]\n",
                total, limit
            ));
            return Ok(vec![BodyPart::from_text(summary)]);
        }

        info!(parts = total, "Notification split");
        Ok(self
            .output
            .into_parts()
            .into_iter()
            .enumerate()
            .map(|(idx, body)| BodyPart::numbered(body, idx + 1, total))
            .collect())
    }
}
