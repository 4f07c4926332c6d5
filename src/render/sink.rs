//! 输出缓冲 - 内存缓冲，超过阈值后转存到匿名临时文件
//!
//! 临时文件由 `tempfile::tempfile` 创建，创建时即已 unlink，
//! 进程无论以何种方式退出都不会残留。

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tracing::debug;

use crate::config::GeneralConfig;

/// 转存设置
#[derive(Debug, Clone)]
pub struct SpoolConfig {
    /// 超过该字节数时写入临时文件
    pub threshold: usize,
    pub tempdir: Option<PathBuf>,
}

impl SpoolConfig {
    /// 始终留在内存
    pub fn in_memory() -> Self {
        Self {
            threshold: usize::MAX,
            tempdir: None,
        }
    }

    pub fn from_general(general: &GeneralConfig) -> Self {
        Self {
            threshold: general.spill_threshold,
            tempdir: general.tempdir.clone(),
        }
    }
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// 可转存的文本缓冲
#[derive(Debug)]
pub struct SpoolBuffer {
    config: SpoolConfig,
    memory: String,
    file: Option<File>,
    len: usize,
}

impl SpoolBuffer {
    pub fn new(config: SpoolConfig) -> Self {
        Self {
            config,
            memory: String::new(),
            file: None,
            len: 0,
        }
    }

    pub fn from_string(text: String) -> Self {
        Self {
            config: SpoolConfig::in_memory(),
            len: text.len(),
            memory: text,
            file: None,
        }
    }

    pub fn write(&mut self, text: &str) -> Result<()> {
        self.len += text.len();
        if let Some(file) = self.file.as_mut() {
            file.write_all(text.as_bytes())
                .context("Failed to write spool file")?;
            return Ok(());
        }
        self.memory.push_str(text);
        if self.memory.len() > self.config.threshold {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        let mut file = match &self.config.tempdir {
            Some(dir) => tempfile::tempfile_in(dir),
            None => tempfile::tempfile(),
        }
        .context("Failed to create spool file")?;
        file.write_all(self.memory.as_bytes())
            .context("Failed to write spool file")?;
        debug!(bytes = self.memory.len(), "Buffer spilled to temporary file");
        self.memory = String::new();
        self.file = Some(file);
        Ok(())
    }

    /// 已写入的字节数
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_spilled(&self) -> bool {
        self.file.is_some()
    }

    /// 读出全部内容
    pub fn into_string(self) -> Result<String> {
        match self.file {
            None => Ok(self.memory),
            Some(mut file) => {
                file.seek(SeekFrom::Start(0))?;
                let mut text = String::with_capacity(self.len);
                file.read_to_string(&mut text)
                    .context("Failed to read spool file")?;
                Ok(text)
            }
        }
    }
}

/// 通知正文的一个分片
#[derive(Debug)]
pub struct BodyPart {
    body: SpoolBuffer,
    /// 拆分时的 (序号, 总数)，从 1 开始
    pub position: Option<(usize, usize)>,
}

impl BodyPart {
    pub fn single(body: SpoolBuffer) -> Self {
        Self {
            body,
            position: None,
        }
    }

    pub fn numbered(body: SpoolBuffer, index: usize, total: usize) -> Self {
        Self {
            body,
            position: Some((index, total)),
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::single(SpoolBuffer::from_string(text.into()))
    }

    /// `[i/N]` 标记
    pub fn marker(&self) -> Option<String> {
        self.position.map(|(i, n)| format!("[{}/{}]", i, n))
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn into_text(self) -> Result<String> {
        self.body.into_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_buffer_stays_in_memory() {
        let mut buf = SpoolBuffer::new(SpoolConfig {
            threshold: 100,
            tempdir: None,
        });
        buf.write("hello ").unwrap();
        buf.write("world").unwrap();
        assert!(!buf.is_spilled());
        assert_eq!(buf.len(), 11);
        assert_eq!(buf.into_string().unwrap(), "hello world");
    }

    #[test]
    fn test_large_buffer_spills_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = SpoolBuffer::new(SpoolConfig {
            threshold: 8,
            tempdir: Some(dir.path().to_path_buf()),
        });
        buf.write("0123456789\n").unwrap();
        assert!(buf.is_spilled());
        buf.write("more\n").unwrap();
        assert_eq!(buf.len(), 16);
        assert_eq!(buf.into_string().unwrap(), "0123456789\nmore\n");
        // 匿名文件不会出现在目录里
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_body_part_marker() {
        let part = BodyPart::numbered(SpoolBuffer::from_string("x".to_string()), 2, 5);
        assert_eq!(part.marker().as_deref(), Some("[2/5]"));
        assert_eq!(BodyPart::from_text("y").marker(), None);
    }
}
