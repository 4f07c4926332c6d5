//! 分片写入器接口
//!
//! 正文生成器只面向 [`PartWriter`] 写文本，并在自然分界点调用钩子；
//! 具体的超长策略（截断、只留链接、拆分）都在写入器里实现。

use anyhow::Result;

use super::sink::{BodyPart, SpoolBuffer, SpoolConfig};

/// 内容差异的链接行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLink {
    /// 动作行，如 `Modified: trunk/a.c\n`
    pub action: String,
    pub url: String,
}

/// 分片写入器
pub trait PartWriter {
    /// 策略名称（日志用）
    fn name(&self) -> &'static str;

    fn write(&mut self, text: &str) -> Result<()>;

    /// 元数据和路径列表写完，差异列表即将开始
    fn end_summary(&mut self) -> Result<()> {
        Ok(())
    }

    /// 一个内容差异块写完
    fn end_content_diff(&mut self, _link: Option<&DiffLink>) -> Result<()> {
        Ok(())
    }

    /// 一个变更的属性差异写完
    fn end_property_diffs(&mut self) -> Result<()> {
        Ok(())
    }

    /// 结束写入，产出 1..N 个分片
    fn finish(self: Box<Self>) -> Result<Vec<BodyPart>>;
}

/// 不限大小
pub struct PlainWriter {
    buf: SpoolBuffer,
}

impl PlainWriter {
    pub fn new(spool: SpoolConfig) -> Self {
        Self {
            buf: SpoolBuffer::new(spool),
        }
    }
}

impl PartWriter for PlainWriter {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.buf.write(text)
    }

    fn finish(self: Box<Self>) -> Result<Vec<BodyPart>> {
        Ok(vec![BodyPart::single(self.buf)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_writer_ignores_hooks() {
        let mut writer: Box<dyn PartWriter> = Box::new(PlainWriter::new(SpoolConfig::in_memory()));
        writer.write("Author: alice\n").unwrap();
        writer.end_summary().unwrap();
        writer.write("diff\n").unwrap();
        writer.end_content_diff(None).unwrap();
        let parts = writer.finish().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(
            parts.into_iter().next().unwrap().into_text().unwrap(),
            "Author: alice\ndiff\n"
        );
    }
}
