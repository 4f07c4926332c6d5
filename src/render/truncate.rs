//! 截断 - 超过字节上限后丢弃后续内容，只统计丢弃的行数

use anyhow::Result;

use super::sink::BodyPart;
use super::writer::PartWriter;

/// 截断缓冲
///
/// 按整行写入；越过上限的那一行及之后的所有内容都被丢弃。
/// 丢弃的行数包括最后一个没有换行符的残行。
#[derive(Debug, Clone)]
pub struct TruncatingBuffer {
    buf: String,
    max_bytes: usize,
    current: usize,
    dropped_newlines: usize,
    ends_with_newline: bool,
    add_note: bool,
}

impl TruncatingBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buf: String::new(),
            max_bytes,
            current: 0,
            dropped_newlines: 0,
            ends_with_newline: true,
            add_note: false,
        }
    }

    /// 取出内容时追加 `[... N lines stripped ...]`
    pub fn with_note(mut self) -> Self {
        self.add_note = true;
        self
    }

    pub fn write(&mut self, text: &str) {
        let mut rest = text;
        if self.current <= self.max_bytes {
            let mut written = 0;
            for line in text.split_inclusive('\n') {
                self.current += line.len();
                if self.current <= self.max_bytes {
                    self.buf.push_str(line);
                    written += line.len();
                } else {
                    rest = &text[written..];
                    break;
                }
            }
        }

        if self.current > self.max_bytes {
            self.dropped_newlines += rest.matches('\n').count();
            if let Some(last) = rest.chars().last() {
                self.ends_with_newline = last == '\n';
            }
        }
    }

    /// 丢弃的行数
    pub fn dropped_line_count(&self) -> usize {
        self.dropped_newlines + usize::from(!self.ends_with_newline)
    }

    pub fn is_truncated(&self) -> bool {
        self.dropped_line_count() > 0
    }

    /// 回到起点重新计数
    pub fn reset(&mut self) {
        self.buf.clear();
        self.current = 0;
        self.dropped_newlines = 0;
        self.ends_with_newline = true;
    }

    /// 当前内容（含提示行）
    pub fn value(&self) -> String {
        let dropped = self.dropped_line_count();
        if self.add_note && dropped > 0 {
            format!("{}\n[... {} lines stripped ...]\n", self.buf, dropped)
        } else {
            self.buf.clone()
        }
    }

    /// 取出内容并复位
    pub fn take(&mut self) -> String {
        let value = self.value();
        self.reset();
        value
    }
}

/// 截断策略
pub struct TruncateWriter {
    buf: TruncatingBuffer,
}

impl TruncateWriter {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buf: TruncatingBuffer::new(max_bytes).with_note(),
        }
    }
}

impl PartWriter for TruncateWriter {
    fn name(&self) -> &'static str {
        "truncate"
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.buf.write(text);
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<BodyPart>> {
        Ok(vec![BodyPart::from_text(self.buf.take())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_limit_has_no_note() {
        let mut buf = TruncatingBuffer::new(100).with_note();
        buf.write("line one\nline two\n");
        assert_eq!(buf.dropped_line_count(), 0);
        assert_eq!(buf.value(), "line one\nline two\n");
    }

    #[test]
    fn test_exact_limit_is_kept() {
        let mut buf = TruncatingBuffer::new(6).with_note();
        buf.write("abc\nd\n");
        assert!(!buf.is_truncated());
        assert_eq!(buf.value(), "abc\nd\n");
    }

    #[test]
    fn test_counts_dropped_lines() {
        let mut buf = TruncatingBuffer::new(10).with_note();
        buf.write("12345\n");
        buf.write("67890\nabc\n");
        buf.write("def\nghi");
        // 越界行 "67890\n" 及之后共 4 行
        assert_eq!(buf.dropped_line_count(), 4);
        assert_eq!(buf.value(), "12345\n\n[... 4 lines stripped ...]\n");
    }

    #[test]
    fn test_partial_last_line_counts() {
        let mut buf = TruncatingBuffer::new(3);
        buf.write("ab\ncdef");
        assert_eq!(buf.dropped_line_count(), 1);
        assert_eq!(buf.value(), "ab\n");
    }

    #[test]
    fn test_note_only_when_requested() {
        let mut buf = TruncatingBuffer::new(2);
        buf.write("abc\n");
        assert!(buf.is_truncated());
        assert_eq!(buf.value(), "");
    }

    #[test]
    fn test_reset_starts_over() {
        let mut buf = TruncatingBuffer::new(4).with_note();
        buf.write("abcdef\n");
        assert!(buf.is_truncated());
        buf.reset();
        buf.write("ab\n");
        assert!(!buf.is_truncated());
        assert_eq!(buf.take(), "ab\n");
        assert_eq!(buf.value(), "");
    }

    #[test]
    fn test_writer_appends_note() {
        let mut writer: Box<dyn PartWriter> = Box::new(TruncateWriter::new(5));
        writer.write("1234\n5678\n9\n").unwrap();
        let parts = writer.finish().unwrap();
        assert_eq!(
            parts.into_iter().next().unwrap().into_text().unwrap(),
            "1234\n\n[... 2 lines stripped ...]\n"
        );
    }
}
