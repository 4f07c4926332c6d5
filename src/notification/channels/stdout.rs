//! 标准输出渠道 - 调试模式或未配置投递方式时使用

use crate::notification::channel::{Envelope, RenderedMessage, SendResult, Transport};
use anyhow::{Context, Result};
use std::io::{self, Write};
use std::sync::Mutex;
use tracing::debug;

/// 把通知渲染到标准输出（或任意写入端）
pub struct StdoutTransport {
    out: Mutex<Box<dyn Write + Send>>,
}

impl StdoutTransport {
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn preamble(message: &RenderedMessage) -> String {
        let groups: Vec<String> = message.groups.iter().map(|g| format!("[{}]", g)).collect();
        format!(
            ">>> Notification for the following group{}:\n  {}\n\n",
            if groups.len() == 1 { "" } else { "s" },
            groups.join(",\n  ")
        )
    }
}

impl Default for StdoutTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for StdoutTransport {
    fn name(&self) -> &str {
        "stdout"
    }

    fn requires_recipients(&self) -> bool {
        false
    }

    fn send(&self, envelope: &Envelope, message: &RenderedMessage) -> Result<SendResult> {
        let mut text = Self::preamble(message);
        if envelope.recipients.is_empty() {
            let groups: Vec<String> = message.groups.iter().map(|g| format!("[{}]", g)).collect();
            text.push_str(&format!("No recipients found for {}\n", groups.join(", ")));
        }
        text.push_str(&message.to_rfc822());
        if !text.ends_with('\n') {
            text.push('\n');
        }

        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("stdout writer poisoned"))?;
        out.write_all(text.as_bytes())
            .context("Failed to write notification to stdout")?;
        out.flush()?;

        debug!(groups = ?message.groups, bytes = text.len(), "Notification written to stdout");
        Ok(SendResult::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// 测试用的共享缓冲
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn message(groups: &[&str]) -> RenderedMessage {
        RenderedMessage {
            subject: "r7 - a.c".to_string(),
            headers: vec![("From".to_string(), "alice".to_string())],
            body: "Author: alice\n".to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            revision: Some(7),
            part: None,
        }
    }

    #[test]
    fn test_preamble_lists_groups() {
        let buf = SharedBuf::default();
        let transport = StdoutTransport::with_writer(Box::new(buf.clone()));
        let envelope = Envelope {
            sender: "alice".to_string(),
            recipients: vec!["commits@example.org".to_string()],
        };
        let result = transport.send(&envelope, &message(&["core", "docs"])).unwrap();
        assert_eq!(result, SendResult::Sent);

        let text = buf.text();
        assert!(text.starts_with(
            ">>> Notification for the following groups:\n  [core],\n  [docs]\n\nFrom: alice\n"
        ));
        assert!(text.contains("Subject: r7 - a.c\n"));
        assert!(text.ends_with("Author: alice\n"));
    }

    #[test]
    fn test_missing_recipients_are_reported() {
        let buf = SharedBuf::default();
        let transport = StdoutTransport::with_writer(Box::new(buf.clone()));
        let envelope = Envelope {
            sender: "alice".to_string(),
            recipients: Vec::new(),
        };
        transport.send(&envelope, &message(&["core"])).unwrap();

        let text = buf.text();
        assert!(text.starts_with(">>> Notification for the following group:\n  [core]\n\n"));
        assert!(text.contains("No recipients found for [core]\n"));
        assert!(!transport.requires_recipients());
    }
}
