//! sendmail 渠道 - 把 RFC 822 文本通过管道交给 sendmail 兼容命令

use crate::notification::channel::{Envelope, RenderedMessage, SendResult, Transport};
use anyhow::{anyhow, Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use tracing::{error, info, warn};

/// 常见的 sendmail 安装位置（PATH 不完整时使用）
const FALLBACK_LOCATIONS: &[&str] = &["/usr/sbin/sendmail", "/usr/lib/sendmail"];

/// sendmail 渠道配置
#[derive(Debug, Clone)]
pub struct SendmailConfig {
    /// 命令及其固定参数
    pub command: Vec<String>,
}

impl SendmailConfig {
    /// 未配置命令时在 PATH 和常见位置查找 sendmail
    pub fn locate() -> Result<Self> {
        let program = which::which("sendmail")
            .ok()
            .or_else(|| {
                FALLBACK_LOCATIONS
                    .iter()
                    .map(PathBuf::from)
                    .find(|p| p.exists())
            })
            .ok_or_else(|| anyhow!("sendmail not found in PATH"))?;
        Ok(Self {
            command: vec![program.to_string_lossy().to_string()],
        })
    }
}

/// sendmail 渠道
pub struct SendmailTransport {
    config: SendmailConfig,
}

impl SendmailTransport {
    pub fn new(config: SendmailConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(anyhow!("sendmail command is empty"));
        }
        Ok(Self { config })
    }

    /// 完整参数：固定参数 + `-f sender` + 收件人
    fn arguments(&self, envelope: &Envelope) -> Vec<String> {
        let mut args: Vec<String> = self.config.command[1..].to_vec();
        args.push("-f".to_string());
        args.push(envelope.sender.clone());
        args.extend(envelope.recipients.iter().cloned());
        args
    }
}

impl Transport for SendmailTransport {
    fn name(&self) -> &str {
        "sendmail"
    }

    fn send(&self, envelope: &Envelope, message: &RenderedMessage) -> Result<SendResult> {
        if envelope.recipients.is_empty() {
            return Ok(SendResult::Skipped("no recipients".to_string()));
        }

        let program = &self.config.command[0];
        let mut child = Command::new(program)
            .args(self.arguments(envelope))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", program))?;

        // 写入放到单独线程，同时读取 stderr；无论写入是否成功都回收子进程
        let stdin = child.stdin.take();
        let text = message.to_rfc822();
        let writer = thread::spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(text.as_bytes()),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "sendmail stdin unavailable",
            )),
        });
        let output = child
            .wait_with_output()
            .with_context(|| format!("Failed to wait for {}", program))?;
        let written = writer
            .join()
            .map_err(|_| anyhow!("sendmail writer thread panicked"))?;

        if output.status.success() {
            written.context("Failed to pipe message into sendmail")?;
            info!(
                transport = "sendmail",
                recipients = envelope.recipients.len(),
                subject = %message.subject,
                "Message sent successfully"
            );
            Ok(SendResult::Sent)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if let Err(e) = &written {
                warn!(transport = "sendmail", error = %e, "Message was not fully written");
            }
            error!(
                transport = "sendmail",
                status = %output.status,
                error = %stderr,
                "Failed to send message"
            );
            Ok(SendResult::Failed(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(recipients: &[&str]) -> Envelope {
        Envelope {
            sender: "svn@example.org".to_string(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn message() -> RenderedMessage {
        RenderedMessage {
            subject: "r1 - a.c".to_string(),
            headers: Vec::new(),
            body: "body\n".to_string(),
            groups: vec!["core".to_string()],
            revision: Some(1),
            part: None,
        }
    }

    #[test]
    fn test_arguments() {
        let transport = SendmailTransport::new(SendmailConfig {
            command: vec!["/usr/sbin/sendmail".to_string(), "-oi".to_string()],
        })
        .unwrap();
        assert_eq!(
            transport.arguments(&envelope(&["a@example.org", "b@example.org"])),
            vec!["-oi", "-f", "svn@example.org", "a@example.org", "b@example.org"]
        );
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(SendmailTransport::new(SendmailConfig { command: Vec::new() }).is_err());
    }

    #[test]
    fn test_without_recipients_is_skipped() {
        let transport = SendmailTransport::new(SendmailConfig {
            command: vec!["/nonexistent/sendmail".to_string()],
        })
        .unwrap();
        let result = transport.send(&envelope(&[]), &message()).unwrap();
        assert!(matches!(result, SendResult::Skipped(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_pipes_message_to_command() {
        // sh -c 忽略追加的信封参数
        let transport = SendmailTransport::new(SendmailConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "cat > /dev/null".to_string(),
                "sendmail".to_string(),
            ],
        })
        .unwrap();
        let result = transport.send(&envelope(&["a@example.org"]), &message()).unwrap();
        assert_eq!(result, SendResult::Sent);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_is_failure() {
        let transport = SendmailTransport::new(SendmailConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "cat > /dev/null; echo refused >&2; exit 75".to_string(),
                "sendmail".to_string(),
            ],
        })
        .unwrap();
        match transport.send(&envelope(&["a@example.org"]), &message()).unwrap() {
            SendResult::Failed(detail) => assert!(detail.contains("refused")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_command_exiting_before_reading_is_failure() {
        let transport = SendmailTransport::new(SendmailConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo unavailable >&2; exit 69".to_string(),
                "sendmail".to_string(),
            ],
        })
        .unwrap();
        let mut large = message();
        large.body = "x".repeat(4 * 1024 * 1024);
        match transport.send(&envelope(&["a@example.org"]), &large).unwrap() {
            SendResult::Failed(detail) => {
                assert!(detail.contains("unavailable"));
                assert!(detail.contains("69"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_large_message_with_chatty_stderr() {
        // 先往 stderr 写满管道再读 stdin
        let transport = SendmailTransport::new(SendmailConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "head -c 200000 /dev/zero >&2; cat > /dev/null".to_string(),
                "sendmail".to_string(),
            ],
        })
        .unwrap();
        let mut large = message();
        large.body = "y".repeat(1024 * 1024);
        let result = transport.send(&envelope(&["a@example.org"]), &large).unwrap();
        assert_eq!(result, SendResult::Sent);
    }
}
