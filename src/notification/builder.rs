//! 通知系统构建器 - 按配置选择投递渠道

use super::channel::Transport;
use super::channels::{
    SendmailConfig, SendmailTransport, StdoutTransport, WebhookConfig, WebhookTransport,
};
use super::dispatcher::NotificationDispatcher;
use crate::config::GeneralConfig;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// 通知系统构建器
///
/// 选择顺序：调试模式用标准输出；否则配置了 sendmail 用 sendmail，
/// 配置了 webhook 用 webhook；都没有时回退到标准输出。
/// `sendmail_command` 为空列表时在 PATH 中查找 sendmail。
pub struct NotificationBuilder {
    general: GeneralConfig,
    debug: bool,
}

impl NotificationBuilder {
    pub fn new(general: GeneralConfig) -> Self {
        Self {
            general,
            debug: false,
        }
    }

    /// 设置调试模式
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// 只构建渠道
    pub fn build_transport(&self) -> Result<Arc<dyn Transport>> {
        if self.debug {
            info!(transport = "stdout", "Debug mode, rendering to stdout");
            return Ok(Arc::new(StdoutTransport::new()));
        }

        if let Some(command) = &self.general.sendmail_command {
            let config = if command.is_empty() {
                SendmailConfig::locate()?
            } else {
                SendmailConfig {
                    command: command.clone(),
                }
            };
            info!(transport = "sendmail", command = ?config.command, "Using sendmail transport");
            return Ok(Arc::new(SendmailTransport::new(config)?));
        }

        if let Some(url) = &self.general.webhook_url {
            info!(transport = "webhook", url = %url, "Using webhook transport");
            return Ok(Arc::new(WebhookTransport::new(WebhookConfig {
                url: url.clone(),
                timeout_secs: self.general.webhook_timeout_secs,
            })?));
        }

        info!(transport = "stdout", "No delivery configured, rendering to stdout");
        Ok(Arc::new(StdoutTransport::new()))
    }

    /// 构建 NotificationDispatcher
    pub fn build(self) -> Result<NotificationDispatcher> {
        let transport = self.build_transport()?;
        Ok(NotificationDispatcher::new(transport, self.general).with_debug(self.debug))
    }
}
