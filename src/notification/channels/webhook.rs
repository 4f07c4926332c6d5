//! Webhook 渠道 - 以 JSON POST 把通知交给问题跟踪或聊天网关

use crate::notification::channel::{Envelope, RenderedMessage, SendResult, Transport};
use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Webhook 客户端配置
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    /// 超时时间 (秒)
    pub timeout_secs: u64,
}

/// Webhook 请求载荷
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub subject: &'a str,
    pub headers: &'a [(String, String)],
    pub body: &'a str,
    pub groups: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    /// 拆分时的 [序号, 总数]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<(usize, usize)>,
    pub sender: &'a str,
    pub recipients: &'a [String],
}

impl<'a> WebhookPayload<'a> {
    pub fn new(envelope: &'a Envelope, message: &'a RenderedMessage) -> Self {
        Self {
            subject: &message.subject,
            headers: &message.headers,
            body: &message.body,
            groups: &message.groups,
            revision: message.revision,
            part: message.part,
            sender: &envelope.sender,
            recipients: &envelope.recipients,
        }
    }
}

/// Webhook 响应；空响应或非 JSON 响应按状态码判断
#[derive(Debug, Deserialize)]
pub struct WebhookResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Webhook 渠道
#[derive(Debug)]
pub struct WebhookTransport {
    client: Client,
    config: WebhookConfig,
}

impl WebhookTransport {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(anyhow!("webhook url is required"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }
}

impl Transport for WebhookTransport {
    fn name(&self) -> &str {
        "webhook"
    }

    fn requires_recipients(&self) -> bool {
        false
    }

    fn send(&self, envelope: &Envelope, message: &RenderedMessage) -> Result<SendResult> {
        let payload = WebhookPayload::new(envelope, message);

        let response = self
            .client
            .post(&self.config.url)
            .json(&payload)
            .send()
            .with_context(|| format!("HTTP request to {} failed", self.config.url))?;

        let status = response.status();
        let text = response.text().unwrap_or_default();
        if !status.is_success() {
            error!(transport = "webhook", status = %status, body = %text, "Webhook rejected message");
            return Ok(SendResult::Failed(format!("HTTP {}: {}", status, text.trim())));
        }

        if let Ok(parsed) = serde_json::from_str::<WebhookResponse>(&text) {
            if !parsed.ok {
                let reason = parsed.error.unwrap_or_else(|| "Unknown error".to_string());
                error!(transport = "webhook", error = %reason, "Webhook reported failure");
                return Ok(SendResult::Failed(reason));
            }
        }

        info!(
            transport = "webhook",
            groups = ?message.groups,
            part = ?message.part,
            "Message posted successfully"
        );
        Ok(SendResult::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_requires_url() {
        let result = WebhookTransport::new(WebhookConfig {
            url: "  ".to_string(),
            timeout_secs: 5,
        });
        assert!(result.unwrap_err().to_string().contains("url"));
    }

    #[test]
    fn test_payload_serialization() {
        let envelope = Envelope {
            sender: "svn@example.org".to_string(),
            recipients: vec!["commits@example.org".to_string()],
        };
        let message = RenderedMessage {
            subject: "r3 [1/2] - a.c".to_string(),
            headers: vec![("From".to_string(), "svn@example.org".to_string())],
            body: "Author: alice\n".to_string(),
            groups: vec!["core".to_string()],
            revision: Some(3),
            part: Some((1, 2)),
        };
        let value = serde_json::to_value(WebhookPayload::new(&envelope, &message)).unwrap();
        assert_eq!(value["subject"], "r3 [1/2] - a.c");
        assert_eq!(value["revision"], 3);
        assert_eq!(value["part"], serde_json::json!([1, 2]));
        assert_eq!(value["headers"][0], serde_json::json!(["From", "svn@example.org"]));
        assert_eq!(value["recipients"][0], "commits@example.org");
    }

    #[test]
    fn test_payload_omits_missing_revision() {
        let envelope = Envelope {
            sender: "alice".to_string(),
            recipients: Vec::new(),
        };
        let message = RenderedMessage {
            subject: "lock".to_string(),
            headers: Vec::new(),
            body: String::new(),
            groups: vec!["core".to_string()],
            revision: None,
            part: None,
        };
        let value = serde_json::to_value(WebhookPayload::new(&envelope, &message)).unwrap();
        assert!(value.get("revision").is_none());
        assert!(value.get("part").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let ok: WebhookResponse = serde_json::from_str(r#"{"ok": true}"#).unwrap();
        assert!(ok.ok);
        let failed: WebhookResponse =
            serde_json::from_str(r#"{"ok": false, "error": "tracker offline"}"#).unwrap();
        assert_eq!(failed.error.as_deref(), Some("tracker offline"));
    }
}
