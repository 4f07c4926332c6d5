//! 传输渠道 trait 定义

use anyhow::Result;
use serde::Serialize;

/// 投递信封
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    /// 信封发件人
    pub sender: String,
    pub recipients: Vec<String>,
}

/// 一封已渲染好的通知（拆分时每个分片一封）
#[derive(Debug, Clone, Serialize)]
pub struct RenderedMessage {
    pub subject: String,
    /// 按写出顺序排列的头部
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// 该通知覆盖的分组名称
    pub groups: Vec<String>,
    pub revision: Option<u64>,
    /// 拆分时的 (序号, 总数)
    pub part: Option<(usize, usize)>,
}

impl RenderedMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// RFC 822 文本（8bit UTF-8 正文）
    pub fn to_rfc822(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 512);
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\n", name, value));
        }
        out.push_str(&format!("Subject: {}\n", self.subject));
        out.push_str("MIME-Version: 1.0\n");
        out.push_str("Content-Type: text/plain; charset=utf-8\n");
        out.push_str("Content-Transfer-Encoding: 8bit\n");
        out.push('\n');
        out.push_str(&self.body);
        out
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（例如没有收件人）
    Skipped(String),
    /// 发送失败
    Failed(String),
}

/// 传输渠道 trait
pub trait Transport: Send + Sync {
    /// 渠道名称（用于日志和失败记录）
    fn name(&self) -> &str;

    /// 没有收件人时是否跳过投递
    fn requires_recipients(&self) -> bool {
        true
    }

    /// 同步投递一封通知
    fn send(&self, envelope: &Envelope, message: &RenderedMessage) -> Result<SendResult>;
}
