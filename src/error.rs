//! 错误分类
//!
//! - `Config`: 配置错误，在核心流程运行前被拒绝
//! - `Repository`: 仓库/差异访问错误，对整个事件是致命的
//! - `Notifiers`: 单个 GroupSet 的渲染或投递失败，全部处理完后一起上报

use std::fmt;
use thiserror::Error;

/// 顶层错误
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("repository error: {0:#}")]
    Repository(anyhow::Error),

    #[error("{} notifier(s) failed:\n{}", .0.len(), format_failures(.0))]
    Notifiers(Vec<NotifierFailure>),
}

impl NotifyError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// 进程退出码
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Notifiers(_) => 1,
            Self::Config(_) => 2,
            Self::Repository(_) => 3,
        }
    }
}

/// 单个通知器失败的记录
#[derive(Debug, Clone)]
pub struct NotifierFailure {
    /// 传输渠道名称
    pub transport: String,
    pub revision: Option<u64>,
    /// 该 GroupSet 中所有分组名称
    pub groups: Vec<String>,
    /// 完整错误链
    pub detail: String,
}

impl NotifierFailure {
    pub fn new(
        transport: impl Into<String>,
        revision: Option<u64>,
        groups: Vec<String>,
        error: &anyhow::Error,
    ) -> Self {
        Self {
            transport: transport.into(),
            revision,
            groups,
            detail: format!("{:?}", error),
        }
    }
}

impl fmt::Display for NotifierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let revision = self
            .revision
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        let groups: Vec<String> = self.groups.iter().map(|g| format!("[{}]", g)).collect();
        write!(
            f,
            "Notifier: {}\nRevision: {}\nGroups: {}\n{}",
            self.transport,
            revision,
            groups.join(", "),
            self.detail
        )
    }
}

fn format_failures(failures: &[NotifierFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("\n\n")
}
