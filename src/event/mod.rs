//! 版本控制事件 - 事件类型、运行时上下文和标准输入缓存
//!
//! 一次进程调用只处理一个事件。标准输入（锁路径列表、修订属性旧值）
//! 在启动时读取一次，作为显式的 [`StdinPayload`] 传入上下文，不使用全局单例。

pub mod change;

pub use change::{Change, ChangeKind, CopySource};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// 修订属性变更动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropAction {
    Added,
    Modified,
    Deleted,
}

impl PropAction {
    /// 解析钩子传入的单字母动作（A/M/D）
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::Added),
            "M" => Some(Self::Modified),
            "D" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Added => "Added",
            Self::Modified => "Modified",
            Self::Deleted => "Deleted",
        }
    }
}

/// 事件类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Commit,
    PropChange {
        name: String,
        action: Option<PropAction>,
    },
    Lock,
    Unlock,
}

impl EventKind {
    pub fn is_commit(&self) -> bool {
        matches!(self, Self::Commit)
    }

    pub fn is_lock_event(&self) -> bool {
        matches!(self, Self::Lock | Self::Unlock)
    }

    /// 修订属性名（仅 propchange 事件有值）
    pub fn property(&self) -> Option<&str> {
        match self {
            Self::PropChange { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::PropChange { .. } => "propchange",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 标准输入内容，只读取一次
#[derive(Debug, Clone, Default)]
pub struct StdinPayload {
    content: Option<String>,
}

impl StdinPayload {
    /// 没有标准输入
    pub fn empty() -> Self {
        Self { content: None }
    }

    pub fn from_string(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }

    /// 从 reader 读取全部内容（非 UTF-8 字节按替换字符处理）
    pub fn read_from(mut reader: impl Read) -> Result<Self> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .context("Failed to read standard input")?;
        Ok(Self::from_string(String::from_utf8_lossy(&buf).into_owned()))
    }

    pub fn as_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// 非空行，用于锁事件的路径列表
    pub fn non_empty_lines(&self) -> Vec<&str> {
        self.as_str().lines().filter(|l| !l.is_empty()).collect()
    }

    /// 锁事件的变更列表：每行一个路径，按规范化路径排序去重
    pub fn lock_changes(&self) -> Vec<Change> {
        let mut changes: Vec<Change> = self
            .non_empty_lines()
            .into_iter()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|p| Change::new(p, ChangeKind::Modified))
            .collect();
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        changes.dedup_by(|a, b| a.path == b.path);
        changes
    }
}

/// 一次事件的运行时上下文
#[derive(Debug, Clone)]
pub struct EventContext {
    pub kind: EventKind,
    /// 修订号（锁事件可能没有）
    pub revision: Option<u64>,
    /// 命令行指定的作者，优先于仓库记录
    pub author: Option<String>,
    pub stdin: StdinPayload,
    /// 调试模式：渲染到标准输出而不投递
    pub debug: bool,
}

impl EventContext {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            revision: None,
            author: None,
            stdin: StdinPayload::empty(),
            debug: false,
        }
    }

    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_stdin(mut self, stdin: StdinPayload) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prop_action_from_token() {
        assert_eq!(PropAction::from_token("A"), Some(PropAction::Added));
        assert_eq!(PropAction::from_token(" m "), Some(PropAction::Modified));
        assert_eq!(PropAction::from_token("D"), Some(PropAction::Deleted));
        assert_eq!(PropAction::from_token("X"), None);
    }

    #[test]
    fn test_stdin_non_empty_lines() {
        let stdin = StdinPayload::from_string("trunk/a\n\ntrunk/b\n");
        assert_eq!(stdin.non_empty_lines(), vec!["trunk/a", "trunk/b"]);
        assert_eq!(StdinPayload::empty().non_empty_lines(), Vec::<&str>::new());
    }

    #[test]
    fn test_lock_changes_are_sorted() {
        let stdin = StdinPayload::from_string("/trunk/b\n\ntrunk/a\n/trunk/b\n");
        let changes = stdin.lock_changes();
        let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["trunk/a", "trunk/b"]);
        assert!(changes.iter().all(|c| c.kind == ChangeKind::Modified));
    }

    #[test]
    fn test_stdin_read_from() {
        let stdin = StdinPayload::read_from(&b"old value"[..]).unwrap();
        assert_eq!(stdin.as_str(), "old value");
    }

    #[test]
    fn test_event_kind_property() {
        let kind = EventKind::PropChange {
            name: "svn:log".to_string(),
            action: None,
        };
        assert_eq!(kind.property(), Some("svn:log"));
        assert_eq!(EventKind::Commit.property(), None);
        assert_eq!(kind.to_string(), "propchange");
    }
}
