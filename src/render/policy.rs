//! 写入器选择 - 按 (事件类型, 超长模式, 截断子模式) 查表构造写入器
//!
//! | 模式 | 提交 | 属性变更/锁（在 scope 内时） |
//! |---|---|---|
//! | truncate | 截断 | 截断 |
//! | showurls | 只留链接（可选截断链接） | 截断 |
//! | split | 拆分（可选逐块截断，可选丢弃阈值） | 截断 |
//!
//! 上限为 0 或事件不在 scope 内时不加任何限制。

use tracing::debug;

use super::links::ShowLinksWriter;
use super::sink::SpoolConfig;
use super::split::SplitWriter;
use super::truncate::TruncateWriter;
use super::writer::{PartWriter, PlainWriter};
use crate::config::{OverflowMode, OverflowPolicy};
use crate::event::EventKind;

/// 一次渲染使用的写入策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Plain,
    Truncate {
        max_bytes: usize,
    },
    ShowLinksOnly {
        max_bytes: usize,
        truncate: bool,
    },
    Split {
        max_bytes: usize,
        truncate: bool,
        drop_threshold: Option<usize>,
    },
}

impl Strategy {
    pub fn select(policy: Option<&OverflowPolicy>, kind: &EventKind) -> Self {
        let Some(policy) = policy.filter(|p| p.applies_to(kind)) else {
            return Self::Plain;
        };
        let max_bytes = policy.max_bytes;

        if !kind.is_commit() {
            return Self::Truncate { max_bytes };
        }
        match policy.mode {
            OverflowMode::Truncate => Self::Truncate { max_bytes },
            OverflowMode::ShowLinksOnly => Self::ShowLinksOnly {
                max_bytes,
                truncate: policy.truncate_submode,
            },
            OverflowMode::Split => Self::Split {
                max_bytes,
                truncate: policy.truncate_submode,
                drop_threshold: policy.drop_threshold,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Truncate { .. } => "truncate",
            Self::ShowLinksOnly { .. } => "showurls",
            Self::Split { .. } => "split",
        }
    }

    /// 构造写入器
    ///
    /// `links_configured`: 分组是否配置了浏览地址
    pub fn build(&self, spool: SpoolConfig, links_configured: bool) -> Box<dyn PartWriter> {
        debug!(strategy = self.name(), "Part writer selected");
        match *self {
            Self::Plain => Box::new(PlainWriter::new(spool)),
            Self::Truncate { max_bytes } => Box::new(TruncateWriter::new(max_bytes)),
            Self::ShowLinksOnly {
                max_bytes,
                truncate,
            } => {
                let writer = ShowLinksWriter::new(max_bytes, links_configured);
                if truncate {
                    Box::new(writer.with_truncate(max_bytes))
                } else {
                    Box::new(writer)
                }
            }
            Self::Split {
                max_bytes,
                truncate,
                drop_threshold,
            } => {
                let writer =
                    SplitWriter::new(max_bytes, spool).with_drop_threshold(drop_threshold);
                if truncate {
                    Box::new(writer.with_truncate())
                } else {
                    Box::new(writer)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(text: &str) -> OverflowPolicy {
        text.parse().unwrap()
    }

    fn propchange() -> EventKind {
        EventKind::PropChange {
            name: "svn:log".to_string(),
            action: None,
        }
    }

    #[test]
    fn test_no_policy_is_plain() {
        assert_eq!(Strategy::select(None, &EventKind::Commit), Strategy::Plain);
        let unlimited = policy("0 split");
        assert_eq!(
            Strategy::select(Some(&unlimited), &EventKind::Commit),
            Strategy::Plain
        );
    }

    #[test]
    fn test_commit_uses_configured_mode() {
        let p = policy("1000 split/truncate/3");
        assert_eq!(
            Strategy::select(Some(&p), &EventKind::Commit),
            Strategy::Split {
                max_bytes: 1000,
                truncate: true,
                drop_threshold: Some(3),
            }
        );
        let p = policy("500 showurls");
        assert_eq!(
            Strategy::select(Some(&p), &EventKind::Commit),
            Strategy::ShowLinksOnly {
                max_bytes: 500,
                truncate: false,
            }
        );
    }

    #[test]
    fn test_out_of_scope_events_are_unbounded() {
        let p = policy("1000 split");
        assert_eq!(Strategy::select(Some(&p), &propchange()), Strategy::Plain);
        assert_eq!(Strategy::select(Some(&p), &EventKind::Lock), Strategy::Plain);
    }

    #[test]
    fn test_non_commit_events_in_scope_only_truncate() {
        let p = policy("1000 split/3 revprop-changes locks");
        assert_eq!(
            Strategy::select(Some(&p), &propchange()),
            Strategy::Truncate { max_bytes: 1000 }
        );
        let p = policy("1000 showurls locks");
        assert_eq!(
            Strategy::select(Some(&p), &EventKind::Unlock),
            Strategy::Truncate { max_bytes: 1000 }
        );
    }

    #[test]
    fn test_build_matches_strategy() {
        let spool = SpoolConfig::in_memory();
        assert_eq!(Strategy::Plain.build(spool.clone(), false).name(), "plain");
        let split = Strategy::Split {
            max_bytes: 100,
            truncate: true,
            drop_threshold: None,
        };
        assert_eq!(split.build(spool.clone(), false).name(), "split");
        let links = Strategy::ShowLinksOnly {
            max_bytes: 100,
            truncate: false,
        };
        assert_eq!(links.build(spool, true).name(), "showurls");
    }
}
