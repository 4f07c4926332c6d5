//! 事件命令处理 - 加载配置和仓库、分类变更、分发通知

use crate::classify::{classify, EventMeta, Substitutions};
use crate::config::Settings;
use crate::error::NotifyError;
use crate::event::{Change, EventContext, EventKind, PropAction, StdinPayload};
use crate::notification::{DispatchSummary, NotificationBuilder};
use crate::repository::{ReplayRepository, Repository};
use clap::Args;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info};

/// 所有事件命令共用的参数
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// 配置文件路径（默认 <config_dir>/commit-notifier/config.json）
    #[arg(long, short)]
    pub config: Option<PathBuf>,
    /// 仓库导出文件（JSON）
    #[arg(long)]
    pub repository_dump: PathBuf,
    /// 覆盖仓库记录的作者
    #[arg(long)]
    pub author: Option<String>,
    /// 渲染到标准输出而不投递
    #[arg(long)]
    pub debug: bool,
    /// 以 JSON 输出分发结果
    #[arg(long)]
    pub json: bool,
}

impl CommonArgs {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Settings::default_path)
    }
}

/// commit 命令参数
#[derive(Args, Debug, Clone)]
pub struct CommitArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// 修订号
    #[arg(long, short)]
    pub revision: u64,
}

/// propchange 命令参数；属性旧值从标准输入读取
#[derive(Args, Debug, Clone)]
pub struct PropchangeArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[arg(long, short)]
    pub revision: u64,
    /// 修订属性名（如 svn:log）
    #[arg(long)]
    pub property: String,
    /// 变更动作：A / M / D
    #[arg(long)]
    pub action: Option<String>,
}

/// lock / unlock 命令参数；路径列表从标准输入读取
#[derive(Args, Debug, Clone)]
pub struct LockArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// 一次事件调用
#[derive(Debug, Clone)]
pub struct EventRequest {
    pub kind: EventKind,
    pub revision: Option<u64>,
    pub common: CommonArgs,
}

impl EventRequest {
    pub fn commit(args: CommitArgs) -> Self {
        Self {
            kind: EventKind::Commit,
            revision: Some(args.revision),
            common: args.common,
        }
    }

    pub fn propchange(args: PropchangeArgs) -> Result<Self, NotifyError> {
        let action = match args.action.as_deref() {
            Some(token) => Some(PropAction::from_token(token).ok_or_else(|| {
                NotifyError::config(format!("invalid property action '{}'", token))
            })?),
            None => None,
        };
        Ok(Self {
            kind: EventKind::PropChange {
                name: args.property,
                action,
            },
            revision: Some(args.revision),
            common: args.common,
        })
    }

    pub fn lock(args: LockArgs, locked: bool) -> Self {
        Self {
            kind: if locked { EventKind::Lock } else { EventKind::Unlock },
            revision: None,
            common: args.common,
        }
    }

    /// 只有锁事件和属性变更需要标准输入
    pub fn needs_stdin(&self) -> bool {
        !self.kind.is_commit()
    }
}

/// 读取标准输入（只读一次）
pub fn read_stdin(request: &EventRequest) -> Result<StdinPayload, NotifyError> {
    if !request.needs_stdin() {
        return Ok(StdinPayload::empty());
    }
    StdinPayload::read_from(io::stdin().lock()).map_err(NotifyError::Repository)
}

/// 处理一次事件
pub fn handle_event(
    request: EventRequest,
    stdin: StdinPayload,
) -> Result<DispatchSummary, NotifyError> {
    let common = &request.common;
    let settings = Settings::load(&common.config_path())?;
    let repos = ReplayRepository::load(&common.repository_dump).map_err(NotifyError::Repository)?;
    run_event(&settings, &repos, request, stdin)
}

/// 对已加载的配置和仓库处理一次事件
pub fn run_event(
    settings: &Settings,
    repos: &dyn Repository,
    request: EventRequest,
    stdin: StdinPayload,
) -> Result<DispatchSummary, NotifyError> {
    let EventRequest {
        kind,
        revision,
        common,
    } = request;

    let changes: Vec<Change> = match (&kind, revision) {
        (EventKind::Lock | EventKind::Unlock, _) => stdin.lock_changes(),
        (_, Some(rev)) => repos.changes(rev).map_err(NotifyError::Repository)?,
        (_, None) => Vec::new(),
    };

    let author = match (&common.author, revision) {
        (Some(author), _) => Some(author.clone()),
        (None, Some(rev)) => repos
            .revision_author(rev)
            .map_err(NotifyError::Repository)?,
        (None, None) => None,
    };

    let meta = EventMeta {
        author: author.clone(),
        revision,
        property: kind.property().map(str::to_string),
        repos_path: repos.path().to_string(),
    };
    debug!(event = %kind, revision = ?revision, changes = changes.len(), "Event loaded");

    let mut event = EventContext::new(kind)
        .with_stdin(stdin)
        .with_debug(common.debug);
    if let Some(rev) = revision {
        event = event.with_revision(rev);
    }
    if let Some(author) = author {
        event = event.with_author(author);
    }

    let mut subst = Substitutions::new();
    let sets = classify(settings, &changes, &meta, &mut subst);
    if sets.is_empty() {
        info!(event = %event.kind, "Nothing to notify");
        return Ok(DispatchSummary::default());
    }

    let dispatcher = NotificationBuilder::new(settings.general.clone())
        .debug(common.debug)
        .build()
        .map_err(|e| NotifyError::config(format!("{:#}", e)))?;
    dispatcher.dispatch(repos, &event, &sets, &subst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common() -> CommonArgs {
        CommonArgs {
            config: None,
            repository_dump: PathBuf::from("dump.json"),
            author: None,
            debug: false,
            json: false,
        }
    }

    #[test]
    fn test_propchange_action_is_parsed() {
        let request = EventRequest::propchange(PropchangeArgs {
            common: common(),
            revision: 3,
            property: "svn:log".to_string(),
            action: Some("M".to_string()),
        })
        .unwrap();
        assert_eq!(
            request.kind,
            EventKind::PropChange {
                name: "svn:log".to_string(),
                action: Some(PropAction::Modified),
            }
        );
        assert!(request.needs_stdin());
    }

    #[test]
    fn test_invalid_action_is_config_error() {
        let err = EventRequest::propchange(PropchangeArgs {
            common: common(),
            revision: 3,
            property: "svn:log".to_string(),
            action: Some("X".to_string()),
        })
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_commit_does_not_read_stdin() {
        let request = EventRequest::commit(CommitArgs {
            common: common(),
            revision: 1,
        });
        assert!(!request.needs_stdin());
        assert_eq!(EventRequest::lock(LockArgs { common: common() }, false).kind, EventKind::Unlock);
    }

    #[test]
    fn test_missing_config_is_config_error() {
        let mut args = common();
        args.config = Some(PathBuf::from("/nonexistent/commit-notifier.json"));
        let err = handle_event(
            EventRequest::commit(CommitArgs {
                common: args,
                revision: 1,
            }),
            StdinPayload::empty(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
