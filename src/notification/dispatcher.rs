//! 通知分发器 - 逐个分组集渲染并投递，失败隔离后统一上报

use super::channel::{RenderedMessage, SendResult, Transport};
use super::headers::compose_headers;
use crate::classify::{GroupSet, Substitutions};
use crate::config::GeneralConfig;
use crate::error::{NotifierFailure, NotifyError};
use crate::event::EventContext;
use crate::render::render_group_set;
use crate::repository::{Repository, RepositoryError};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 一次分发的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// 成功投递的消息数（拆分时按分片计）
    pub sent: usize,
    /// 被跳过的分组集
    pub skipped: usize,
}

/// 通知分发器
pub struct NotificationDispatcher {
    transport: Arc<dyn Transport>,
    general: GeneralConfig,
    debug: bool,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn Transport>, general: GeneralConfig) -> Self {
        Self {
            transport,
            general,
            debug: false,
        }
    }

    /// 调试模式：头部带上 `X-Config-Groups`
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// 处理全部分组集
    ///
    /// 单个分组集的失败不会中断其余分组集，全部处理完后一起返回；
    /// 仓库访问错误例外，立即中止整个事件。
    pub fn dispatch(
        &self,
        repos: &dyn Repository,
        event: &EventContext,
        sets: &[GroupSet<'_>],
        subst: &Substitutions,
    ) -> Result<DispatchSummary, NotifyError> {
        let mut summary = DispatchSummary::default();
        let mut failures = Vec::new();

        for set in sets {
            match self.deliver_set(repos, event, set, subst) {
                Ok(Some(sent)) => summary.sent += sent,
                Ok(None) => summary.skipped += 1,
                Err(e) if RepositoryError::is_within(&e) => {
                    error!(
                        groups = ?set.group_names(),
                        error = %format!("{:#}", e),
                        "Repository access failed, aborting event"
                    );
                    return Err(NotifyError::Repository(e));
                }
                Err(e) => {
                    let groups = set.group_names();
                    error!(
                        transport = self.transport.name(),
                        groups = ?groups,
                        error = %e,
                        "Notification failed"
                    );
                    failures.push(NotifierFailure::new(
                        self.transport.name(),
                        event.revision,
                        groups,
                        &e,
                    ));
                }
            }
        }

        if !failures.is_empty() {
            warn!(failures = failures.len(), "Some notifications failed");
            return Err(NotifyError::Notifiers(failures));
        }

        info!(
            transport = self.transport.name(),
            sent = summary.sent,
            skipped = summary.skipped,
            "Notifications dispatched"
        );
        Ok(summary)
    }

    /// 渲染并投递一个分组集；跳过时返回 `None`
    fn deliver_set(
        &self,
        repos: &dyn Repository,
        event: &EventContext,
        set: &GroupSet<'_>,
        subst: &Substitutions,
    ) -> Result<Option<usize>> {
        let groups = set.group_names();
        let (envelope, headers) =
            compose_headers(set, subst, event.author.as_deref(), &self.general, self.debug);

        if envelope.recipients.is_empty() && self.transport.requires_recipients() {
            info!(groups = ?groups, "No recipients found, skipping");
            return Ok(None);
        }

        let rendered = render_group_set(repos, event, set, subst, &self.general)?;
        let total = rendered.parts.len();
        let mut sent = 0;

        for part in rendered.parts {
            let marker = part.marker();
            let subject = rendered.subject.render(marker.as_deref());
            let message = RenderedMessage {
                subject,
                headers: headers.clone(),
                body: part.into_text()?,
                groups: groups.clone(),
                revision: event.revision,
                part: (total > 1).then_some((sent + 1, total)),
            };

            match self.transport.send(&envelope, &message)? {
                SendResult::Sent => sent += 1,
                SendResult::Skipped(reason) => {
                    info!(groups = ?groups, reason = %reason, "Notification skipped");
                    return Ok(None);
                }
                SendResult::Failed(detail) => {
                    return Err(anyhow!(
                        "{} failed on part {}/{}: {}",
                        self.transport.name(),
                        sent + 1,
                        total,
                        detail
                    ));
                }
            }
        }

        Ok(Some(sent))
    }
}
