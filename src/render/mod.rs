//! 通知渲染 - 正文生成、超长策略和主题行
//!
//! - [`composer`]: 按固定顺序写出元数据、路径列表和差异
//! - [`writer`] / [`truncate`] / [`links`] / [`split`]: 超长策略写入器
//! - [`policy`]: 按事件类型和配置选择写入器
//! - [`subject`]: 每个分组集计算一次的主题行
//! - [`sink`]: 可转存到临时文件的分片缓冲

pub mod composer;
pub mod links;
pub mod policy;
pub mod sink;
pub mod split;
pub mod subject;
pub mod truncate;
pub mod writer;

pub use composer::{format_date, MessageComposer};
pub use links::{BrowserLinks, ShowLinksWriter};
pub use policy::Strategy;
pub use sink::{BodyPart, SpoolBuffer, SpoolConfig};
pub use split::{SplitWriter, SplittingBuffer};
pub use subject::SubjectLine;
pub use truncate::{TruncateWriter, TruncatingBuffer};
pub use writer::{DiffLink, PartWriter, PlainWriter};

use anyhow::Result;
use tracing::info;

use crate::classify::{GroupSet, Substitutions};
use crate::config::GeneralConfig;
use crate::event::EventContext;
use crate::repository::{Repository, RepositoryGuard};

/// 一个分组集渲染出的通知
#[derive(Debug)]
pub struct RenderedNotification {
    pub subject: SubjectLine,
    pub parts: Vec<BodyPart>,
    pub strategy: Strategy,
}

/// 渲染一个分组集：选择写入器、生成正文、计算主题
///
/// 仓库读取错误以 [`RepositoryError`](crate::repository::RepositoryError) 返回。
pub fn render_group_set(
    repos: &dyn Repository,
    event: &EventContext,
    set: &GroupSet<'_>,
    subst: &Substitutions,
    general: &GeneralConfig,
) -> Result<RenderedNotification> {
    let group = set.representative();
    let strategy = Strategy::select(group.config.overflow.as_ref(), &event.kind);

    let repos = RepositoryGuard::new(repos);
    let composer = MessageComposer::new(&repos, event, set, subst, general.tempdir.clone());
    let mut writer = strategy.build(SpoolConfig::from_general(general), composer.has_links());
    composer.compose(writer.as_mut())?;
    let parts = writer.finish()?;

    info!(
        group = %group.config.name,
        strategy = strategy.name(),
        parts = parts.len(),
        "Notification rendered"
    );
    Ok(RenderedNotification {
        subject: SubjectLine::new(&event.kind, set, subst),
        parts,
        strategy,
    })
}
