//! Commit Notifier - 把版本控制事件渲染成有大小上限的邮件、webhook 和标准输出通知

pub mod classify;
pub mod cli;
pub mod config;
pub mod differ;
pub mod error;
pub mod event;
pub mod notification;
pub mod render;
pub mod repository;

pub use classify::{classify, EventMeta, GroupMatcher, GroupSet, Substitutions};
pub use config::{GroupConfig, OverflowMode, OverflowPolicy, Settings};
pub use error::{NotifierFailure, NotifyError};
pub use event::{Change, ChangeKind, EventContext, EventKind, StdinPayload};
pub use notification::{
    DispatchSummary, NotificationBuilder, NotificationDispatcher, SendResult, Transport,
};
pub use render::{render_group_set, RenderedNotification};
pub use repository::{ReplayRepository, Repository};
