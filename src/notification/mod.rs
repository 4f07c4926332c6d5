//! 通知投递层 - 头部组装、渠道选择和逐分组集分发
//!
//! # 设计目标
//! 1. 统一接口：所有渠道实现 `Transport` trait
//! 2. 失败隔离：一个分组集失败不影响其他分组集，失败最后一起上报
//! 3. 渠道选择：`NotificationBuilder` 根据配置决定使用哪个渠道
//!
//! # 使用示例
//! ```ignore
//! use commit_notifier::notification::NotificationBuilder;
//!
//! let dispatcher = NotificationBuilder::new(settings.general.clone())
//!     .debug(false)
//!     .build()?;
//! dispatcher.dispatch(&repos, &event, &sets, &subst)?;
//! ```

pub mod builder;
pub mod channel;
pub mod channels;
pub mod dispatcher;
pub mod headers;

pub use builder::NotificationBuilder;
pub use channel::{Envelope, RenderedMessage, SendResult, Transport};
pub use dispatcher::{DispatchSummary, NotificationDispatcher};
pub use headers::{compose_headers, custom_headers, Addresses};
