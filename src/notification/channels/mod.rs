//! 具体渠道实现

pub mod sendmail;
pub mod stdout;
pub mod webhook;

pub use sendmail::{SendmailConfig, SendmailTransport};
pub use stdout::StdoutTransport;
pub use webhook::{WebhookConfig, WebhookTransport};
