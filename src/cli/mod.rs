//! CLI command handling

pub mod event;
pub mod output;

pub use event::*;
pub use output::*;
