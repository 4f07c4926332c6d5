//! Output formatting for CLI commands

use serde::Serialize;

use crate::notification::DispatchSummary;

/// Format output as JSON or a one-line summary based on --json flag
pub fn format_output<T: Serialize>(data: &T, json: bool) -> Option<String> {
    if json {
        Some(serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string()))
    } else {
        None
    }
}

/// 人类可读的分发结果
pub fn describe_summary(summary: &DispatchSummary) -> String {
    format!(
        "{} message(s) sent, {} group set(s) skipped",
        summary.sent, summary.skipped
    )
}
