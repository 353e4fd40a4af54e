//! Markdown export of the message log

use chrono::{DateTime, Utc};
use std::fmt::Write;

use super::types::Message;

/// Render `messages` as a Markdown report
pub fn render_report(
    title: Option<&str>,
    messages: &[Message],
    generated_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", title.unwrap_or("Conversation Report"));
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "_Generated {}_",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    for message in messages {
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}", message.role.label());
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", message.text.trim_end());
    }
    out
}
