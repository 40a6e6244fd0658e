//! CLI output formatting utilities.

use crate::audit::AuditRecord;
use console::{style, Style};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print one audit record.
    pub fn audit_record(record: &AuditRecord) {
        println!(
            "\n{} {}",
            Self::title_style().apply_to(&record.id),
            Self::dim_style().apply_to(record.timestamp.format("%Y-%m-%d %H:%M:%S UTC"))
        );
        Self::kv("agent", record.agent_name.as_deref().unwrap_or("-"));
        Self::kv("prompt", &content_preview(&record.user_prompt, 100));
        println!("  {}", style(&record.sql_query).green());
    }

    /// Style for titles.
    pub fn title_style() -> Style {
        Style::new().bold()
    }

    /// Style for dim text.
    pub fn dim_style() -> Style {
        Style::new().dim()
    }
}

/// Single-line preview, cut on a char boundary.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        format!("{}...", content.chars().take(max_chars).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_preview() {
        assert_eq!(content_preview("a\nb", 10), "a b");
        assert_eq!(content_preview("héllo wörld", 5), "héllo...");
    }
}
