use entaudit_memory::AuditLogRow;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
}

pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(HumanFormatter)
    }
}

/// Shortens `value` to at most `max` characters, marking the cut with `…`
pub fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('\u{2026}');
    out
}

/// Column header of the audit trail table
pub fn trail_header() -> String {
    format!(
        "{:<19}  {:<6}  {:<6}  {:<16}  {:<20}  {:<20}  USER",
        "CREATED", "OP", "ID", "PROPERTY", "OLD", "NEW"
    )
}

/// One audit-log row as a line of the audit trail table
///
/// Absent property names and values print as `-`.
pub fn trail_line(row: &AuditLogRow) -> String {
    let cell = |value: Option<&str>, max: usize| truncate(value.unwrap_or("-"), max);
    format!(
        "{:<19}  {:<6}  {:<6}  {:<16}  {:<20}  {:<20}  {}",
        row.created.format("%Y-%m-%d %H:%M:%S"),
        row.log_operation,
        truncate(&row.entity_id, 6),
        cell(row.property_name.as_deref(), 16),
        cell(row.old_value.as_deref(), 20),
        cell(row.new_value.as_deref(), 20),
        row.user,
    )
}

/// Prints the last `limit` audit rows as a table
///
/// Returns the number of earlier rows that were left out.
pub fn print_trail(formatter: &dyn OutputFormatter, log: &[AuditLogRow], limit: usize) -> usize {
    let skipped = log.len().saturating_sub(limit);
    if skipped == log.len() {
        return skipped;
    }

    formatter.info("");
    formatter.info(&trail_header());
    for row in &log[skipped..] {
        formatter.info(&trail_line(row));
    }
    if skipped > 0 {
        formatter.info(&format!("... {} earlier rows not shown", skipped));
    }
    skipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("0123456789abc", 5), "0123\u{2026}");
        assert_eq!(truncate("a►b►c", 5), "a►b►c");
    }

    fn row(operation: &str, property: Option<&str>) -> AuditLogRow {
        AuditLogRow {
            created: "2024-03-01T12:30:00Z".parse().unwrap(),
            entity_full_name: "company".into(),
            entity_id: "1234567".into(),
            log_operation: operation.into(),
            user: "alice".into(),
            property_name: property.map(String::from),
            old_value: property.map(|_| "Acme".to_string()),
            new_value: property.map(|_| "Globex Corporation Worldwide".to_string()),
            entity: None,
        }
    }

    #[test]
    fn test_trail_line_for_update() {
        let line = trail_line(&row("Update", Some("com_name")));
        assert!(line.starts_with("2024-03-01 12:30:00  Update  12345\u{2026}"));
        assert!(line.contains("com_name"));
        assert!(line.contains("Globex Corporation \u{2026}"));
        assert!(line.ends_with("alice"));
    }

    #[test]
    fn test_trail_line_marks_absent_values() {
        let line = trail_line(&row("Create", None));
        assert_eq!(line.matches(" - ").count(), 3);
        assert_eq!(
            trail_header().chars().count() + "alice".len(),
            line.chars().count() + "USER".len()
        );
    }

    #[test]
    fn test_print_trail_reports_skipped_rows() {
        let log = vec![row("Create", None), row("Delete", None), row("Update", Some("x"))];
        assert_eq!(print_trail(&HumanFormatter, &log, 2), 1);
        assert_eq!(print_trail(&HumanFormatter, &log, 5), 0);
        assert_eq!(print_trail(&HumanFormatter, &log, 0), 3);
    }
}
