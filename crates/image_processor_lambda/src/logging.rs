//! Structured log lines for CloudWatch.
//!
//! Every line is a single JSON object on stderr so Logs Insights can filter
//! on `component`, `event` and `level` without parsing free text.

use serde_json::{json, Value};

pub fn log_info(component: &str, event: &str, details: Value) {
    emit(component, None, event, details);
}

pub fn log_warn(component: &str, event: &str, details: Value) {
    emit(component, Some("warn"), event, details);
}

pub fn log_error(component: &str, event: &str, details: Value) {
    emit(component, Some("error"), event, details);
}

fn emit(component: &str, level: Option<&str>, event: &str, details: Value) {
    eprintln!("{}", log_line(component, level, event, details));
}

fn log_line(component: &str, level: Option<&str>, event: &str, details: Value) -> Value {
    let mut line = json!({
        "component": component,
        "event": event,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "details": details,
    });
    if let Some(level) = level {
        line["level"] = Value::from(level);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_lines_omit_level() {
        let line = log_line("daily_run", None, "run_started", json!({"places": 3}));
        assert_eq!(line["component"], "daily_run");
        assert_eq!(line["details"]["places"], 3);
        assert!(line.get("level").is_none());
    }

    #[test]
    fn error_lines_carry_level() {
        let line = log_line("daily_run", Some("error"), "copy_failed", json!({}));
        assert_eq!(line["level"], "error");
        assert!(line["timestamp"].as_str().is_some());
    }
}
