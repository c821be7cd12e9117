//! Run orchestration: task tracking, the stream engine, the notification
//! bus, and copilot generation sessions.

pub mod copilot;
pub mod notify;
pub mod stream;
pub mod tasks;

/// Truncate a string to at most `max` bytes on a char boundary, appending
/// an ellipsis when anything was cut.
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Current wall clock in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 5), "hello...");
        let t = truncate_str("héllo", 2);
        assert!(t.ends_with("..."));
    }
}
