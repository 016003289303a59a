use chrono::Utc;

/// RFC3339 timestamp in UTC (for audit entries and logs).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_text_adds_ellipsis() {
        let s = "a".repeat(600);
        let t = truncate_text(&s, 500);
        assert!(t.ends_with("..."));
        assert!(t.len() >= 500);
    }

    #[test]
    fn truncate_text_leaves_short_strings_alone() {
        assert_eq!(truncate_text("hello", 500), "hello");
    }
}
