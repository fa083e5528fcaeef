//! Shared text helpers.

/// Truncate a string to approximately `max_bytes` without splitting a UTF-8
/// character boundary.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Lowercase a request text and collapse runs of whitespace into one space.
///
/// Two goals that differ only in case or spacing normalize to the same
/// string, which is what the exact response cache keys on.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate_str("mine stone", 64), "mine stone");
        assert_eq!(truncate_str("build a shelter", 5), "build");
    }

    #[test]
    fn truncate_backs_off_multibyte_boundary() {
        // 'é' is 2 bytes
        assert_eq!(truncate_str("café", 4), "caf");
    }

    #[test]
    fn normalize_collapses_case_and_spacing() {
        assert_eq!(
            normalize_text("  Build   a SMALL\tshelter \n"),
            "build a small shelter"
        );
        assert_eq!(normalize_text(""), "");
    }
}
