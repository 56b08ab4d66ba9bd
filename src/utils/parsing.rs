//! String parsing utilities

/// Extract the value after the first colon, trimmed.
///
/// Splits once so values that contain colons themselves (Debian epochs such
/// as `1:2.3-1`) survive intact.
pub fn extract_after_colon(line: &str) -> Option<String> {
    line.split_once(':')
        .map(|(_, value)| value.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Find the first line whose trimmed text starts with `key` and return its value
pub fn find_field(text: &str, key: &str) -> Option<String> {
    text.lines()
        .map(str::trim_start)
        .find(|line| line.starts_with(key))
        .and_then(extract_after_colon)
}

/// Truncate to at most `max` characters, respecting char boundaries
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Shorten for table display, marking the cut with an ellipsis
pub fn ellipsize(s: &str, max: usize) -> String {
    if s.chars().count() <= max || max < 3 {
        return s.to_string();
    }
    format!("{}...", truncate_chars(s, max - 3))
}

/// Split into lowercase alphanumeric words, so `[AMD/ATI]` yields `amd` and
/// `ati` while `compatible` stays one word
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
}

pub fn capitalize_first_letter(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colon_values_keep_epochs() {
        assert_eq!(
            extract_after_colon("  Candidate: 1:2.3-1ubuntu1"),
            Some("1:2.3-1ubuntu1".to_string())
        );
        assert_eq!(extract_after_colon("Candidate:"), None);
        assert_eq!(extract_after_colon("no colon"), None);
    }

    #[test]
    fn find_field_skips_indentation() {
        let text = "steam:\n  Installed: (none)\n  Candidate: 1:1.0.0.79\n";
        assert_eq!(find_field(text, "Candidate:"), Some("1:1.0.0.79".to_string()));
        assert_eq!(find_field(text, "Version:"), None);
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_chars("GeForce™ RTX", 8), "GeForce™");
        assert_eq!(truncate_chars("short", 80), "short");
        assert_eq!(ellipsize("1.2.3-really-long-version-string-here", 10), "1.2.3-r...");
    }

    #[test]
    fn words_split_on_punctuation() {
        let w: Vec<String> = words("VGA compatible controller: [AMD/ATI] Navi").collect();
        assert!(w.contains(&"ati".to_string()));
        assert!(w.contains(&"compatible".to_string()));
        assert!(!w.iter().any(|x| x == "vga compatible"));
    }
}
