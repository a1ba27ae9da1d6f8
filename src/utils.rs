//! Common utility functions

pub fn truncate_display(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}

/// Display names used when building prompts. Codes missing here are passed
/// to the model unchanged.
pub const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("cs", "Czech"),
    ("sk", "Slovak"),
    ("pl", "Polish"),
    ("en", "English"),
    ("de", "German"),
    ("hu", "Hungarian"),
    // Common extras
    ("fr", "French"),
    ("es", "Spanish"),
    ("it", "Italian"),
    ("nl", "Dutch"),
    ("pt", "Portuguese"),
    ("ro", "Romanian"),
    ("hr", "Croatian"),
    ("sl", "Slovenian"),
    ("uk", "Ukrainian"),
    ("ru", "Russian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("zh", "Chinese"),
];

pub fn language_name(code: &str) -> String {
    let lower = code.trim().to_lowercase();
    LANGUAGE_NAMES
        .iter()
        .find(|(c, _)| *c == lower)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_name_lookup() {
        assert_eq!(language_name("cs"), "Czech");
        assert_eq!(language_name("DE"), "German");
        assert_eq!(language_name("xx-custom"), "xx-custom");
    }

    #[test]
    fn test_truncate_display() {
        assert_eq!(truncate_display("short", 10), "short");
        assert_eq!(truncate_display("Příliš dlouhý text", 6), "Příliš...");
    }
}
