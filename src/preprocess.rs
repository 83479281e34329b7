//! Markdown body cleanup applied by the harvester before a record is written.
//!
//! Harvested bodies are used for embeddings and prompt context only, so markup
//! noise that carries no meaning for retrieval is removed:
//!
//! 1. HTML/MDX tags (`<Tip>`, `<img ...>`)
//! 2. URLs (`http...`, `www....`)
//! 3. `Copyright ...` through the end of its line
//! 4. emoji and `:shortcode:` tokens
//! 5. runs of whitespace, collapsed to one space

use regex::Regex;
use std::sync::OnceLock;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"))
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?\S+|www\.\S+").expect("valid url regex"))
}

fn copyright_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Copyright.*").expect("valid copyright regex"))
}

fn emoji_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\p{Extended_Pictographic}\p{Emoji_Modifier}\x{FE0F}\x{200D}]").expect("valid emoji regex")
    })
}

fn shortcode_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":[a-z_&+-]+:").expect("valid shortcode regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

/// Strip markup noise from a markdown body and flatten it to a single line.
pub fn clean_text(text: &str) -> String {
    let text = tag_re().replace_all(text, "");
    let text = url_re().replace_all(&text, "");
    // Line-scoped: must run before newlines are flattened.
    let text = copyright_re().replace_all(&text, "");
    let text = emoji_re().replace_all(&text, "");
    let text = shortcode_re().replace_all(&text, "");
    let text = whitespace_re().replace_all(&text, " ");
    text.trim().to_string()
}

/// Collapse whitespace only; used when `harvest.clean_text` is off so that
/// records still hold a tidy single-line body.
pub fn collapse_whitespace(text: &str) -> String {
    whitespace_re().replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_urls() {
        let cleaned = clean_text("<Tip>Read the docs at https://example.com/guide now</Tip>");
        assert_eq!(cleaned, "Read the docs at now");
    }

    #[test]
    fn copyright_removed_to_end_of_line_only() {
        let cleaned = clean_text("# Title\nCopyright 2023 The Authors.\nBody text");
        assert_eq!(cleaned, "# Title Body text");
    }

    #[test]
    fn emoji_and_shortcodes_removed() {
        let cleaned = clean_text("Launch 🚀 day :tada: is here 👍🏽");
        assert!(!cleaned.contains('🚀'));
        assert!(!cleaned.contains(":tada:"));
        assert!(cleaned.starts_with("Launch day is here"));
    }

    #[test]
    fn whitespace_collapsed_and_trimmed() {
        assert_eq!(clean_text("  a\n\n  b\tc  "), "a b c");
        assert_eq!(collapse_whitespace(" x \n y "), "x y");
    }

    #[test]
    fn code_and_colons_survive() {
        let cleaned = clean_text("Use `model.generate()` with key: value");
        assert_eq!(cleaned, "Use `model.generate()` with key: value");
    }
}
