use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

pub const MAX_FILENAME_LEN: usize = 255;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

const FORBIDDEN: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// File-system-safe name derived from a note title.
///
/// Drops forbidden and control characters, turns whitespace runs into a
/// single hyphen, strips leading dots and caps the result at
/// [`MAX_FILENAME_LEN`] characters without splitting a grapheme.
/// Applying it twice yields the same string.
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|ch| !FORBIDDEN.contains(ch) && (ch.is_whitespace() || !ch.is_control()))
        .collect();
    let hyphenated = WHITESPACE_RUN.replace_all(cleaned.trim(), "-");
    let undotted = hyphenated.trim_start_matches('.');
    truncate_graphemes(undotted, MAX_FILENAME_LEN)
}

/// `<sanitized title>.md`, falling back to `untitled.md`.
pub fn note_filename(title: &str) -> String {
    const EXTENSION: &str = ".md";
    let stem = sanitize_filename(title);
    let stem = if stem.is_empty() {
        "untitled".to_string()
    } else {
        truncate_graphemes(&stem, MAX_FILENAME_LEN - EXTENSION.len())
    };
    format!("{stem}{EXTENSION}")
}

fn truncate_graphemes(input: &str, max_chars: usize) -> String {
    let mut out = String::new();
    let mut count = 0;
    for grapheme in input.graphemes(true) {
        let width = grapheme.chars().count();
        if count + width > max_chars {
            break;
        }
        count += width;
        out.push_str(grapheme);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_forbidden_characters_and_hyphenates() {
        assert_eq!(sanitize_filename("  Heart: failure / <acute>?  "), "Heart-failure-acute");
        assert_eq!(sanitize_filename("a\tb\u{7}c"), "a-bc");
    }

    #[test]
    fn strips_leading_dots() {
        assert_eq!(sanitize_filename("...hidden"), "hidden");
        assert_eq!(sanitize_filename(". x"), "-x");
    }

    #[test]
    fn caps_length_on_grapheme_boundaries() {
        let long = "é".repeat(300);
        let out = sanitize_filename(&long);
        assert_eq!(out.chars().count(), MAX_FILENAME_LEN);

        let combining = "e\u{301}".repeat(200);
        let out = sanitize_filename(&combining);
        assert!(out.chars().count() <= MAX_FILENAME_LEN);
        assert!(out.ends_with('\u{301}'));
    }

    #[test]
    fn is_idempotent_and_clean() {
        let samples = [
            "",
            "   ",
            "..",
            ". . .",
            "Plain",
            "with   many\n\nspaces",
            "a|b*c?d\"e",
            "\u{0}\u{1f}ctrl",
            "..  .lead",
            "ümlaut ünïcode",
        ];
        for sample in samples {
            let once = sanitize_filename(sample);
            assert_eq!(sanitize_filename(&once), once, "not idempotent for {sample:?}");
            assert!(once.chars().all(|ch| !FORBIDDEN.contains(&ch) && !ch.is_control()));
            assert!(once.chars().count() <= MAX_FILENAME_LEN);
        }
        let long = format!("{} {}", "x".repeat(254), "tail");
        let once = sanitize_filename(&long);
        assert_eq!(sanitize_filename(&once), once);
    }

    #[test]
    fn note_filename_falls_back_for_empty_titles() {
        assert_eq!(note_filename("???"), "untitled.md");
        assert_eq!(note_filename("Heart Failure"), "Heart-Failure.md");
        assert!(note_filename(&"y".repeat(400)).chars().count() <= MAX_FILENAME_LEN);
    }
}
