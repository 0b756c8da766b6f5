//! ANSI escape stripping

use once_cell::sync::Lazy;
use regex::Regex;

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("valid ANSI escape pattern")
});

/// Remove ANSI escape sequences from `text`.
///
/// Idempotent: `strip_ansi(&strip_ansi(s)) == strip_ansi(s)`.
#[must_use]
pub fn strip_ansi(text: &str) -> String {
    let mut current = ANSI_ESCAPE.replace_all(text, "").into_owned();
    // removal can splice a lone ESC onto the bytes after a sequence
    while ANSI_ESCAPE.is_match(&current) {
        current = ANSI_ESCAPE.replace_all(&current, "").into_owned();
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_color_codes() {
        let raw = "\x1b[31mError:\x1b[39m expect(received).toBe(expected)";
        assert_eq!(strip_ansi(raw), "Error: expect(received).toBe(expected)");
    }

    #[test]
    fn strips_single_char_escapes() {
        assert_eq!(strip_ansi("a\x1bMb"), "ab");
    }

    #[test]
    fn nested_escape_is_fully_removed() {
        assert_eq!(strip_ansi("\x1b\x1b[0mAtext"), "text");
    }

    proptest! {
        #[test]
        fn stripping_is_idempotent(s in "(\\x1b|\\[|[0-9;]|[A-Za-z@~ ]){0,64}") {
            let once = strip_ansi(&s);
            prop_assert_eq!(strip_ansi(&once), once.clone());
        }

        #[test]
        fn stripping_arbitrary_text_is_idempotent(s in any::<String>()) {
            let once = strip_ansi(&s);
            prop_assert_eq!(strip_ansi(&once), once.clone());
        }
    }
}
