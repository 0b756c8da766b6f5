//! Error text extraction for failing specs

use crate::ansi::strip_ansi;
use crate::schema::RawError;

const ERROR_PREFIX: &str = "Error:";
const TIMEOUT_PREFIX: &str = "Test timeout";
const WAITING_FOR: &str = "waiting for";
const SUMMARY_SCAN_CHARS: usize = 128;
const SUMMARY_FALLBACK_CHARS: usize = 40;

/// Short display summary of an (already stripped) error message.
///
/// Within the first 128 characters, the text from `Error:` up to the first
/// newline; otherwise the first 40 characters.
#[must_use]
pub fn error_summary(message: &str) -> Option<String> {
    if message.is_empty() {
        return None;
    }
    let head: String = message.chars().take(SUMMARY_SCAN_CHARS).collect();
    if let Some(start) = head.find(ERROR_PREFIX) {
        let remainder = &head[start..];
        if let Some(newline) = remainder.find('\n') {
            return Some(remainder[..newline].to_owned());
        }
    }
    Some(message.chars().take(SUMMARY_FALLBACK_CHARS).collect())
}

/// Whether a message is the generic test-timeout text
#[must_use]
pub fn is_timeout(message: &str) -> bool {
    message.starts_with(TIMEOUT_PREFIX)
}

/// First line starting at `waiting for` in the first secondary error that
/// begins with `Error:` and mentions it. The prefix is matched against the
/// raw message; only the extracted line is stripped of ANSI codes.
pub(crate) fn waiting_for_fragment(errors: &[RawError]) -> Option<String> {
    errors.iter().find_map(|err| {
        let message = err.message.as_deref()?;
        if !message.starts_with(ERROR_PREFIX) {
            return None;
        }
        let start = message.find(WAITING_FOR)?;
        let remainder = &message[start..];
        let line = remainder.split('\n').next().unwrap_or(remainder);
        Some(strip_ansi(line))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(message: &str) -> RawError {
        RawError {
            message: Some(message.to_owned()),
            stack: None,
        }
    }

    #[test]
    fn summary_takes_error_line() {
        let msg = "expect failed\nError: locator not visible\n  at page.ts:3";
        assert_eq!(
            error_summary(msg).as_deref(),
            Some("Error: locator not visible")
        );
    }

    #[test]
    fn summary_falls_back_to_prefix() {
        let msg = "Timed out 5000ms waiting for expect(locator).toBeVisible() to pass";
        assert_eq!(
            error_summary(msg).unwrap(),
            "Timed out 5000ms waiting for expect(loca"
        );
    }

    #[test]
    fn summary_ignores_error_beyond_scan_window() {
        let msg = format!("{}Error: late\n", "x".repeat(130));
        assert_eq!(error_summary(&msg).unwrap(), "x".repeat(40));
    }

    #[test]
    fn summary_error_without_newline_in_window_falls_back() {
        let msg = "Error: no newline here";
        assert_eq!(error_summary(msg).unwrap(), "Error: no newline here");
    }

    #[test]
    fn summary_counts_characters_not_bytes() {
        let msg = "エラー".repeat(20);
        assert_eq!(error_summary(&msg).unwrap().chars().count(), 40);
    }

    #[test]
    fn empty_message_has_no_summary() {
        assert_eq!(error_summary(""), None);
    }

    #[test]
    fn waiting_for_picks_first_matching_error() {
        let errors = vec![
            err("Test timeout of 30000ms exceeded."),
            err("Error: locator.click: Test timeout\n\x1b[2mwaiting for getByRole('button')\x1b[22m\n  - more"),
            err("Error: waiting for something else"),
        ];
        assert_eq!(
            waiting_for_fragment(&errors).as_deref(),
            Some("waiting for getByRole('button')")
        );
    }

    #[test]
    fn waiting_for_requires_error_prefix() {
        let errors = vec![err("waiting for x")];
        assert_eq!(waiting_for_fragment(&errors), None);
    }

    #[test]
    fn waiting_for_prefix_is_checked_before_stripping() {
        let errors = vec![
            err("\x1b[31mError: click failed\nwaiting for getByText('A')"),
            err("Error: fill failed\nwaiting for getByText('B')"),
        ];
        assert_eq!(
            waiting_for_fragment(&errors).as_deref(),
            Some("waiting for getByText('B')")
        );
    }
}
