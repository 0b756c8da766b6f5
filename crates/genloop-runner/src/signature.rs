//! Output line signatures the runner reacts to

const STATUS_404: &str = "\"status\":404";
const ERROR_PREFIX: &str = "Error:";
const PORT_IN_USE: &str = "already used";
/// Printed when a visual comparison has no baseline image yet
pub const SNAPSHOT_MISSING: &str = "Error: A snapshot doesn't exist at";

/// What a single line of runner output means for the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSignal {
    /// The app under test answered 404; abort now
    NotFound,
    /// The runner's web server port is taken; abort now
    PortInUse,
    /// Baseline snapshot missing; eligible for one refresh rerun
    SnapshotMissing,
}

impl LineSignal {
    /// Signals that stop the run without waiting for exit
    #[inline]
    #[must_use]
    pub fn is_abort(self) -> bool {
        matches!(self, Self::NotFound | Self::PortInUse)
    }

    /// Diagnostic text for an abort
    #[must_use]
    pub fn detail(self) -> &'static str {
        match self {
            Self::NotFound => "Detected 404 in test output",
            Self::PortInUse => "Test server port already in use",
            Self::SnapshotMissing => "Baseline snapshot missing",
        }
    }
}

/// Classify one line of runner output
#[must_use]
pub fn classify_line(line: &str) -> Option<LineSignal> {
    if line.contains(STATUS_404) {
        Some(LineSignal::NotFound)
    } else if line.contains(ERROR_PREFIX) && line.contains(PORT_IN_USE) {
        Some(LineSignal::PortInUse)
    } else if line.contains(SNAPSHOT_MISSING) {
        Some(LineSignal::SnapshotMissing)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_lines() {
        assert_eq!(
            classify_line(r#"{"url":"/booking","status":404}"#),
            Some(LineSignal::NotFound)
        );
        assert_eq!(
            classify_line("Error: http://localhost:3000 is already used, make sure that nothing is running on the port"),
            Some(LineSignal::PortInUse)
        );
        assert_eq!(
            classify_line("    Error: A snapshot doesn't exist at /out/tests/home.spec.ts-snapshots/hero.png, writing actual."),
            Some(LineSignal::SnapshotMissing)
        );
        assert_eq!(classify_line("  3 passed (4.2s)"), None);
    }

    #[test]
    fn already_used_needs_error_prefix() {
        assert_eq!(classify_line("port already used"), None);
    }

    #[test]
    fn only_404_and_port_abort() {
        assert!(LineSignal::NotFound.is_abort());
        assert!(LineSignal::PortInUse.is_abort());
        assert!(!LineSignal::SnapshotMissing.is_abort());
    }
}
