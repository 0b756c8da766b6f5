//! Polling-based file stability detection
//!
//! A test runner may still be flushing its report when it exits. A report is
//! trusted only once its mtime is newer than the pre-run value and its size
//! has stayed the same across two consecutive polls.

use crate::error::ReportError;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Poll timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            interval: Duration::from_millis(500),
        }
    }
}

impl StabilityPolicy {
    pub fn from_millis(timeout_ms: u64, interval_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(interval_ms.max(1)),
        }
    }
}

/// Observed state of a stable file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StableFile {
    pub modified: SystemTime,
    pub len: u64,
}

/// Wait until `path` has been rewritten after `prior` and stopped growing.
///
/// `prior = None` means the file did not exist before the run, so any
/// modification time counts as new.
pub async fn wait_for_stable(
    path: &Path,
    prior: Option<SystemTime>,
    policy: StabilityPolicy,
) -> Result<StableFile, ReportError> {
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut last_len: Option<u64> = None;

    loop {
        match tokio::fs::metadata(path).await {
            Ok(meta) => {
                let modified = meta.modified().map_err(|e| ReportError::io(path, e))?;
                let fresh = prior.map_or(true, |p| modified > p);
                if fresh {
                    if last_len == Some(meta.len()) {
                        tracing::debug!(
                            path = %path.display(),
                            len = meta.len(),
                            waited_ms = started.elapsed().as_millis() as u64,
                            "report stable"
                        );
                        return Ok(StableFile {
                            modified,
                            len: meta.len(),
                        });
                    }
                    last_len = Some(meta.len());
                } else {
                    last_len = None;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => last_len = None,
            Err(e) => return Err(ReportError::io(path, e)),
        }

        if Instant::now() >= deadline {
            tracing::warn!(path = %path.display(), "report update not observed");
            return Err(ReportError::UpdateNotObserved {
                path: path.to_path_buf(),
                waited_ms: policy.timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(policy.interval).await;
    }
}
