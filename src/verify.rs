//! Post-window verification and failure classification.
//!
//! A hash mismatch alone cannot distinguish "the agent never ran" from "its
//! metainfo signature lapsed" from "a rival updater held the lock". The last
//! line of the updater's own log carries the markers that tell these apart,
//! and each cause is reported distinctly.

use crate::logtail::LogTailRecord;
use crate::util::sha256_file;
use anyhow::Result;
use std::fmt;
use std::path::Path;

/// Marker the updater logs when the published metainfo signature lapsed.
/// The updater reports it once per verification pass, and a run that failed
/// on expiry shows at least two passes in one line.
pub const SIGNATURE_EXPIRED_MARKER: &str = "Expired signature";

/// Marker the updater logs when an older updater instance still holds on.
pub const CONCURRENT_UPDATER_MARKER: &str = "Another software updater old process";

/// Why verification failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    SignatureExpired,
    ConcurrentUpdater,
    UnknownUpdateFailure,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::SignatureExpired => "the metainfo signature has expired",
            FailureReason::ConcurrentUpdater => {
                "another software updater instance is still running"
            }
            FailureReason::UnknownUpdateFailure => {
                "the tracked file was not restored within the verification window"
            }
        };
        f.write_str(text)
    }
}

/// Outcome of re-hashing the tracked file after the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Pass,
    Fail {
        reason: FailureReason,
        log_tail: String,
        actual_hash: String,
    },
}

/// Classify a failed update from the updater's most recent log line.
pub fn classify_failure(log_line: &str) -> FailureReason {
    if log_line.matches(SIGNATURE_EXPIRED_MARKER).count() >= 2 {
        return FailureReason::SignatureExpired;
    }
    if log_line.contains(CONCURRENT_UPDATER_MARKER) {
        return FailureReason::ConcurrentUpdater;
    }
    FailureReason::UnknownUpdateFailure
}

/// Re-hash the tracked file and compare against the published hash. On a
/// mismatch the updater log is consulted for classification; an unreadable
/// log degrades to an empty tail rather than masking the mismatch.
pub fn verify(
    tracked_path: &Path,
    expected_hash: &str,
    log_path: &Path,
) -> Result<VerifyResult> {
    let actual_hash = sha256_file(tracked_path)?;
    if actual_hash == expected_hash {
        tracing::info!("tracked file matches the published hash");
        return Ok(VerifyResult::Pass);
    }
    let log_tail = match LogTailRecord::read(log_path) {
        Ok(record) => record.line,
        Err(err) => {
            tracing::warn!("updater log unreadable during classification: {err:#}");
            String::new()
        }
    };
    let reason = classify_failure(&log_tail);
    Ok(VerifyResult::Fail {
        reason,
        log_tail,
        actual_hash,
    })
}
