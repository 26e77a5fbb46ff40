//! Updater log tail inspection.
//!
//! The updater writes lines shaped like
//! `1386093513.87:PID-86718:[fresh_software_updater] Fresh software updater started.`
//! The harness only ever looks at the most recent line: it carries the pid of
//! the live updater (the agent restarts itself, so the launch-time pid goes
//! stale) and the markers used to classify a failed update.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::Path;

/// Most recent non-empty line of the updater's own log.
#[derive(Debug, Clone)]
pub struct LogTailRecord {
    pub line: String,
}

impl LogTailRecord {
    /// Read the tail of the log at `path`. A log with no non-empty lines
    /// yields an empty tail rather than an error.
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read updater log {}", path.display()))?;
        let line = text
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string();
        Ok(Self { line })
    }

    /// Extract the updater's pid from the `PID-<digits>:` marker.
    pub fn pid(&self) -> Option<i32> {
        let marker = Regex::new(r"PID-(\d+):").expect("pid marker regex");
        let captures = marker.captures(&self.line)?;
        captures.get(1)?.as_str().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(line: &str) -> LogTailRecord {
        LogTailRecord {
            line: line.to_string(),
        }
    }

    #[test]
    fn reads_the_last_non_empty_line() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("updater.log");
        fs::write(
            &path,
            "1386093513.87:PID-86718:[fresh_software_updater] Fresh software updater started.\n\
             1386093544.51:PID-86754:[do_rsync] Updating files: ['nmmain.py']\n\n   \n",
        )
        .expect("write log");
        let tail = LogTailRecord::read(&path).expect("read tail");
        assert_eq!(
            tail.line,
            "1386093544.51:PID-86754:[do_rsync] Updating files: ['nmmain.py']"
        );
        assert_eq!(tail.pid(), Some(86754));
    }

    #[test]
    fn empty_log_yields_empty_tail() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("updater.log");
        fs::write(&path, "").expect("write log");
        let tail = LogTailRecord::read(&path).expect("read tail");
        assert_eq!(tail.line, "");
        assert_eq!(tail.pid(), None);
    }

    #[test]
    fn missing_log_is_an_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        assert!(LogTailRecord::read(&dir.path().join("gone.log")).is_err());
    }

    #[test]
    fn pid_requires_the_marker() {
        assert_eq!(record("no marker here").pid(), None);
        assert_eq!(record("").pid(), None);
        assert_eq!(record("PID-:[tag] digits missing").pid(), None);
    }

    #[test]
    fn pid_takes_digits_up_to_the_colon() {
        assert_eq!(record("1386093513.87:PID-86718:[tag] ok").pid(), Some(86718));
        assert_eq!(record("PID-42:rest PID-99:ignored").pid(), Some(42));
    }
}
