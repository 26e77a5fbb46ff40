//! Incident quarantine.
//!
//! Failed runs keep their evidence: the unpacked tree, the saved manifest,
//! and the downloaded archive move into a timestamped backup directory
//! instead of being deleted. A move that cannot complete escalates;
//! evidence moves never degrade to warnings the way termination does.

use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("create backup directory {path}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("move {src} into {dest}")]
    Move {
        src: PathBuf,
        dest: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("artifact {path} has no filename")]
    Unnamed { path: PathBuf },
}

/// A quarantined run: when it failed, why, and where the evidence went.
#[derive(Debug, Clone)]
pub struct Incident {
    pub timestamp: String,
    pub backup_dir: PathBuf,
    pub reason: String,
    pub evidence: Vec<PathBuf>,
}

impl Incident {
    /// Where a path that lived under the work dir now lives. Paths outside
    /// the work dir are returned unchanged.
    pub fn relocated(&self, work_dir: &Path, original: &Path) -> PathBuf {
        match original.strip_prefix(work_dir) {
            Ok(rel) => self.backup_dir.join(rel),
            Err(_) => original.to_path_buf(),
        }
    }
}

/// Move each artifact in `moves` into a fresh `backup-<timestamp>` directory
/// under `work_dir`.
pub fn quarantine(
    work_dir: &Path,
    reason: &str,
    moves: &[PathBuf],
) -> Result<Incident, ArchiveError> {
    let timestamp = Local::now().format("%Y-%m-%d-%H:%M:%S").to_string();
    let backup_dir = work_dir.join(format!("backup-{timestamp}"));
    fs::create_dir_all(&backup_dir).map_err(|source| ArchiveError::Create {
        path: backup_dir.clone(),
        source,
    })?;
    let mut evidence = Vec::new();
    for src in moves {
        let name = src.file_name().ok_or_else(|| ArchiveError::Unnamed {
            path: src.clone(),
        })?;
        let dest = backup_dir.join(name);
        fs::rename(src, &dest).map_err(|source| ArchiveError::Move {
            src: src.clone(),
            dest: dest.clone(),
            source,
        })?;
        evidence.push(dest);
    }
    tracing::info!(backup = %backup_dir.display(), "run artifacts quarantined");
    Ok(Incident {
        timestamp,
        backup_dir,
        reason: reason.to_string(),
        evidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_every_artifact_into_the_backup_dir() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let work = dir.path();
        fs::create_dir_all(work.join("seattle/agent")).expect("create tree");
        fs::write(work.join("seattle/agent/nmmain.py"), "tampered").expect("write tracked");
        fs::write(work.join("metainfo"), "nmmain.py abc 1\n").expect("write manifest");
        fs::write(work.join("dist.tgz"), "archive bytes").expect("write archive");

        let moves = [
            work.join("seattle"),
            work.join("metainfo"),
            work.join("dist.tgz"),
        ];
        let incident =
            quarantine(work, "tracked file not restored", &moves).expect("quarantine");

        assert!(!work.join("seattle").exists());
        assert!(!work.join("metainfo").exists());
        assert!(!work.join("dist.tgz").exists());
        assert!(incident.backup_dir.join("seattle/agent/nmmain.py").is_file());
        assert!(incident.backup_dir.join("metainfo").is_file());
        assert!(incident.backup_dir.join("dist.tgz").is_file());
        assert_eq!(incident.evidence.len(), 3);
        assert_eq!(incident.reason, "tracked file not restored");
    }

    #[test]
    fn backup_dir_name_carries_the_timestamp() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let incident = quarantine(dir.path(), "reason", &[]).expect("quarantine");
        let name = incident
            .backup_dir
            .file_name()
            .and_then(|name| name.to_str())
            .expect("backup dir name");
        assert_eq!(name, format!("backup-{}", incident.timestamp));
        assert!(incident.backup_dir.is_dir());
    }

    #[test]
    fn missing_artifact_escalates() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let moves = [dir.path().join("never-existed")];
        let err = quarantine(dir.path(), "reason", &moves).expect_err("missing artifact");
        assert!(matches!(err, ArchiveError::Move { .. }));
    }

    #[test]
    fn relocated_maps_paths_under_the_work_dir() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let work = dir.path();
        let incident = quarantine(work, "reason", &[]).expect("quarantine");
        let log = work.join("seattle/agent/updater.log");
        assert_eq!(
            incident.relocated(work, &log),
            incident.backup_dir.join("seattle/agent/updater.log")
        );
        let outside = Path::new("/var/log/elsewhere.log");
        assert_eq!(incident.relocated(work, outside), outside.to_path_buf());
    }
}
