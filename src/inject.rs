//! Tracked-file fault injection.
//!
//! The run corrupts exactly one tracked file so the updater has something to
//! heal. Appending a comment keeps the file loadable by its own toolchain;
//! the only contract is that the content hash moves off the published value.

use crate::util::sha256_file;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Line appended to the tracked file. A correct updater removes it by
/// restoring the published content.
pub const INJECTION_MARKER: &str = "\n# An update should remove this line.\n";

/// Hashes captured around the mutation.
#[derive(Debug, Clone)]
pub struct InjectionRecord {
    pub pre_hash: String,
    pub post_hash: String,
}

/// Append the marker to `tracked_path`, recording the hash on both sides.
pub fn inject(tracked_path: &Path) -> Result<InjectionRecord> {
    let pre_hash = sha256_file(tracked_path)?;
    let mut file = OpenOptions::new()
        .append(true)
        .open(tracked_path)
        .with_context(|| format!("open tracked file {}", tracked_path.display()))?;
    file.write_all(INJECTION_MARKER.as_bytes())
        .with_context(|| format!("append marker to {}", tracked_path.display()))?;
    let post_hash = sha256_file(tracked_path)?;
    tracing::info!(
        pre_hash = %pre_hash,
        post_hash = %post_hash,
        "tracked file tampered"
    );
    Ok(InjectionRecord {
        pre_hash,
        post_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn appending_the_marker_moves_the_hash() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("nmmain.py");
        fs::write(&path, "def main():\n    return 0\n").expect("write tracked file");
        let record = inject(&path).expect("inject");
        assert_ne!(record.pre_hash, record.post_hash);
        let content = fs::read_to_string(&path).expect("read tracked file");
        assert!(content.starts_with("def main():"));
        assert!(content.ends_with(INJECTION_MARKER));
    }

    #[test]
    fn post_hash_matches_the_file_on_disk() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("nmmain.py");
        fs::write(&path, "x = 1\n").expect("write tracked file");
        let record = inject(&path).expect("inject");
        assert_eq!(record.post_hash, sha256_file(&path).expect("rehash"));
    }

    #[test]
    fn missing_tracked_file_is_an_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        assert!(inject(&dir.path().join("gone.py")).is_err());
    }
}
