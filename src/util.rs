use anyhow::{Context, Result};
use sha2::Digest;
use std::fs;
use std::io;
use std::path::Path;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash a file's contents without loading the whole file into memory.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = sha2::Sha256::new();
    io::copy(&mut file, &mut hasher).with_context(|| format!("hash {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_digest_of_known_input() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn file_digest_matches_buffer_digest() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("sample.txt");
        fs::write(&path, b"some tracked content\n").expect("write sample");
        let from_file = sha256_file(&path).expect("hash file");
        assert_eq!(from_file, sha256_hex(b"some tracked content\n"));
    }

    #[test]
    fn file_digest_reports_missing_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let missing = dir.path().join("nope.txt");
        assert!(sha256_file(&missing).is_err());
    }
}
