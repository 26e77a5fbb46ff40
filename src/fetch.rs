//! Distribution and manifest retrieval.
//!
//! The archive streams straight to disk and unpacks under the work dir; the
//! manifest is small enough to hold in memory but is also saved verbatim so
//! a failed run can quarantine the exact bytes it verified against.

use anyhow::{anyhow, Result};
use flate2::read::GzDecoder;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("download {url}")]
    Download {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error("{op} {path}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    fn download(url: &str, source: ureq::Error) -> Self {
        FetchError::Download {
            url: url.to_string(),
            source: Box::new(source),
        }
    }

    fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        FetchError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Derive the on-disk archive filename from the distribution URL.
pub fn archive_filename(url: &str) -> Result<String> {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    let name = trimmed.rsplit('/').next().unwrap_or("");
    if name.is_empty() || !trimmed.contains("://") {
        return Err(anyhow!(
            "distribution_url must end in an archive filename (got {url:?})"
        ));
    }
    Ok(name.to_string())
}

/// Download the distribution archive to `archive_path` and unpack it under
/// `work_dir`. A stale archive from an earlier run is replaced.
pub fn fetch_archive(url: &str, archive_path: &Path, work_dir: &Path) -> Result<(), FetchError> {
    if archive_path.exists() {
        fs::remove_file(archive_path)
            .map_err(|source| FetchError::io("remove stale archive", archive_path, source))?;
    }
    tracing::info!(url, "downloading distribution archive");
    let mut response = ureq::get(url)
        .call()
        .map_err(|source| FetchError::download(url, source))?;
    let mut reader = response.body_mut().as_reader();
    let mut file = fs::File::create(archive_path)
        .map_err(|source| FetchError::io("create", archive_path, source))?;
    io::copy(&mut reader, &mut file)
        .map_err(|source| FetchError::io("save", archive_path, source))?;
    unpack_archive(archive_path, work_dir)
}

/// Unpack a gzip tarball under `dest_dir`.
pub(crate) fn unpack_archive(archive_path: &Path, dest_dir: &Path) -> Result<(), FetchError> {
    tracing::info!(
        archive = %archive_path.display(),
        "unpacking distribution archive"
    );
    let file = fs::File::open(archive_path)
        .map_err(|source| FetchError::io("open", archive_path, source))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive
        .unpack(dest_dir)
        .map_err(|source| FetchError::io("unpack", archive_path, source))
}

/// Download the metainfo manifest, saving a verbatim copy to `save_path`.
pub fn fetch_metainfo(url: &str, save_path: &Path) -> Result<String, FetchError> {
    tracing::info!(url, "downloading metainfo");
    let mut response = ureq::get(url)
        .call()
        .map_err(|source| FetchError::download(url, source))?;
    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|source| FetchError::download(url, source))?;
    fs::write(save_path, &text).map_err(|source| FetchError::io("save", save_path, source))?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn archive_filename_takes_the_url_basename() {
        let name = archive_filename("https://updates.example.org/dist/seattle_linux.tgz")
            .expect("basename");
        assert_eq!(name, "seattle_linux.tgz");
    }

    #[test]
    fn archive_filename_ignores_query_and_fragment() {
        let name =
            archive_filename("http://host/path/dist.tgz?token=abc#frag").expect("basename");
        assert_eq!(name, "dist.tgz");
    }

    #[test]
    fn archive_filename_rejects_trailing_slash() {
        assert!(archive_filename("https://updates.example.org/dist/").is_err());
    }

    fn sample_tgz() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let data = b"print('hello')\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "snapshot/agent/nmmain.py", data.as_slice())
            .expect("append entry");
        let tar_bytes = builder.into_inner().expect("finish tar");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).expect("gzip tar");
        encoder.finish().expect("finish gzip")
    }

    #[test]
    fn unpack_recreates_the_snapshot_tree() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let archive_path = dir.path().join("dist.tgz");
        fs::write(&archive_path, sample_tgz()).expect("write archive");
        unpack_archive(&archive_path, dir.path()).expect("unpack");
        let unpacked = dir.path().join("snapshot/agent/nmmain.py");
        assert_eq!(
            fs::read_to_string(unpacked).expect("read unpacked"),
            "print('hello')\n"
        );
    }

    #[test]
    fn unpack_rejects_a_non_archive() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let archive_path = dir.path().join("dist.tgz");
        fs::write(&archive_path, b"this is not a tarball").expect("write junk");
        assert!(unpack_archive(&archive_path, dir.path()).is_err());
    }
}
