//! Metainfo manifest parsing.
//!
//! The update site publishes a signed listing of the files it serves. Only
//! the record lines matter here: comment (`#`) and signature (`!`) lines are
//! skipped, and every remaining non-blank line must carry exactly
//! `<filename> <hash> <size>`.

use std::collections::BTreeMap;
use thiserror::Error;

/// One tracked-file record from the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetainfoRecord {
    pub filename: String,
    pub hash: String,
    pub size: String,
}

#[derive(Debug, Error)]
pub enum MetainfoError {
    /// A record line did not split into exactly three fields.
    #[error("malformed metainfo line: {line:?}")]
    MalformedLine { line: String },
}

/// Parse manifest text into records keyed by tracked filename.
///
/// Later records for the same filename replace earlier ones.
pub fn parse_metainfo(text: &str) -> Result<BTreeMap<String, MetainfoRecord>, MetainfoError> {
    let mut records = BTreeMap::new();
    for line in text.lines() {
        if line.trim().is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(MetainfoError::MalformedLine {
                line: line.to_string(),
            });
        }
        let record = MetainfoRecord {
            filename: fields[0].to_string(),
            hash: fields[1].to_string(),
            size: fields[2].to_string(),
        };
        records.insert(record.filename.clone(), record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# metainfo for the distribution site
!signature 0a1b2c3d
nmmain.py 5c07e1af9e7908b2a743e18c461ca095ad66028d 24288

softwareupdater.py 9d0e2f3a4b5c6d7e8f90a1b2c3d4e5f607182930 31337
";

    #[test]
    fn parses_records_and_skips_decoration() {
        let records = parse_metainfo(SAMPLE).expect("parse sample");
        assert_eq!(records.len(), 2);
        let record = records.get("nmmain.py").expect("nmmain record");
        assert_eq!(record.hash, "5c07e1af9e7908b2a743e18c461ca095ad66028d");
        assert_eq!(record.size, "24288");
    }

    #[test]
    fn whitespace_only_lines_are_skipped() {
        let records = parse_metainfo("   \n\t\nnmmain.py abc 1\n").expect("parse");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn short_record_line_is_rejected() {
        let err = parse_metainfo("nmmain.py 5c07e1af\n").expect_err("two fields");
        let MetainfoError::MalformedLine { line } = err;
        assert_eq!(line, "nmmain.py 5c07e1af");
    }

    #[test]
    fn long_record_line_is_rejected() {
        assert!(parse_metainfo("nmmain.py abc 123 extra\n").is_err());
    }

    #[test]
    fn repeated_filename_keeps_the_last_record() {
        let records =
            parse_metainfo("nmmain.py old 1\nnmmain.py new 2\n").expect("parse duplicates");
        assert_eq!(records.get("nmmain.py").expect("record").hash, "new");
    }

    #[test]
    fn empty_manifest_yields_no_records() {
        assert!(parse_metainfo("").expect("parse empty").is_empty());
    }
}
