//! CLI argument parsing for the harness.
//!
//! The invocation surface is intentionally flat: one run per invocation and
//! zero required arguments, so a scheduler entry is just the binary name.
use clap::Parser;
use std::path::PathBuf;

/// Root CLI entrypoint for the verification harness.
#[derive(Parser, Debug)]
#[command(
    name = "updrill",
    version,
    about = "End-to-end verification drill for the software update pipeline",
    after_help = "One invocation performs one drill: download the configured\ndistribution, tamper with a tracked file, start the updater agent, wait out\nthe verification window, and check that the file was restored. Failed runs\nquarantine their artifacts into a backup-<timestamp> directory and send one\nnotification.\n\nIntended to run from a scheduler, e.g.:\n  0 14 * * * updrill >> /var/log/updrill.log 2>&1\n\nConfig resolution order:\n  --config PATH, then $UPDRILL_CONFIG, then ./updrill.json, then\n  <user config dir>/updrill/config.json\n\nExit codes:\n  0  tracked file restored within the window\n  1  verification failed (artifacts quarantined)\n  2  run aborted before fault injection"
)]
pub struct RootArgs {
    /// Path to the harness config JSON
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
