//! Harness configuration.
//!
//! Everything a run needs lives in one explicit JSON document; nothing hides
//! in process globals. The invocation surface stays flag-free for schedulers,
//! so the config path is resolved from `--config`, then `$UPDRILL_CONFIG`,
//! then `./updrill.json`, then the user config directory.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Component, Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Environment variable naming an explicit config path.
pub const CONFIG_ENV: &str = "UPDRILL_CONFIG";

/// Config filename looked up in the scheduler's working directory.
const LOCAL_CONFIG_FILE: &str = "updrill.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    pub schema_version: u32,
    /// URL of the distribution archive (a gzip tarball).
    pub distribution_url: String,
    /// URL of the published metainfo manifest.
    pub metainfo_url: String,
    /// Directory owning every run artifact.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Top-level directory the archive unpacks to, relative to `work_dir`.
    pub snapshot_dir: String,
    /// Directory the updater agent runs from, relative to `work_dir`.
    pub agent_dir: String,
    /// Command line that starts the updater agent inside `agent_dir`.
    pub agent_command: String,
    /// Filename of the agent's own log, relative to `agent_dir`.
    pub agent_log: String,
    /// File to tamper with, relative to `agent_dir`; must be listed in the
    /// metainfo under this exact name.
    pub tracked_file: String,
    /// Verification window in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Optional command line receiving failure reports on stdin.
    #[serde(default)]
    pub notify_command: Option<String>,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_window_secs() -> u64 {
    60 * 60
}

/// Resolve the config path from the CLI flag, the environment, or the
/// well-known locations.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = cli_path {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Ok(local);
    }
    if let Some(config_dir) = dirs::config_dir() {
        let candidate = config_dir.join("updrill").join("config.json");
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(anyhow!(
        "no config found: pass --config, set {CONFIG_ENV}, or create ./{LOCAL_CONFIG_FILE}"
    ))
}

pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let config: HarnessConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parse config {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &HarnessConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {} (expected {CONFIG_SCHEMA_VERSION})",
            config.schema_version
        ));
    }
    validate_url(&config.distribution_url, "distribution_url")?;
    validate_url(&config.metainfo_url, "metainfo_url")?;
    validate_relative_path(&config.snapshot_dir, "snapshot_dir")?;
    validate_relative_path(&config.agent_dir, "agent_dir")?;
    validate_relative_path(&config.agent_log, "agent_log")?;
    validate_relative_path(&config.tracked_file, "tracked_file")?;
    if !Path::new(&config.agent_dir).starts_with(&config.snapshot_dir) {
        return Err(anyhow!(
            "agent_dir {:?} must live under snapshot_dir {:?}",
            config.agent_dir,
            config.snapshot_dir
        ));
    }
    if config.agent_command.trim().is_empty() {
        return Err(anyhow!("agent_command must be non-empty"));
    }
    if config.window_secs == 0 {
        return Err(anyhow!("window_secs must be at least 1"));
    }
    Ok(())
}

fn validate_url(url: &str, label: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow!("{label} must be an http(s) URL (got {url:?})"))
    }
}

fn validate_relative_path(rel: &str, label: &str) -> Result<()> {
    if rel.trim().is_empty() {
        return Err(anyhow!("{label} must be non-empty"));
    }
    let path = Path::new(rel);
    if path.is_absolute() {
        return Err(anyhow!("{label} must be a relative path (got {rel:?})"));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(anyhow!("{label} must not contain '..' (got {rel:?})"));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
