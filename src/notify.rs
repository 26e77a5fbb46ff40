//! Failure notification boundary.
//!
//! Delivery is an external collaborator behind one narrow interface: the run
//! hands over a subject and a body at most once and never looks deeper. With
//! no command configured, reports land in the harness log, which keeps local
//! and scheduled invocations self-contained.

use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};

/// Delivery interface for incident reports.
pub trait Notifier {
    /// Verify the channel is usable before the run mutates anything.
    fn preflight(&self) -> Result<()>;
    /// Deliver one report. The subject rides as the command's final
    /// argument, the body on stdin.
    fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

/// Build the configured notifier, defaulting to log-only delivery.
pub fn from_config(notify_command: Option<&str>) -> Result<Box<dyn Notifier>> {
    match notify_command {
        Some(command) => Ok(Box::new(CommandNotifier::new(command)?)),
        None => Ok(Box::new(LogNotifier)),
    }
}

/// Pipes reports into a configured command, e.g. a `mail -s` wrapper.
pub struct CommandNotifier {
    argv: Vec<String>,
}

impl CommandNotifier {
    pub fn new(command: &str) -> Result<Self> {
        let argv = shell_words::split(command)
            .with_context(|| format!("parse notify command {command:?}"))?;
        if argv.is_empty() {
            return Err(anyhow!("notify_command must not be empty"));
        }
        Ok(Self { argv })
    }
}

impl Notifier for CommandNotifier {
    fn preflight(&self) -> Result<()> {
        which::which(&self.argv[0])
            .map(|_| ())
            .with_context(|| format!("notify command not found: {}", self.argv[0]))
    }

    fn notify(&self, subject: &str, body: &str) -> Result<()> {
        let mut child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .arg(subject)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn notify command {}", self.argv[0]))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(body.as_bytes())
                .context("write report to notify command")?;
        }
        let status = child.wait().context("wait for notify command")?;
        if !status.success() {
            return Err(anyhow!("notify command exited with {status}"));
        }
        Ok(())
    }
}

/// Fallback that records the report in the harness log only.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    fn notify(&self, subject: &str, body: &str) -> Result<()> {
        tracing::error!(subject, "incident report (no notify_command configured)\n{body}");
        Ok(())
    }
}
