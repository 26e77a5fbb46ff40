//! One verification run, end to end.
//!
//! The run is a straight-line state machine: fetch, tamper, start the agent,
//! sleep out the window, re-verify, settle. Stages return tagged results
//! instead of bailing out early, one dispatcher maps every post-injection
//! failure to quarantine plus a single notification, and the finalizer
//! (agent termination plus artifact removal) executes on every path out.

use crate::agent::AgentSupervisor;
use crate::archive::{self, Incident};
use crate::config::HarnessConfig;
use crate::fetch;
use crate::inject;
use crate::logtail::LogTailRecord;
use crate::metainfo;
use crate::notify::Notifier;
use crate::verify::{self, FailureReason, VerifyResult};
use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Saved manifest filename under the work dir.
const METAINFO_FILENAME: &str = "metainfo";

/// Subject line for failure and abort notifications.
const FAILURE_SUBJECT: &str = "Software update verification FAILED";

/// States a run moves through, in log order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Init,
    Fetched,
    Injected,
    AgentStarted,
    Waiting,
    VerifiedPass,
    VerifiedFail,
    Archived,
    Cleaned,
}

/// Scheduler-visible outcome of a run.
#[derive(Debug)]
pub enum RunVerdict {
    /// The agent restored the tracked file within the window.
    Pass,
    /// Verification failed; the evidence lives in the incident's backup dir.
    Fail(Incident),
    /// The run stopped before the tracked file was mutated.
    Aborted(String),
}

/// Post-injection failures. All of them quarantine the evidence.
enum RunFailure {
    Inject(anyhow::Error),
    AgentStart(anyhow::Error),
    Inspect(anyhow::Error),
    Update {
        reason: FailureReason,
        log_tail: String,
    },
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunFailure::Inject(err) => write!(f, "fault injection failed: {err:#}"),
            RunFailure::AgentStart(err) => write!(f, "updater agent failed to start: {err:#}"),
            RunFailure::Inspect(err) => write!(f, "tracked file inspection failed: {err:#}"),
            RunFailure::Update { reason, .. } => write!(f, "{reason}"),
        }
    }
}

/// Filesystem layout of one run under the work dir.
struct RunLayout {
    work_dir: PathBuf,
    archive_path: PathBuf,
    snapshot_path: PathBuf,
    metainfo_path: PathBuf,
    agent_dir: PathBuf,
    log_path: PathBuf,
    tracked_path: PathBuf,
}

impl RunLayout {
    fn new(config: &HarnessConfig) -> Result<Self> {
        let work_dir = config.work_dir.clone();
        let archive_path = work_dir.join(fetch::archive_filename(&config.distribution_url)?);
        let snapshot_path = work_dir.join(&config.snapshot_dir);
        let metainfo_path = work_dir.join(METAINFO_FILENAME);
        let agent_dir = work_dir.join(&config.agent_dir);
        let log_path = agent_dir.join(&config.agent_log);
        let tracked_path = agent_dir.join(&config.tracked_file);
        Ok(Self {
            work_dir,
            archive_path,
            snapshot_path,
            metainfo_path,
            agent_dir,
            log_path,
            tracked_path,
        })
    }
}

/// Data carried from the pre-injection stages into the drive.
struct Prepared {
    expected_hash: String,
}

pub struct Run<'a> {
    config: &'a HarnessConfig,
    notifier: &'a dyn Notifier,
    layout: RunLayout,
    supervisor: AgentSupervisor,
    phase: RunPhase,
}

impl<'a> Run<'a> {
    pub fn new(config: &'a HarnessConfig, notifier: &'a dyn Notifier) -> Result<Self> {
        let layout = RunLayout::new(config)?;
        let supervisor = AgentSupervisor::new(
            layout.agent_dir.clone(),
            &config.agent_command,
            layout.log_path.clone(),
        )?;
        Ok(Self {
            config,
            notifier,
            layout,
            supervisor,
            phase: RunPhase::Init,
        })
    }

    /// Execute the full run. `Err` is reserved for a failed quarantine; every
    /// other outcome, including verification failure, is a verdict.
    pub fn execute(mut self) -> Result<RunVerdict> {
        let prepared = match self.prepare() {
            Ok(prepared) => prepared,
            Err(err) => {
                let reason = format!("{err:#}");
                self.notify_abort(&reason);
                self.finalize(false);
                return Ok(RunVerdict::Aborted(reason));
            }
        };
        let staged = self.drive(&prepared);
        let settled = self.settle(staged);
        self.finalize(settled.is_err());
        tracing::debug!(phase = ?self.phase, "run complete");
        settled
    }

    /// Pre-injection stages. Anything failing here aborts without
    /// quarantine, since no tracked file has been touched yet.
    fn prepare(&mut self) -> Result<Prepared> {
        fetch::fetch_archive(
            &self.config.distribution_url,
            &self.layout.archive_path,
            &self.layout.work_dir,
        )?;
        let manifest =
            fetch::fetch_metainfo(&self.config.metainfo_url, &self.layout.metainfo_path)?;
        self.advance(RunPhase::Fetched);
        let records = metainfo::parse_metainfo(&manifest)?;
        let record = records.get(&self.config.tracked_file).ok_or_else(|| {
            anyhow!(
                "tracked file {:?} is not listed in the metainfo",
                self.config.tracked_file
            )
        })?;
        tracing::info!(
            file = %record.filename,
            hash = %record.hash,
            size = %record.size,
            "tracked file listed in metainfo"
        );
        if !self.layout.tracked_path.is_file() {
            return Err(anyhow!(
                "tracked file missing from snapshot: {}",
                self.layout.tracked_path.display()
            ));
        }
        Ok(Prepared {
            expected_hash: record.hash.clone(),
        })
    }

    /// Injection through verification. Every failure is tagged with the
    /// stage it came from so the settle step can report it precisely.
    fn drive(&mut self, prepared: &Prepared) -> Result<(), RunFailure> {
        let injected = inject::inject(&self.layout.tracked_path).map_err(RunFailure::Inject)?;
        self.advance(RunPhase::Injected);
        self.supervisor.start().map_err(RunFailure::AgentStart)?;
        self.advance(RunPhase::AgentStarted);
        self.advance(RunPhase::Waiting);
        self.supervisor
            .await_window(Duration::from_secs(self.config.window_secs));
        let outcome = verify::verify(
            &self.layout.tracked_path,
            &prepared.expected_hash,
            &self.layout.log_path,
        )
        .map_err(RunFailure::Inspect)?;
        match outcome {
            VerifyResult::Pass => Ok(()),
            VerifyResult::Fail {
                reason,
                log_tail,
                actual_hash,
            } => {
                if actual_hash == injected.post_hash {
                    tracing::info!("tracked file untouched since injection");
                } else {
                    tracing::info!(
                        "tracked file changed since injection but misses the published hash"
                    );
                }
                Err(RunFailure::Update { reason, log_tail })
            }
        }
    }

    /// Map the staged outcome to a verdict. Failures quarantine the
    /// artifacts, repoint agent termination at the moved log, and notify
    /// exactly once.
    fn settle(&mut self, staged: Result<(), RunFailure>) -> Result<RunVerdict> {
        let failure = match staged {
            Ok(()) => {
                self.advance(RunPhase::VerifiedPass);
                self.log_pass_tail();
                return Ok(RunVerdict::Pass);
            }
            Err(failure) => failure,
        };
        if matches!(failure, RunFailure::Update { .. }) {
            self.advance(RunPhase::VerifiedFail);
        }
        let reason = failure.to_string();
        tracing::error!("verification failed: {reason}");
        let moves = [
            self.layout.snapshot_path.clone(),
            self.layout.metainfo_path.clone(),
            self.layout.archive_path.clone(),
        ];
        let incident = archive::quarantine(&self.layout.work_dir, &reason, &moves)
            .context("quarantine run artifacts")?;
        self.advance(RunPhase::Archived);
        let relocated_log = incident.relocated(&self.layout.work_dir, self.supervisor.log_path());
        self.supervisor.repoint_log(relocated_log);
        let body = failure_report(&failure, &incident);
        if let Err(err) = self.notifier.notify(FAILURE_SUBJECT, &body) {
            tracing::warn!("failure notification not delivered: {err:#}");
        }
        Ok(RunVerdict::Fail(incident))
    }

    /// Terminate the agent, then clear whatever transient artifacts are
    /// still at their original paths. Runs on every exit; a failed
    /// quarantine leaves everything in place for inspection.
    fn finalize(&mut self, preserve_evidence: bool) {
        self.supervisor.terminate();
        if preserve_evidence {
            tracing::warn!("leaving artifacts in place after a quarantine failure");
            return;
        }
        tracing::info!("removing run artifacts");
        remove_path(&self.layout.archive_path);
        remove_path(&self.layout.snapshot_path);
        remove_path(&self.layout.metainfo_path);
        self.advance(RunPhase::Cleaned);
    }

    fn advance(&mut self, phase: RunPhase) {
        self.phase = phase;
        tracing::debug!(?phase, "run state");
    }

    /// A passing run still records what the updater last said; surprises in
    /// a "clean" log tend to show up here first.
    fn log_pass_tail(&self) {
        match LogTailRecord::read(&self.layout.log_path) {
            Ok(record) => tracing::info!(tail = %record.line, "updater log after pass"),
            Err(err) => tracing::warn!("updater log unreadable after pass: {err:#}"),
        }
    }

    fn notify_abort(&self, reason: &str) {
        let body = abort_report(reason);
        if let Err(err) = self.notifier.notify(FAILURE_SUBJECT, &body) {
            tracing::warn!("abort notification not delivered: {err:#}");
        }
    }
}

/// Remove one artifact at its original path. Quarantined runs already moved
/// theirs, so a missing path is fine.
fn remove_path(path: &Path) {
    let outcome = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    if let Err(err) = outcome {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::warn!("failed to remove {}: {err}", path.display());
        }
    }
}

fn failure_report(failure: &RunFailure, incident: &Incident) -> String {
    let mut body = String::new();
    body.push_str("The updater verification run failed.\n");
    body.push_str(&format!("Reason: {failure}\n"));
    body.push_str(&format!("Quarantined at: {}\n", incident.timestamp));
    body.push_str(&format!(
        "Backup directory: {}\n",
        incident.backup_dir.display()
    ));
    for path in &incident.evidence {
        body.push_str(&format!("  moved: {}\n", path.display()));
    }
    if let RunFailure::Update { log_tail, .. } = failure {
        if !log_tail.is_empty() {
            body.push_str("----------------------------------------\n");
            body.push_str(&format!("updater log tail: {log_tail}\n"));
        }
    }
    body
}

fn abort_report(reason: &str) -> String {
    format!(
        "The updater verification run stopped before fault injection.\n\
         Reason: {reason}\n\
         Nothing was mutated and no artifacts were quarantined.\n"
    )
}
