//! Updater agent supervision.
//!
//! The supervisor owns three duties: start the agent detached from the
//! harness, hold the run for the verification window, and make sure some
//! agent process dies at the end. Termination trusts the log tail over the
//! launch-time pid because the agent re-execs itself partway through an
//! update; the log itself can move when a failed run is quarantined.

use crate::logtail::LogTailRecord;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

pub struct AgentSupervisor {
    agent_dir: PathBuf,
    argv: Vec<String>,
    log_path: PathBuf,
    launch_pid: Option<u32>,
    terminated: bool,
}

impl AgentSupervisor {
    pub fn new(agent_dir: PathBuf, command: &str, log_path: PathBuf) -> Result<Self> {
        let argv = shell_words::split(command)
            .with_context(|| format!("parse agent command {command:?}"))?;
        if argv.is_empty() {
            return Err(anyhow!("agent_command must not be empty"));
        }
        Ok(Self {
            agent_dir,
            argv,
            log_path,
            launch_pid: None,
            terminated: false,
        })
    }

    /// Launch the agent detached, running from its own directory. The
    /// working-directory change applies to the child only; the harness never
    /// changes its own cwd. The returned launch-time pid is informational,
    /// termination re-derives the live pid from the log.
    pub fn start(&mut self) -> Result<u32> {
        let program = self.resolve_program()?;
        let child = Command::new(&program)
            .args(&self.argv[1..])
            .current_dir(&self.agent_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("start updater agent {}", program.display()))?;
        let pid = child.id();
        self.launch_pid = Some(pid);
        tracing::info!(pid, "updater agent started");
        Ok(pid)
    }

    /// Bare program names resolve through PATH; anything with a path
    /// component resolves against the agent directory, matching the cwd the
    /// agent runs with.
    fn resolve_program(&self) -> Result<PathBuf> {
        let name = &self.argv[0];
        if Path::new(name).components().count() > 1 {
            return Ok(self.agent_dir.join(name));
        }
        which::which(name).with_context(|| format!("agent program not found in PATH: {name}"))
    }

    /// Hold the run for the fixed verification window. One bounded
    /// suspension: no polling, no early wake even if the agent heals the
    /// tracked file in the first minute.
    pub fn await_window(&self, window: Duration) {
        tracing::info!(secs = window.as_secs(), "waiting out the verification window");
        thread::sleep(window);
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Point termination at the log's new home after quarantine.
    pub fn repoint_log(&mut self, log_path: PathBuf) {
        self.log_path = log_path;
    }

    /// Kill whichever agent process the log tail names. Best effort: a
    /// missing log, a marker-less tail, or an already-dead pid degrade to
    /// warnings. The attempt happens once; later calls (including the drop
    /// backstop) return `false` without acting.
    pub fn terminate(&mut self) -> bool {
        if self.terminated {
            return false;
        }
        self.terminated = true;
        match self.derive_pid() {
            Ok(pid) => {
                tracing::info!(pid, launch_pid = ?self.launch_pid, "terminating updater agent");
                if let Err(err) = kill_process(pid) {
                    tracing::warn!(pid, "agent termination failed: {err:#}");
                }
            }
            Err(err) => {
                tracing::warn!("agent pid unavailable, skipping termination: {err:#}");
            }
        }
        true
    }

    fn derive_pid(&self) -> Result<i32> {
        let record = LogTailRecord::read(&self.log_path)?;
        record.pid().ok_or_else(|| {
            anyhow!(
                "no pid marker in tail {:?} of {}",
                record.line,
                self.log_path.display()
            )
        })
    }
}

impl Drop for AgentSupervisor {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(unix)]
fn kill_process(pid: i32) -> Result<()> {
    // SAFETY: kill only takes a pid and a signal number; no memory is touched.
    let rc = unsafe { libc::kill(pid, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error()).context("kill updater agent")
    }
}

#[cfg(not(unix))]
fn kill_process(pid: i32) -> Result<()> {
    Err(anyhow!(
        "process termination by pid is only supported on unix (pid {pid})"
    ))
}
