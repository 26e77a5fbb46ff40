use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;

mod agent;
mod archive;
mod cli;
mod config;
mod fetch;
mod inject;
mod logtail;
mod metainfo;
mod notify;
mod run;
mod util;
mod verify;

use run::RunVerdict;

fn main() -> ExitCode {
    let args = cli::RootArgs::parse();
    init_tracing();
    match harness_main(&args) {
        Ok(verdict) => report(&verdict),
        Err(err) => {
            tracing::error!("harness error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn harness_main(args: &cli::RootArgs) -> Result<RunVerdict> {
    let config_path = config::resolve_config_path(args.config.as_deref())?;
    tracing::info!(config = %config_path.display(), "loading harness config");
    let config = config::load_config(&config_path)?;
    let notifier = notify::from_config(config.notify_command.as_deref())?;
    notifier.preflight().context("notifier preflight")?;
    run::Run::new(&config, notifier.as_ref())?.execute()
}

fn report(verdict: &RunVerdict) -> ExitCode {
    match verdict {
        RunVerdict::Pass => {
            tracing::info!("update verification passed");
            ExitCode::SUCCESS
        }
        RunVerdict::Fail(incident) => {
            tracing::error!(
                backup = %incident.backup_dir.display(),
                "update verification failed: {}",
                incident.reason
            );
            ExitCode::from(1)
        }
        RunVerdict::Aborted(reason) => {
            tracing::error!("run aborted before fault injection: {reason}");
            ExitCode::from(2)
        }
    }
}
