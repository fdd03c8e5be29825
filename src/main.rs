#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![warn(clippy::perf)]
#![warn(clippy::complexity)]
#![warn(clippy::style)]
#![allow(clippy::multiple_crate_versions)]

use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::Parser;
use m3u_validator::{
    Args, Config, Validator,
    ffprobe::{self, FfprobeProbe, ProbeCommand},
    reachability::HttpQuickCheck,
    run_log::RunLogger,
    util::{spawn_ct_watcher, spawn_deadline, warn_ulimit},
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let config = Config::from(Args::parse());
    let log = Arc::new(RunLogger::open(&config.log_file));

    let (validator, ct) = match prepare(config, Arc::clone(&log)).await {
        Ok(prepared) => prepared,
        Err(e) => {
            log.log(format!("Error: {e:#}"));
            return ExitCode::FAILURE;
        }
    };

    match validator.run(ct).await {
        Ok(report) if report.interrupted => {
            log.log("Script interrupted");
            ExitCode::FAILURE
        }
        Ok(report) => {
            info!(
                "{} of {} entries kept",
                report.stats.total_accepted, report.stats.total_entries
            );
            log.log("Script finished");
            ExitCode::SUCCESS
        }
        // The validator already put the error on the run log
        Err(_) => ExitCode::FAILURE,
    }
}

/// Builds the probes and the cancellation token for a run
async fn prepare(config: Config, log: Arc<RunLogger>) -> Result<(Validator, CancellationToken)> {
    warn_ulimit(config.parallelism);

    let command = ProbeCommand::parse(&config.probe_command)?;
    if config.check_probe_installed && !ffprobe::is_installed(&command.program).await {
        bail!("`{}` is not installed or available in PATH!", command.program);
    }

    let quick_check = HttpQuickCheck::new(config.quick_check_timeout)
        .context("Setting up the quick URL check")?;
    let media_probe = FfprobeProbe::new(command, config.probe_timeout);

    let ct = CancellationToken::new();
    spawn_ct_watcher(ct.clone());
    if let Some(after) = config.run_timeout {
        spawn_deadline(ct.clone(), after);
    }

    let validator = Validator::new(config, Arc::new(quick_check), Arc::new(media_probe), log);
    Ok((validator, ct))
}
