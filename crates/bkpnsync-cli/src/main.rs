//! bkpnsync: scheduled volume backups to an rclone remote.
//!
//! - `bkpnsync run` (default): scheduler + health server; each cycle runs as
//!   a `bkpnsync cycle` child process
//! - `bkpnsync cycle`: one backup cycle in this process

use std::process::ExitCode;
use std::sync::Arc;

use bkpnsync_core::Settings;
use bkpnsync_core::app::{AppBuilder, SchedulerExit, ShutdownController, SignalAction, health};
use bkpnsync_core::impls::SubprocessCycleRunner;
use bkpnsync_core::observability::{LogSettings, init_tracing};
use clap::{Parser, Subcommand};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Exit status after a forced shutdown (second signal).
const FORCED_EXIT: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "bkpnsync", version, about = "Scheduled volume backups to an rclone remote")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the scheduler and the health server (default)
    Run,
    /// Run a single backup cycle in this process
    Cycle,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(&LogSettings::from_env()) {
        eprintln!("failed to initialise logging: {e}");
    }

    let settings = match Settings::from_env().and_then(|s| {
        s.check_remote_config()?;
        Ok(s)
    }) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(
        host = %settings.host_id,
        max_backups = settings.max_backups,
        source_base = %settings.source_base.display(),
        remote = %format!("{}:{}", settings.rclone_target, settings.remote_root()),
        "configuration loaded"
    );

    let app = AppBuilder::new(settings);
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(app).await,
        Command::Cycle => cycle(app).await,
    }
}

async fn run(app: AppBuilder) -> ExitCode {
    let shutdown = ShutdownController::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    // stays up through a deferred shutdown; stopped once the scheduler returns
    let server_stop = CancellationToken::new();
    let server = app.settings().health_enabled.then(|| {
        let addr = app.settings().health_addr();
        let state = app.health_state();
        let stop = server_stop.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(addr, state, stop).await {
                error!(%addr, error = %e, "health server stopped");
            }
        })
    });

    let runner = match SubprocessCycleRunner::current_exe(app.executor().clone()) {
        Ok(runner) => runner,
        Err(e) => {
            error!(error = %e, "cannot locate own executable");
            return ExitCode::FAILURE;
        }
    };
    let exit = app
        .build_scheduler(Arc::new(runner), shutdown.clone())
        .run()
        .await;

    server_stop.cancel();
    if let Some(server) = server
        && let Err(e) = server.await
    {
        warn!(error = %e, "health server task failed");
    }

    match exit {
        Ok(SchedulerExit::Shutdown) => {
            info!("shut down");
            ExitCode::SUCCESS
        }
        Ok(SchedulerExit::Completed { cycle_ok: true }) => ExitCode::SUCCESS,
        Ok(SchedulerExit::Completed { cycle_ok: false }) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "scheduler stopped");
            ExitCode::FAILURE
        }
    }
}

async fn cycle(app: AppBuilder) -> ExitCode {
    // the parent scheduler owns shutdown; a cycle always runs to the end
    tokio::spawn(async {
        loop {
            wait_for_signal().await;
            warn!("termination signal ignored, finishing backup cycle");
        }
    });

    match app.build_cycle().run().await {
        Ok(summary) if summary.failed() > 0 => {
            warn!(failed = summary.failed(), "backup cycle finished with failures");
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "backup cycle aborted");
            ExitCode::FAILURE
        }
    }
}

async fn wait_for_signal() {
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM, only SIGINT is handled");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

async fn watch_signals(shutdown: ShutdownController) {
    loop {
        wait_for_signal().await;
        match shutdown.request() {
            SignalAction::ExitNow => info!("shutdown requested"),
            SignalAction::Deferred => {
                info!("shutdown requested, waiting for the running backup cycle to finish")
            }
            SignalAction::Force => {
                warn!("second shutdown request, exiting immediately");
                std::process::exit(FORCED_EXIT);
            }
        }
    }
}
