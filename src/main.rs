//! crowdgate - crowd worker gating CLI
//!
//! Schedule tutorial, screening and gold questions, and drive POMDP worker
//! models through external solvers.

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crowdgate::app::AppContext;
use crowdgate::cli::Cli;
use crowdgate::cli::output::{emit_error, error_code, exit_status};
use crowdgate::cli::{OutputMode, commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mode = cli.output_mode();
    if !cli.quiet {
        init_tracing(cli.verbose, mode);
    }

    let outcome = AppContext::from_cli(&cli).and_then(|ctx| commands::run(&ctx, &cli.command));
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(code = error_code(&err), "command failed");
            emit_error(mode, &err);
            ExitCode::from(exit_status(&err))
        }
    }
}

fn init_tracing(verbosity: u8, mode: OutputMode) {
    let level = match verbosity {
        0 => "warn,crowdgate=info",
        1 => "info,crowdgate=debug",
        2 => "debug,crowdgate=trace",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs always go to stderr so stdout carries only command output.
    match mode {
        OutputMode::Robot => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        OutputMode::Human => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
    }
}
