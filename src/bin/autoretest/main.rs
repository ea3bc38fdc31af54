use std::process::ExitCode;

use anyhow::Context;
use autoretest::{GitHub, Outcome, RunConfig, parse_args, retest_until_green, setup_github_client};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// Conventional exit status for a process stopped by SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

fn handle_clap_help_version(clap_err: &clap::Error) -> ExitCode {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            ExitCode::SUCCESS
        }
        _ => {
            eprint!("{clap_err}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Cancels `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping");
            token.cancel();
        }
    });
}

async fn run(config: RunConfig) -> anyhow::Result<Outcome> {
    let client = setup_github_client(config.token.as_str(), &config.api_url)?;
    let gateway = GitHub::new(client);

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    retest_until_green(&gateway, &config.target, config.interval, &cancel)
        .await
        .with_context(|| format!("Failed to retest {}", config.target))
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match parse_args(std::env::args()) {
        Ok(config) => config,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                return handle_clap_help_version(clap_err);
            }
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.verbose);
    debug!(?config, "Resolved configuration");

    match run(config).await {
        Ok(Outcome::Cancelled) => ExitCode::from(EXIT_INTERRUPTED),
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
