use std::process::ExitCode;

use cli::Command;
use commands::{Backends, CommandError};
use config_file::DeploywatchConfig;
use waiter::CancelSignal;

mod api;
mod cache;
mod cli;
mod commands;
mod config_file;
mod directory;
mod errors;
mod events;
mod inspect;
mod platform;
mod signals;
#[cfg(test)]
mod testing;
mod waiter;

async fn run(config: &DeploywatchConfig, cancel: CancelSignal) -> Result<(), CommandError> {
    match &cli::get_cli_args().command {
        Command::WatchInstall {
            deployment_id,
            watch,
        } => {
            let backends = Backends::connect(config)?;
            commands::watch_install(config, backends, deployment_id, watch, cancel).await
        }
        Command::WatchUninstall {
            undeployment_id,
            yes,
            no_wait_for_resources_release,
            watch,
        } => {
            if !yes && !commands::confirm_uninstall(watch)? {
                println!("Not watching the uninstall");
                return Ok(());
            }
            let backends = Backends::connect(config)?;
            let wait_for_resources_release =
                config.wait_for_resources_release && !no_wait_for_resources_release;
            commands::watch_uninstall(
                config,
                backends,
                undeployment_id,
                watch,
                wait_for_resources_release,
                cancel,
            )
            .await
        }
        Command::Serve { bind } => commands::serve(config, bind.as_deref(), cancel).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize the logger
    env_logger::init();

    let args = cli::get_cli_args();
    let config = match DeploywatchConfig::try_init(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Unable to read config {}: {err}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    let (cancel_tx, cancel) = CancelSignal::new();
    if let Err(err) = signals::handle_sigint(cancel_tx) {
        log::warn!("Unable to install the SIGINT handler: {err}");
    }

    match run(&config, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!();
            eprintln!("{err}");
            if let Some(details) = err.verbose() {
                eprintln!("{details}");
            }
            log::debug!("Command failed with {} error", err.kind().as_ref());
            ExitCode::FAILURE
        }
    }
}
