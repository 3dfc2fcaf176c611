use std::{collections::BTreeMap, path::PathBuf, sync::OnceLock};

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Follow the progress of installs and uninstalls on the platform.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the config file.
    #[arg(short, long, global = true, default_value = "deploywatch.toml")]
    pub config: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wait for a deployment to finish installing.
    WatchInstall {
        /// Identifier of the deployment to follow.
        #[arg(long)]
        deployment_id: String,
        #[command(flatten)]
        watch: WatchArgs,
    },
    /// Wait for an undeployment to finish.
    WatchUninstall {
        /// Identifier of the undeployment to follow.
        #[arg(long)]
        undeployment_id: String,
        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
        /// Return as soon as the platform forgot about the target.
        #[arg(long)]
        no_wait_for_resources_release: bool,
        #[command(flatten)]
        watch: WatchArgs,
    },
    /// Serve the events query API.
    Serve {
        /// Listen address, overrides `bind` from the config file.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(ClapArgs, Debug)]
pub struct WatchArgs {
    /// Application the operation acts on.
    #[arg(short, long)]
    pub application: String,
    /// Watch a single service of the application.
    #[arg(short, long)]
    pub service: Option<String>,
    /// Planned instances per service, e.g. `--planned web=2`.
    #[arg(short, long = "planned", value_parser = parse_planned)]
    pub planned: Vec<(String, u32)>,
    /// Minutes to wait, overrides `timeout` from the config file.
    #[arg(short, long)]
    pub timeout: Option<u64>,
    /// Ask whether to keep waiting once the timeout expired.
    #[arg(long)]
    pub ask_on_timeout: bool,
    /// Keep server side details of failures.
    #[arg(short, long)]
    pub verbose: bool,
}

impl WatchArgs {
    pub fn planned_map(&self) -> BTreeMap<String, u32> {
        self.planned.iter().cloned().collect()
    }
}

fn parse_planned(value: &str) -> Result<(String, u32), String> {
    let (service, count) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected <service>=<count>, got {value}"))?;
    let service = service.trim();
    if service.is_empty() {
        return Err(format!("Missing service name in {value}"));
    }
    let count = count
        .trim()
        .parse()
        .map_err(|e| format!("Invalid instance count in {value}: {e}"))?;
    Ok((service.to_string(), count))
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}
