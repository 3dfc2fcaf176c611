use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::api;
use crate::cache::DeploymentEventCache;
use crate::cli::WatchArgs;
use crate::config_file::{ConfigError, DeploywatchConfig};
use crate::directory::{DirectoryError, DockerDirectory};
use crate::errors::FailureKind;
use crate::inspect::{
    ConsoleDisplay, InspectError, InstallInspector, InstanceCountTracker, ProgressDisplay,
    PromptOnTimeout, Target, UninstallInspector, prompt_yes_no,
};
use crate::platform::{PlatformClient, RestClient, RestError};
use crate::waiter::{BoundedWaiter, CancelSignal, Predicate, WaitError};

const INSTALL_TIMEOUT_MESSAGE: &str =
    "Application installation timed out. Configure the timeout using the --timeout flag.";
const UNINSTALL_TIMEOUT_MESSAGE: &str =
    "Application uninstallation timed out. Configure the timeout using the --timeout flag.";

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Rest(#[from] RestError),
    #[error(transparent)]
    Inspect(#[from] InspectError),
    #[error("{0}")]
    TimedOut(&'static str),
    #[error("Cancelled")]
    Cancelled,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    /// Server side details worth showing along with the message.
    pub fn verbose(&self) -> Option<&str> {
        match self {
            Self::Inspect(e) => e.verbose(),
            Self::Rest(e) => e.verbose(),
            _ => None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Directory(e) => e.kind(),
            Self::Rest(e) => e.kind(),
            Self::Inspect(e) => e.kind(),
            Self::TimedOut(_) | Self::Cancelled | Self::Io(_) => FailureKind::Transport,
            Self::Config(_) => FailureKind::Fatal,
        }
    }
}

/// Everything a watch needs from the outside world.
pub struct Backends {
    pub cache: Arc<DeploymentEventCache>,
    pub platform: Arc<dyn PlatformClient>,
    pub display: Arc<dyn ProgressDisplay>,
}

impl Backends {
    pub fn connect(config: &DeploywatchConfig) -> Result<Self, CommandError> {
        let directory = Arc::new(DockerDirectory::connect(&config.label_prefix)?);
        Ok(Self {
            cache: Arc::new(DeploymentEventCache::new(
                directory,
                &config.event_logger,
                config.refresh_after(),
            )),
            platform: Arc::new(RestClient::new(&config.rest_url)?),
            display: Arc::new(ConsoleDisplay),
        })
    }
}

fn target(watch: &WatchArgs) -> Target {
    match &watch.service {
        Some(service) => Target::for_service(&watch.application, service),
        None => Target::for_application(&watch.application),
    }
}

fn timeout(config: &DeploywatchConfig, watch: &WatchArgs) -> Duration {
    watch
        .timeout
        .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
        .unwrap_or_else(|| config.timeout())
}

async fn wait<P>(
    config: &DeploywatchConfig,
    watch: &WatchArgs,
    cancel: CancelSignal,
    predicate: &mut P,
    timeout_message: &'static str,
) -> Result<(), CommandError>
where
    P: Predicate<Error = InspectError>,
{
    let mut waiter = BoundedWaiter::new(config.poll_interval(), cancel);
    if watch.ask_on_timeout {
        waiter = waiter.ask_on_timeout(Box::new(PromptOnTimeout));
    }

    match waiter.wait_for(predicate, timeout(config, watch)).await {
        Ok(()) => Ok(()),
        Err(WaitError::Timeout(waited)) => {
            log::warn!("Gave up after {waited:?}");
            Err(CommandError::TimedOut(timeout_message))
        }
        Err(WaitError::Cancelled) => Err(CommandError::Cancelled),
        Err(WaitError::Predicate(e)) => Err(e.into()),
    }
}

pub async fn watch_install(
    config: &DeploywatchConfig,
    backends: Backends,
    deployment_id: &str,
    watch: &WatchArgs,
    cancel: CancelSignal,
) -> Result<(), CommandError> {
    let mut inspector = InstallInspector::new(
        backends.cache,
        backends.platform,
        backends.display.clone(),
        deployment_id,
        target(watch),
        watch.planned_map(),
    )
    .verbose(watch.verbose);

    wait(config, watch, cancel, &mut inspector, INSTALL_TIMEOUT_MESSAGE).await?;
    backends
        .display
        .print_event(&format!("{} installed successfully", target(watch).name()));
    Ok(())
}

pub async fn watch_uninstall(
    config: &DeploywatchConfig,
    backends: Backends,
    undeployment_id: &str,
    watch: &WatchArgs,
    wait_for_resources_release: bool,
    cancel: CancelSignal,
) -> Result<(), CommandError> {
    let target = target(watch);
    let planned = watch.planned_map();
    let current = InstanceCountTracker::new(backends.platform.clone(), &target)
        .current_counts(planned.keys())
        .await?;

    let mut inspector = UninstallInspector::new(
        backends.cache,
        backends.platform,
        backends.display.clone(),
        undeployment_id,
        target.clone(),
        planned,
        current,
    )
    .verbose(watch.verbose)
    .wait_for_resources_release(wait_for_resources_release);

    wait(config, watch, cancel, &mut inspector, UNINSTALL_TIMEOUT_MESSAGE).await?;
    backends
        .display
        .print_event(&format!("{} uninstalled successfully", target.name()));
    Ok(())
}

/// Asks before following an uninstall. Returns false when declined.
pub fn confirm_uninstall(watch: &WatchArgs) -> Result<bool, CommandError> {
    let answer = match &watch.service {
        Some(service) => prompt_yes_no("service_uninstall_confirmation", &[service.as_str()]),
        None => prompt_yes_no(
            "application_uninstall_confirmation",
            &[watch.application.as_str()],
        ),
    }?;
    Ok(answer)
}

pub async fn serve(
    config: &DeploywatchConfig,
    bind: Option<&str>,
    mut cancel: CancelSignal,
) -> Result<(), CommandError> {
    let addr: SocketAddr = match bind {
        Some(bind) => bind
            .parse()
            .map_err(|e| ConfigError::Bind(bind.to_string(), e))?,
        None => config.bind_addr()?,
    };
    let backends = Backends::connect(config)?;

    tokio::select! {
        result = api::serve(backends.cache, addr) => result?,
        _ = cancel.cancelled() => log::info!("Stopping events API"),
    }
    Ok(())
}
