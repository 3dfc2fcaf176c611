//! Decides when an install or uninstall has run its course.
//!
//! Both inspectors are [`Predicate`](crate::waiter::Predicate)s polled by the
//! bounded waiter. Each poll pulls the new tail of the operation's events
//! from the cache, prints it, and compares running instance counts against
//! the planned ones.

mod console;
mod install;
mod instances;
mod uninstall;

pub use console::{ConsoleDisplay, ProgressDisplay, PromptOnTimeout, prompt_yes_no};
pub use install::InstallInspector;
pub use instances::InstanceCountTracker;
pub use uninstall::UninstallInspector;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{CacheError, DeploymentEventCache};
use crate::errors::FailureKind;
use crate::events::Event;
use crate::platform::{PlatformClient, RestError};

/// Event the platform emits once every resource of an undeployment is gone.
pub const UNDEPLOYED_SUCCESSFULLY_EVENT: &str = "undeployed successfully";

/// What an operation is acting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Application { name: String },
    Service { application: String, name: String },
}

impl Target {
    pub fn for_application(name: &str) -> Self {
        Self::Application {
            name: name.to_string(),
        }
    }

    pub fn for_service(application: &str, name: &str) -> Self {
        Self::Service {
            application: application.to_string(),
            name: name.to_string(),
        }
    }

    pub fn application(&self) -> &str {
        match self {
            Self::Application { name } => name,
            Self::Service { application, .. } => application,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Application { name } | Self::Service { name, .. } => name,
        }
    }
}

/// Progress of an inspector. Timing out and failing are not phases: the
/// waiter reports them as `WaitError::Timeout` and `InspectError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Polling,
    LifecycleEnded,
    ReleasingResources,
    Done,
}

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("{message}")]
    Operation {
        message: String,
        /// Only filled in when running verbose.
        verbose: Option<String>,
        kind: FailureKind,
    },
    #[error("Deployment of {0} failed")]
    DeploymentFailed(String),
    #[error("An undeploy started while deployment {0} was still being installed")]
    Superseded(String),
}

impl InspectError {
    fn from_rest(e: RestError, verbose: bool) -> Self {
        let details = match e.verbose() {
            Some(details) => details.to_string(),
            None => format!("{e:?}"),
        };
        Self::Operation {
            kind: e.kind(),
            message: e.to_string(),
            verbose: verbose.then_some(details),
        }
    }

    fn from_cache(e: CacheError, verbose: bool) -> Self {
        Self::Operation {
            kind: e.kind(),
            message: e.to_string(),
            verbose: verbose.then(|| format!("{e:?}")),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Operation { kind, .. } => *kind,
            Self::DeploymentFailed(_) | Self::Superseded(_) => FailureKind::Fatal,
        }
    }

    pub fn verbose(&self) -> Option<&str> {
        match self {
            Self::Operation { verbose, .. } => verbose.as_deref(),
            _ => None,
        }
    }
}

/// New events since the previous poll.
struct EventsTail {
    events: Vec<Event>,
    superseded: bool,
}

/// State shared by the install and uninstall inspectors.
struct ProcessInspector {
    cache: Arc<DeploymentEventCache>,
    operation_id: String,
    target: Target,
    platform: Arc<dyn PlatformClient>,
    tracker: InstanceCountTracker,
    display: Arc<dyn ProgressDisplay>,
    planned: BTreeMap<String, u32>,
    current: BTreeMap<String, u32>,
    next_event_index: u64,
    verbose: bool,
}

impl ProcessInspector {
    fn new(
        cache: Arc<DeploymentEventCache>,
        platform: Arc<dyn PlatformClient>,
        display: Arc<dyn ProgressDisplay>,
        operation_id: &str,
        target: Target,
        planned: BTreeMap<String, u32>,
        current: BTreeMap<String, u32>,
    ) -> Self {
        Self {
            tracker: InstanceCountTracker::new(platform.clone(), &target),
            cache,
            operation_id: operation_id.to_string(),
            target,
            platform,
            display,
            planned,
            current,
            next_event_index: 0,
            verbose: false,
        }
    }

    async fn latest_events(&mut self) -> Result<EventsTail, InspectError> {
        let value = self
            .cache
            .get(&self.operation_id)
            .await
            .map_err(|e| InspectError::from_cache(e, self.verbose))?;

        let events = value
            .events_since(self.next_event_index)
            .into_iter()
            .cloned()
            .collect();
        self.next_event_index = value.last_event_index;

        Ok(EventsTail {
            events,
            superseded: value.superseded,
        })
    }

    async fn running_instance_count(&self, service: &str) -> Result<u32, InspectError> {
        self.tracker
            .running_instance_count(service)
            .await
            .map_err(|e| InspectError::from_rest(e, self.verbose))
    }

    fn rest_error(&self, e: RestError) -> InspectError {
        InspectError::from_rest(e, self.verbose)
    }

    /// Reports every service whose count moved in the direction that
    /// `improved` accepts and makes it the new baseline.
    async fn report_counts(&mut self, improved: fn(u32, u32) -> bool) -> Result<(), InspectError> {
        let services: Vec<(String, u32)> = self
            .planned
            .iter()
            .map(|(service, planned)| (service.clone(), *planned))
            .collect();

        for (service, planned) in services {
            let running = self.running_instance_count(&service).await?;
            let current = self.current.get(&service).copied().unwrap_or_default();
            if improved(running, current) {
                self.display.print_event(&format!(
                    "{service}: installed {running} of planned {planned}"
                ));
                self.current.insert(service, running);
            }
        }
        Ok(())
    }

    fn print_tail(&self, events: &[Event]) {
        if events.is_empty() {
            self.display.print_no_change();
        } else {
            self.display.print_events(events);
        }
    }
}
