use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{
    InspectError, Phase, ProcessInspector, ProgressDisplay, Target, UNDEPLOYED_SUCCESSFULLY_EVENT,
};
use crate::cache::DeploymentEventCache;
use crate::events::Event;
use crate::platform::{PlatformClient, RestError};
use crate::waiter::Predicate;

/// Done once the target is gone from the platform and, unless told
/// otherwise, its cloud resources were released.
pub struct UninstallInspector {
    base: ProcessInspector,
    phase: Phase,
    wait_for_resources_release: bool,
}

impl UninstallInspector {
    /// `current` holds the running counts at the time the undeploy started.
    pub fn new(
        cache: Arc<DeploymentEventCache>,
        platform: Arc<dyn PlatformClient>,
        display: Arc<dyn ProgressDisplay>,
        undeployment_id: &str,
        target: Target,
        planned: BTreeMap<String, u32>,
        current: BTreeMap<String, u32>,
    ) -> Self {
        Self {
            base: ProcessInspector::new(
                cache,
                platform,
                display,
                undeployment_id,
                target,
                planned,
                current,
            ),
            phase: Phase::Polling,
            wait_for_resources_release: true,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.base.verbose = verbose;
        self
    }

    pub fn wait_for_resources_release(mut self, wait: bool) -> Self {
        self.wait_for_resources_release = wait;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    async fn lifecycle_ended(&self) -> Result<bool, InspectError> {
        let described = match &self.base.target {
            Target::Application { name } => self
                .base
                .platform
                .application_description(name)
                .await
                .map(|_| ()),
            Target::Service { application, name } => self
                .base
                .platform
                .service_description(application, name)
                .await
                .map(|_| ()),
        };

        match described {
            Ok(()) => Ok(false),
            Err(RestError::NotFound(_)) => Ok(true),
            Err(e) => Err(self.base.rest_error(e)),
        }
    }

    async fn poll_lifecycle(&mut self) -> Result<bool, InspectError> {
        let ended = self.lifecycle_ended().await?;
        let tail = self.base.latest_events().await?;
        let undeployed = contains_undeployed_marker(&tail.events);

        if !tail.events.is_empty() {
            self.base.display.print_events(&tail.events);
        } else if !ended {
            self.base.display.print_no_change();
        }

        self.base
            .report_counts(|running, current| running < current)
            .await?;

        if !ended {
            return Ok(false);
        }

        self.phase = Phase::LifecycleEnded;
        if !self.wait_for_resources_release {
            self.phase = Phase::Done;
            return Ok(true);
        }

        self.base.display.print_event("releasing cloud resources...");
        self.phase = if undeployed {
            Phase::Done
        } else {
            Phase::ReleasingResources
        };
        Ok(undeployed)
    }

    async fn poll_resources_release(&mut self) -> Result<bool, InspectError> {
        let tail = self.base.latest_events().await?;
        if contains_undeployed_marker(&tail.events) {
            self.phase = Phase::Done;
            return Ok(true);
        }
        self.base.display.print_no_change();
        Ok(false)
    }
}

fn contains_undeployed_marker(events: &[Event]) -> bool {
    events
        .iter()
        .any(|event| event.description.trim_end().ends_with(UNDEPLOYED_SUCCESSFULLY_EVENT))
}

#[async_trait]
impl Predicate for UninstallInspector {
    type Error = InspectError;

    async fn is_done(&mut self) -> Result<bool, InspectError> {
        match self.phase {
            Phase::Polling => self.poll_lifecycle().await,
            Phase::LifecycleEnded | Phase::ReleasingResources => {
                self.poll_resources_release().await
            }
            Phase::Done => Ok(true),
        }
    }
}
