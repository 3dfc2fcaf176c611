use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{InspectError, InstanceCountTracker, Phase, ProcessInspector, ProgressDisplay, Target};
use crate::cache::DeploymentEventCache;
use crate::platform::{DeploymentState, PlatformClient, RestError};
use crate::waiter::Predicate;

/// Done once the target is started and every planned instance runs.
pub struct InstallInspector {
    base: ProcessInspector,
    phase: Phase,
}

impl InstallInspector {
    pub fn new(
        cache: Arc<DeploymentEventCache>,
        platform: Arc<dyn PlatformClient>,
        display: Arc<dyn ProgressDisplay>,
        deployment_id: &str,
        target: Target,
        planned: BTreeMap<String, u32>,
    ) -> Self {
        let current = InstanceCountTracker::init_current_counts(planned.keys());
        Self {
            base: ProcessInspector::new(
                cache,
                platform,
                display,
                deployment_id,
                target,
                planned,
                current,
            ),
            phase: Phase::Polling,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.base.verbose = verbose;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    async fn lifecycle_ended(&self) -> Result<bool, InspectError> {
        let state = match &self.base.target {
            Target::Application { name } => self
                .base
                .platform
                .application_description(name)
                .await
                .map(|description| description.state),
            Target::Service { application, name } => self
                .base
                .platform
                .service_description(application, name)
                .await
                .map(|description| description.state),
        };

        match state {
            Ok(DeploymentState::Started) => Ok(true),
            Ok(DeploymentState::Failed) => Err(InspectError::DeploymentFailed(
                self.base.target.name().to_string(),
            )),
            // Not registered yet.
            Ok(_) | Err(RestError::NotFound(_)) => Ok(false),
            Err(e) => Err(self.base.rest_error(e)),
        }
    }

    fn all_planned_running(&self) -> bool {
        self.base.planned.iter().all(|(service, planned)| {
            self.base.current.get(service).copied().unwrap_or_default() >= *planned
        })
    }
}

#[async_trait]
impl Predicate for InstallInspector {
    type Error = InspectError;

    async fn is_done(&mut self) -> Result<bool, InspectError> {
        if self.phase == Phase::Done {
            return Ok(true);
        }

        let ended = self.lifecycle_ended().await?;
        let tail = self.base.latest_events().await?;
        self.base.print_tail(&tail.events);
        if tail.superseded {
            return Err(InspectError::Superseded(self.base.operation_id.clone()));
        }

        self.base
            .report_counts(|running, current| running > current)
            .await?;

        if ended {
            self.phase = Phase::LifecycleEnded;
            if self.all_planned_running() {
                self.phase = Phase::Done;
                return Ok(true);
            }
        }
        Ok(false)
    }
}
