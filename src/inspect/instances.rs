use std::collections::BTreeMap;
use std::sync::Arc;

use super::Target;
use crate::platform::{PlatformClient, RestError};

/// Reads running instance counts of the services of one application.
pub struct InstanceCountTracker {
    platform: Arc<dyn PlatformClient>,
    application: String,
}

impl InstanceCountTracker {
    pub fn new(platform: Arc<dyn PlatformClient>, target: &Target) -> Self {
        Self {
            platform,
            application: target.application().to_string(),
        }
    }

    /// A service the platform does not know yet runs no instances.
    pub async fn running_instance_count(&self, service: &str) -> Result<u32, RestError> {
        match self
            .platform
            .service_description(&self.application, service)
            .await
        {
            Ok(description) => Ok(description.instance_count),
            Err(RestError::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub fn init_current_counts<'a>(
        services: impl IntoIterator<Item = &'a String>,
    ) -> BTreeMap<String, u32> {
        services
            .into_iter()
            .map(|service| (service.clone(), 0))
            .collect()
    }

    /// Live counts, used as the baseline when tearing down.
    pub async fn current_counts<'a>(
        &self,
        services: impl IntoIterator<Item = &'a String>,
    ) -> Result<BTreeMap<String, u32>, RestError> {
        let mut counts = BTreeMap::new();
        for service in services {
            counts.insert(service.clone(), self.running_instance_count(service).await?);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use crate::platform::DeploymentState;
    use crate::testing::FakePlatform;

    fn tracker(platform: &Arc<FakePlatform>) -> InstanceCountTracker {
        InstanceCountTracker::new(platform.clone(), &Target::for_application("shop"))
    }

    #[tokio::test]
    async fn test_missing_service_counts_zero() {
        let platform = Arc::new(FakePlatform::new());
        let count = tracker(&platform)
            .running_instance_count("web")
            .await
            .expect("Expected a count");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_running_instance_count() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_service("shop", "web", DeploymentState::Installing, 2);
        let count = tracker(&platform)
            .running_instance_count("web")
            .await
            .expect("Expected a count");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let platform = Arc::new(FakePlatform::new());
        platform.fail_with(503, "Service unavailable");
        let error = tracker(&platform)
            .running_instance_count("web")
            .await
            .expect_err("Expected a failure");
        assert_eq!(error.kind(), FailureKind::Transport);
    }

    #[tokio::test]
    async fn test_current_counts() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_service("shop", "web", DeploymentState::Started, 3);
        let services = vec!["db".to_string(), "web".to_string()];

        let counts = tracker(&platform)
            .current_counts(&services)
            .await
            .expect("Expected counts");
        assert_eq!(counts.get("web"), Some(&3));
        assert_eq!(counts.get("db"), Some(&0));

        let seeded = InstanceCountTracker::init_current_counts(&services);
        assert_eq!(seeded.values().sum::<u32>(), 0);
        assert_eq!(seeded.len(), 2);
    }
}
