//! Boundary to the service that knows which worker processes exist, which
//! containers host them, and what those containers logged.
//!
//! The events cache only talks to the [`Directory`] trait. [`DockerDirectory`]
//! is the implementation used by the binary.

mod docker;

pub use docker::DockerDirectory;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::errors::FailureKind;

/// Context properties every worker process may carry.
pub mod properties {
    /// Identifier of the deployment that created the process.
    pub const DEPLOYMENT_ID: &str = "deployment-id";
    /// Identifier of the undeployment tearing the process down, if any.
    pub const UNDEPLOYMENT_ID: &str = "undeployment-id";
    /// Name of the application the process belongs to.
    pub const APPLICATION: &str = "application";
    /// Unix timestamp (seconds) at which the undeployment started.
    pub const UNDEPLOY_STARTED_AT: &str = "undeploy-started-at";
}

/// Application name of the platform's own management processes.
pub const MANAGEMENT_APPLICATION: &str = "management";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessHandle {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerHandle {
    pub id: String,
    pub host_name: String,
    pub host_address: String,
}

/// One line of container output as returned by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub text: String,
    /// False for arbitrary output that is not a log record.
    pub is_log_record: bool,
    pub host_name: String,
    pub host_address: String,
}

/// Selects the entries of one event producing logger for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogMatcher {
    pub logger: String,
    pub operation_id: String,
    pub undeploy: bool,
    /// Ignore everything logged before this unix timestamp (seconds).
    pub since: Option<i64>,
}

/// Opaque read position inside one container's log for one matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCursor(pub i64);

/// Entries read from a container plus the position to continue from.
#[derive(Debug, Clone, Default)]
pub struct LogBatch {
    pub entries: Vec<LogEntry>,
    /// Position after this batch. `None` while nothing was ever read.
    pub cursor: Option<LogCursor>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
    #[error("Service {process} does not have a {property} context property")]
    MissingProperty {
        process: String,
        property: &'static str,
    },
}

impl DirectoryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::DockerApi(_) | Self::Unavailable(_) => FailureKind::Transport,
            Self::MissingProperty { .. } => FailureKind::Fatal,
        }
    }
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn list_worker_processes(&self) -> Result<BTreeSet<ProcessHandle>, DirectoryError>;

    async fn process_context_property(
        &self,
        process: &ProcessHandle,
        key: &str,
    ) -> Result<Option<String>, DirectoryError>;

    async fn containers_for_process(
        &self,
        process: &ProcessHandle,
    ) -> Result<BTreeSet<ContainerHandle>, DirectoryError>;

    /// Entries matching `matcher` logged after `cursor`.
    ///
    /// Without a cursor the whole matching log content is returned.
    async fn fetch_log_entries(
        &self,
        container: &ContainerHandle,
        matcher: &LogMatcher,
        cursor: Option<LogCursor>,
    ) -> Result<LogBatch, DirectoryError>;

    async fn undeploy_in_progress(&self, process: &ProcessHandle) -> Result<bool, DirectoryError>;
}
