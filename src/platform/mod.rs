//! Boundary to the platform's REST management API.

mod rest;

pub use rest::RestClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    Installing,
    Started,
    Failed,
    Uninstalling,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDescription {
    pub state: DeploymentState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescription {
    #[serde(default)]
    pub name: String,
    pub state: DeploymentState,
    #[serde(default)]
    pub instance_count: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Status {
        status: u16,
        message: String,
        verbose: Option<String>,
    },
}

impl RestError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Http(_) | Self::Status { .. } => FailureKind::Transport,
        }
    }

    /// Extra detail the server attached to a failed response.
    pub fn verbose(&self) -> Option<&str> {
        match self {
            Self::Status { verbose, .. } => verbose.as_deref(),
            _ => None,
        }
    }
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn application_description(
        &self,
        application: &str,
    ) -> Result<ApplicationDescription, RestError>;

    async fn service_description(
        &self,
        application: &str,
        service: &str,
    ) -> Result<ServiceDescription, RestError>;
}
