//! Docker backed directory using bollard.
//!
//! Worker processes are groups of containers sharing the
//! `<prefix>.process` label. The remaining `<prefix>.*` labels of a group are
//! its context properties, e.g. `<prefix>.deployment-id`.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::ContainerSummary;
use bollard::query_parameters::{ListContainersOptions, LogsOptions};
use chrono::DateTime;
use futures_util::StreamExt;

use super::{
    ContainerHandle, Directory, DirectoryError, LogBatch, LogCursor, LogEntry, LogMatcher,
    ProcessHandle, properties,
};

const PROCESS_LABEL: &str = "process";
const NANOS_PER_SECOND: i64 = 1_000_000_000;

type Properties = HashMap<String, String>;

pub struct DockerDirectory {
    docker: Docker,
    label_prefix: String,
    /// Context properties per process as of the last listing.
    properties: Mutex<HashMap<String, Properties>>,
}

impl DockerDirectory {
    pub fn connect(label_prefix: &str) -> Result<Self, DirectoryError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self {
            docker,
            label_prefix: label_prefix.trim_end_matches('.').to_string(),
            properties: Mutex::new(HashMap::new()),
        })
    }

    fn label(&self, name: &str) -> String {
        format!("{}.{}", self.label_prefix, name)
    }

    async fn list_labelled(&self, filter: String) -> Result<Vec<ContainerSummary>, DirectoryError> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert("label".to_string(), vec![filter]);

        let options = ListContainersOptions {
            all: true,
            filters: Some(filters),
            ..Default::default()
        };

        Ok(self.docker.list_containers(Some(options)).await?)
    }

    async fn process_containers(
        &self,
        process: &ProcessHandle,
    ) -> Result<Vec<ContainerSummary>, DirectoryError> {
        self.list_labelled(format!("{}={}", self.label(PROCESS_LABEL), process.name))
            .await
    }
}

/// Group container labels into per process context properties.
///
/// When containers of one process disagree on a label the first one wins.
fn group_processes(label_prefix: &str, containers: &[ContainerSummary]) -> HashMap<String, Properties> {
    let process_label = format!("{label_prefix}.{PROCESS_LABEL}");
    let property_prefix = format!("{label_prefix}.");
    let mut processes: HashMap<String, Properties> = HashMap::new();

    for container in containers {
        let Some(labels) = container.labels.as_ref() else {
            continue;
        };
        let Some(process) = labels.get(&process_label) else {
            continue;
        };
        let properties = processes.entry(process.clone()).or_default();
        for (key, value) in labels {
            if let Some(property) = key.strip_prefix(&property_prefix) {
                if property != PROCESS_LABEL {
                    properties
                        .entry(property.to_string())
                        .or_insert_with(|| value.clone());
                }
            }
        }
    }

    processes
}

fn container_handle(container: &ContainerSummary) -> Option<ContainerHandle> {
    let id = container.id.clone()?;
    let host_name = container
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.chars().take(12).collect());
    let host_address = container
        .network_settings
        .as_ref()
        .and_then(|settings| settings.networks.as_ref())
        .and_then(|networks| {
            networks
                .values()
                .filter_map(|endpoint| endpoint.ip_address.clone())
                .find(|ip| !ip.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string());

    Some(ContainerHandle {
        id,
        host_name,
        host_address,
    })
}

/// Split a `timestamps=true` docker log line into its unix nanos and text.
fn split_timestamp(line: &str) -> Option<(i64, &str)> {
    let (timestamp, text) = line.split_once(' ')?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp)
        .ok()?
        .timestamp_nanos_opt()?;
    Some((timestamp, text))
}

#[async_trait]
impl Directory for DockerDirectory {
    async fn list_worker_processes(&self) -> Result<BTreeSet<ProcessHandle>, DirectoryError> {
        let containers = self.list_labelled(self.label(PROCESS_LABEL)).await?;
        let grouped = group_processes(&self.label_prefix, &containers);
        log::debug!("Found {} worker processes", grouped.len());

        let handles = grouped
            .keys()
            .map(|name| ProcessHandle { name: name.clone() })
            .collect();
        *self
            .properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = grouped;
        Ok(handles)
    }

    async fn process_context_property(
        &self,
        process: &ProcessHandle,
        key: &str,
    ) -> Result<Option<String>, DirectoryError> {
        let known = self
            .properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&process.name);
        if !known {
            self.list_worker_processes().await?;
        }

        Ok(self
            .properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&process.name)
            .and_then(|properties| properties.get(key))
            .cloned())
    }

    async fn containers_for_process(
        &self,
        process: &ProcessHandle,
    ) -> Result<BTreeSet<ContainerHandle>, DirectoryError> {
        Ok(self
            .process_containers(process)
            .await?
            .iter()
            .filter_map(container_handle)
            .collect())
    }

    async fn fetch_log_entries(
        &self,
        container: &ContainerHandle,
        matcher: &LogMatcher,
        cursor: Option<LogCursor>,
    ) -> Result<LogBatch, DirectoryError> {
        let since = cursor
            .map(|LogCursor(position)| position / NANOS_PER_SECOND)
            .or(matcher.since)
            .unwrap_or(0);

        let options = LogsOptions {
            stdout: true,
            stderr: true,
            timestamps: true,
            since: i32::try_from(since).unwrap_or(i32::MAX),
            tail: "all".to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(&container.id, Some(options));
        let mut batch = LogBatch {
            entries: Vec::new(),
            cursor,
        };

        while let Some(chunk) = stream.next().await {
            let output = match chunk {
                Ok(output) => output,
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                }) => {
                    log::debug!(
                        "Container {} no longer exists, no new log entries",
                        container.host_name
                    );
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            let text = String::from_utf8_lossy(&output.into_bytes()).to_string();
            for line in text.lines() {
                let Some((timestamp, line)) = split_timestamp(line) else {
                    continue;
                };
                if cursor.is_some_and(|LogCursor(position)| timestamp <= position) {
                    continue;
                }
                if batch
                    .cursor
                    .is_none_or(|LogCursor(position)| timestamp > position)
                {
                    batch.cursor = Some(LogCursor(timestamp));
                }
                if !line.contains(&matcher.logger) {
                    continue;
                }
                batch.entries.push(LogEntry {
                    text: line.to_string(),
                    is_log_record: line.contains(" - "),
                    host_name: container.host_name.clone(),
                    host_address: container.host_address.clone(),
                });
            }
        }

        log::debug!(
            "Read {} matching entries from {} for {} {}",
            batch.entries.len(),
            container.host_name,
            if matcher.undeploy { "undeployment" } else { "deployment" },
            matcher.operation_id
        );
        Ok(batch)
    }

    async fn undeploy_in_progress(&self, process: &ProcessHandle) -> Result<bool, DirectoryError> {
        let undeployment_label = self.label(properties::UNDEPLOYMENT_ID);
        Ok(self.process_containers(process).await?.iter().any(|container| {
            container
                .labels
                .as_ref()
                .is_some_and(|labels| labels.contains_key(&undeployment_label))
        }))
    }
}
