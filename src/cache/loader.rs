use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::time::Instant;

use super::CacheError;
use super::value::{CacheValue, OperationKind};
use crate::directory::{
    ContainerHandle, Directory, DirectoryError, LogBatch, LogCursor, LogMatcher,
    MANAGEMENT_APPLICATION, ProcessHandle, properties,
};
use crate::events::{EventWindow, translate};

/// Reads container logs and turns them into cache values.
pub struct EventsLoader {
    directory: Arc<dyn Directory>,
    event_logger: String,
}

impl EventsLoader {
    pub fn new(directory: Arc<dyn Directory>, event_logger: impl Into<String>) -> Self {
        Self {
            directory,
            event_logger: event_logger.into(),
        }
    }

    /// Initial population. Every matching log line of every container is read.
    pub async fn load(&self, key: &str) -> Result<CacheValue, CacheError> {
        log::debug!("Could not find events for {key} in cache. Loading from container logs...");

        let (operation, processes) = self.processes_for_operation(key).await?;
        let matcher = self.matcher(key, operation, &processes).await?;

        let mut containers = BTreeSet::new();
        for process in &processes {
            containers.extend(self.directory.containers_for_process(process).await?);
        }

        let mut events = EventWindow::new();
        let mut cursors = BTreeMap::new();
        let mut index = 0;
        for container in &containers {
            let batch = self
                .directory
                .fetch_log_entries(container, &matcher, None)
                .await?;
            index = append_batch(&mut events, &mut cursors, container, index, batch);
        }

        if events.is_empty() {
            log::debug!("No events logged yet for {key}");
        } else {
            log::info!(
                "Loaded {} events for {key} from {} containers",
                events.len(),
                containers.len()
            );
        }

        Ok(CacheValue {
            events,
            last_event_index: index,
            last_refreshed_at: Instant::now(),
            owner_containers: containers,
            processes,
            operation,
            superseded: false,
            matcher,
            cursors,
        })
    }

    /// Incremental refresh of `old`.
    ///
    /// Returns `None` when the value has to stay as it is.
    pub async fn reload(&self, key: &str, old: &CacheValue) -> Result<Option<CacheValue>, CacheError> {
        log::debug!("Reloading events cache entry for {key}");

        if old.superseded {
            return Ok(None);
        }

        if old.operation == OperationKind::Deploy {
            for process in &old.processes {
                // One undeploying process means the whole application is undeploying.
                if self.directory.undeploy_in_progress(process).await? {
                    log::info!(
                        "Undeploy of {} started while tracking deployment {key}",
                        process.name
                    );
                    let mut next = old.clone();
                    next.superseded = true;
                    return Ok(Some(next));
                }
            }
        }

        // Old containers are kept so their final entries are not lost.
        let mut containers = old.owner_containers.clone();
        for process in &old.processes {
            containers.extend(self.directory.containers_for_process(process).await?);
        }
        if containers.is_empty() {
            return Ok(None);
        }

        let mut next = old.clone();
        for container in &containers {
            let cursor = next.cursors.get(&container.id).copied();
            let batch = self
                .directory
                .fetch_log_entries(container, &next.matcher, cursor)
                .await?;
            next.last_event_index = append_batch(
                &mut next.events,
                &mut next.cursors,
                container,
                next.last_event_index,
                batch,
            );
        }

        if next.last_event_index > old.last_event_index {
            log::debug!(
                "Appended {} events for {key}",
                next.last_event_index - old.last_event_index
            );
        }
        next.owner_containers = containers;
        next.last_refreshed_at = Instant::now();
        Ok(Some(next))
    }

    async fn processes_for_operation(
        &self,
        key: &str,
    ) -> Result<(OperationKind, BTreeSet<ProcessHandle>), CacheError> {
        let mut deploying = BTreeSet::new();
        let mut undeploying = BTreeSet::new();

        for process in self.directory.list_worker_processes().await? {
            let application = self
                .directory
                .process_context_property(&process, properties::APPLICATION)
                .await?;
            if application.as_deref() == Some(MANAGEMENT_APPLICATION) {
                continue;
            }

            let deployment_id = self
                .directory
                .process_context_property(&process, properties::DEPLOYMENT_ID)
                .await?
                .ok_or_else(|| DirectoryError::MissingProperty {
                    process: process.name.clone(),
                    property: properties::DEPLOYMENT_ID,
                })?;
            if deployment_id == key {
                deploying.insert(process);
                continue;
            }

            let undeployment_id = self
                .directory
                .process_context_property(&process, properties::UNDEPLOYMENT_ID)
                .await?;
            if undeployment_id.as_deref() == Some(key) {
                undeploying.insert(process);
            }
        }

        if !deploying.is_empty() {
            Ok((OperationKind::Deploy, deploying))
        } else if !undeploying.is_empty() {
            Ok((OperationKind::Undeploy, undeploying))
        } else {
            Err(CacheError::NotFound(key.to_string()))
        }
    }

    async fn matcher(
        &self,
        key: &str,
        operation: OperationKind,
        processes: &BTreeSet<ProcessHandle>,
    ) -> Result<LogMatcher, CacheError> {
        let undeploy = operation == OperationKind::Undeploy;
        let mut since = None;
        if undeploy {
            for process in processes {
                let started_at = self
                    .directory
                    .process_context_property(process, properties::UNDEPLOY_STARTED_AT)
                    .await?
                    .and_then(|value| value.parse::<i64>().ok());
                since = match (since, started_at) {
                    (Some(current), Some(started_at)) => Some(std::cmp::min(current, started_at)),
                    (current, started_at) => current.or(started_at),
                };
            }
        }

        Ok(LogMatcher {
            logger: self.event_logger.clone(),
            operation_id: key.to_string(),
            undeploy,
            since,
        })
    }
}

/// Translate the log records of `batch` into events starting at `index`.
///
/// Returns the next free index.
fn append_batch(
    events: &mut EventWindow,
    cursors: &mut BTreeMap<String, LogCursor>,
    container: &ContainerHandle,
    mut index: u64,
    batch: LogBatch,
) -> u64 {
    for entry in batch.entries.iter().filter(|entry| entry.is_log_record) {
        if let Some(event) = translate(entry, index) {
            if !events.put(event) {
                log::warn!("Event index {index} was already assigned");
            }
            index += 1;
        }
    }
    if let Some(cursor) = batch.cursor {
        cursors.insert(container.id.clone(), cursor);
    }
    index
}
