//! In-memory stand-ins for the directory, the platform and the terminal.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::DeploymentEventCache;
use crate::directory::{
    ContainerHandle, Directory, DirectoryError, LogBatch, LogCursor, LogEntry, LogMatcher,
    ProcessHandle,
};
use crate::events::Event;
use crate::inspect::ProgressDisplay;
use crate::platform::{
    ApplicationDescription, DeploymentState, PlatformClient, RestError, ServiceDescription,
};

pub const EVENT_LOGGER: &str = "EventLogger";

/// A log record as the event logger writes it.
pub fn event_line(category: &str, message: &str) -> String {
    format!("2026-10-19 10:00:00,000 INFO - {EVENT_LOGGER}.{category} {message}")
}

/// Cache over `directory` that refreshes on every access.
pub fn events_cache(directory: &Arc<FakeDirectory>) -> Arc<DeploymentEventCache> {
    Arc::new(DeploymentEventCache::new(
        directory.clone(),
        EVENT_LOGGER,
        Duration::ZERO,
    ))
}

#[derive(Default)]
struct DirectoryState {
    properties: BTreeMap<String, HashMap<String, String>>,
    containers: BTreeMap<String, BTreeSet<ContainerHandle>>,
    logs: HashMap<String, Vec<String>>,
    undeploying: BTreeSet<String>,
    failing: bool,
    list_delay: Duration,
    fetch_delay: Duration,
}

/// Directory whose log cursor is the number of lines already read.
#[derive(Default)]
pub struct FakeDirectory {
    state: Mutex<DirectoryState>,
    list_calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.state.lock().expect("Directory state poisoned")
    }

    pub fn add_process(&self, name: &str, properties: &[(&str, &str)]) {
        self.state().properties.insert(
            name.to_string(),
            properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }

    pub fn add_container(&self, process: &str, id: &str, address: &str) {
        self.state()
            .containers
            .entry(process.to_string())
            .or_default()
            .insert(ContainerHandle {
                id: id.to_string(),
                host_name: id.to_string(),
                host_address: address.to_string(),
            });
    }

    /// The container stops being listed, its logs stay readable.
    pub fn remove_container(&self, process: &str, id: &str) {
        if let Some(containers) = self.state().containers.get_mut(process) {
            containers.retain(|container| container.id != id);
        }
    }

    pub fn log(&self, container: &str, line: &str) {
        self.state()
            .logs
            .entry(container.to_string())
            .or_default()
            .push(line.to_string());
    }

    pub fn set_undeploying(&self, process: &str, undeploying: bool) {
        let mut state = self.state();
        if undeploying {
            state.undeploying.insert(process.to_string());
        } else {
            state.undeploying.remove(process);
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    pub fn set_list_delay(&self, delay: Duration) {
        self.state().list_delay = delay;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state().fetch_delay = delay;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), DirectoryError> {
        if self.state().failing {
            return Err(DirectoryError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn list_worker_processes(&self) -> Result<BTreeSet<ProcessHandle>, DirectoryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state().list_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;
        Ok(self
            .state()
            .properties
            .keys()
            .map(|name| ProcessHandle { name: name.clone() })
            .collect())
    }

    async fn process_context_property(
        &self,
        process: &ProcessHandle,
        key: &str,
    ) -> Result<Option<String>, DirectoryError> {
        self.check_available()?;
        Ok(self
            .state()
            .properties
            .get(&process.name)
            .and_then(|properties| properties.get(key))
            .cloned())
    }

    async fn containers_for_process(
        &self,
        process: &ProcessHandle,
    ) -> Result<BTreeSet<ContainerHandle>, DirectoryError> {
        self.check_available()?;
        Ok(self
            .state()
            .containers
            .get(&process.name)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_log_entries(
        &self,
        container: &ContainerHandle,
        matcher: &LogMatcher,
        cursor: Option<LogCursor>,
    ) -> Result<LogBatch, DirectoryError> {
        let delay = self.state().fetch_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;

        let state = self.state();
        let lines = state
            .logs
            .get(&container.id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let start = cursor.map_or(0, |LogCursor(read)| read as usize);
        let entries = lines
            .iter()
            .skip(start)
            .filter(|line| line.contains(&matcher.logger))
            .map(|line| LogEntry {
                text: line.clone(),
                is_log_record: line.contains(" - "),
                host_name: container.host_name.clone(),
                host_address: container.host_address.clone(),
            })
            .collect();

        Ok(LogBatch {
            entries,
            cursor: Some(LogCursor(lines.len() as i64)),
        })
    }

    async fn undeploy_in_progress(&self, process: &ProcessHandle) -> Result<bool, DirectoryError> {
        self.check_available()?;
        Ok(self.state().undeploying.contains(&process.name))
    }
}

#[derive(Default)]
struct PlatformState {
    applications: HashMap<String, DeploymentState>,
    services: HashMap<(String, String), ServiceDescription>,
    failure: Option<(u16, String)>,
}

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PlatformState> {
        self.state.lock().expect("Platform state poisoned")
    }

    pub fn set_application(&self, application: &str, state: DeploymentState) {
        self.state()
            .applications
            .insert(application.to_string(), state);
    }

    pub fn remove_application(&self, application: &str) {
        self.state().applications.remove(application);
    }

    pub fn set_service(
        &self,
        application: &str,
        service: &str,
        state: DeploymentState,
        instance_count: u32,
    ) {
        self.state().services.insert(
            (application.to_string(), service.to_string()),
            ServiceDescription {
                name: service.to_string(),
                state,
                instance_count,
            },
        );
    }

    pub fn remove_service(&self, application: &str, service: &str) {
        self.state()
            .services
            .remove(&(application.to_string(), service.to_string()));
    }

    /// Every following request fails with `status`.
    pub fn fail_with(&self, status: u16, message: &str) {
        self.state().failure = Some((status, message.to_string()));
    }

    fn check_available(&self) -> Result<(), RestError> {
        match &self.state().failure {
            Some((status, message)) => Err(RestError::Status {
                status: *status,
                message: message.clone(),
                verbose: None,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn application_description(
        &self,
        application: &str,
    ) -> Result<ApplicationDescription, RestError> {
        self.check_available()?;
        self.state()
            .applications
            .get(application)
            .map(|state| ApplicationDescription { state: *state })
            .ok_or_else(|| RestError::NotFound(application.to_string()))
    }

    async fn service_description(
        &self,
        application: &str,
        service: &str,
    ) -> Result<ServiceDescription, RestError> {
        self.check_available()?;
        self.state()
            .services
            .get(&(application.to_string(), service.to_string()))
            .cloned()
            .ok_or_else(|| RestError::NotFound(service.to_string()))
    }
}

/// Records what would have been printed. A poll without news is a `.`.
#[derive(Default)]
pub struct RecordingDisplay {
    lines: Mutex<Vec<String>>,
}

impl RecordingDisplay {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("Display poisoned").clone()
    }

    fn push(&self, line: String) {
        self.lines.lock().expect("Display poisoned").push(line);
    }
}

impl ProgressDisplay for RecordingDisplay {
    fn print_events(&self, events: &[Event]) {
        for event in events {
            self.push(event.description.clone());
        }
    }

    fn print_no_change(&self) {
        self.push(".".to_string());
    }

    fn print_event(&self, line: &str) {
        self.push(line.to_string());
    }
}
