use std::collections::{BTreeMap, BTreeSet};

use tokio::time::Instant;

use crate::directory::{ContainerHandle, LogCursor, LogMatcher, ProcessHandle};
use crate::events::{Event, EventWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Deploy,
    Undeploy,
}

/// Immutable snapshot of the events of one operation.
///
/// A refresh never mutates a published value, it publishes a new one.
#[derive(Debug, Clone)]
pub struct CacheValue {
    pub events: EventWindow,
    /// Next index to assign.
    pub last_event_index: u64,
    pub last_refreshed_at: Instant,
    pub owner_containers: BTreeSet<ContainerHandle>,
    pub processes: BTreeSet<ProcessHandle>,
    pub operation: OperationKind,
    /// An undeploy started while this deploy was being tracked.
    pub superseded: bool,
    pub(super) matcher: LogMatcher,
    /// Read position per container id.
    pub(super) cursors: BTreeMap<String, LogCursor>,
}

impl CacheValue {
    /// Events with an index of at least `from`.
    pub fn events_since(&self, from: u64) -> Vec<&Event> {
        match self.last_assigned_index() {
            Some(last) => self.events.range(from, last),
            None => Vec::new(),
        }
    }

    pub fn last_assigned_index(&self) -> Option<u64> {
        self.last_event_index.checked_sub(1)
    }
}
