use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Keyed state as held by the store and handed out as snapshots.
pub type StateMap = serde_json::Map<String, Value>;

/// Record of one effective `set`/`reset` call.
///
/// Every listener notified by the same mutation receives the same record;
/// no listener can observe a partially applied state.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// State after the mutation.
    pub snapshot: StateMap,
    /// State immediately before the mutation.
    pub previous: StateMap,
    /// Keys whose values changed in this mutation.
    pub changed: Vec<String>,
}

impl StateChange {
    /// Whether `key` is part of this change.
    #[must_use]
    pub fn touches(&self, key: &str) -> bool {
        self.changed.iter().any(|k| k == key)
    }
}

/// Callback invoked with the change record of each qualifying mutation.
pub(crate) type StateCallback = Arc<dyn Fn(&StateChange) + Send + Sync>;

pub(crate) struct ListenerEntry {
    pub id: u64,
    /// `None` means notify on any change.
    pub filter: Option<HashSet<String>>,
    pub callback: StateCallback,
}

impl ListenerEntry {
    /// Whether this listener's filter intersects the changed-key set.
    pub fn matches(&self, changed: &[String]) -> bool {
        match &self.filter {
            None => true,
            Some(keys) => changed.iter().any(|k| keys.contains(k)),
        }
    }
}
