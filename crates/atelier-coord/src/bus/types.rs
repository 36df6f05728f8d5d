use serde_json::Value;
use std::sync::Arc;

/// Where an event entered this bus.
///
/// Events received over the broadcast transport are tagged `Remote` and are
/// never forwarded again; that tag is the entire loop-prevention mechanism,
/// for any number of interconnected windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Published by code running in this window.
    Local,
    /// Received from another window via the broadcast transport.
    Remote,
}

/// Callback invoked with the payload of each delivered event.
pub(crate) type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

pub(crate) struct SubscriberEntry {
    pub id: u64,
    pub callback: EventCallback,
    /// Entry detaches itself before its first delivery.
    pub once: bool,
}
