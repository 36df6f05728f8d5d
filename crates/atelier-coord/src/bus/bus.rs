use super::types::{EventCallback, Origin, SubscriberEntry};
use crate::transport::{BroadcastTransport, WireMessage};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

struct BusShared {
    topics: Mutex<HashMap<String, Vec<SubscriberEntry>>>,
    next_id: AtomicU64,
    transport: Option<Arc<dyn BroadcastTransport>>,
}

/// Per-window publish/subscribe hub.
///
/// Cloning yields another handle to the same bus. The bus lives for the
/// window's session; dropping the last handle stops the transport intake
/// task and releases the transport.
///
/// Local subscribers of a topic are invoked synchronously from `publish`,
/// in subscription order. A subscriber that panics is caught and logged at
/// the dispatch site; remaining subscribers still receive the event. There
/// is no acknowledgment and no retry.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<BusShared>,
}

impl EventBus {
    /// Create a bus with no cross-window capability.
    ///
    /// Every publish stays inside this window.
    #[must_use]
    pub fn local() -> Self {
        Self {
            shared: Arc::new(BusShared {
                topics: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                transport: None,
            }),
        }
    }

    /// Create a bus attached to a broadcast domain.
    ///
    /// `transport` is this window's sending half; `incoming` carries the
    /// messages other windows forward to it. An intake task dispatching
    /// incoming messages as remote events is spawned on the current tokio
    /// runtime, so this must be called from within one. The task exits when
    /// the last bus handle is dropped or the sending side hangs up.
    #[must_use]
    pub fn with_transport(
        transport: Arc<dyn BroadcastTransport>,
        mut incoming: mpsc::UnboundedReceiver<WireMessage>,
    ) -> Self {
        let shared = Arc::new(BusShared {
            topics: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            transport: Some(transport),
        });

        let weak = Arc::downgrade(&shared);
        tokio::spawn(async move {
            while let Some(message) = incoming.recv().await {
                let Some(shared) = weak.upgrade() else { break };
                Self::dispatch(&shared, &message.topic, &message.payload, Origin::Remote);
            }
            debug!("bus transport intake stopped");
        });

        Self { shared }
    }

    /// Register `callback` for every future publish on `topic`.
    ///
    /// Each call yields one independent registration, removable through the
    /// returned [`Subscription`] only.
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.add_subscriber(topic.into(), Arc::new(callback), false)
    }

    /// Register `callback` for the next publish on `topic` only.
    ///
    /// The registration is detached before the callback runs, so a callback
    /// that re-publishes the same topic cannot re-trigger itself.
    pub fn once(
        &self,
        topic: impl Into<String>,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.add_subscriber(topic.into(), Arc::new(callback), true)
    }

    fn add_subscriber(&self, topic: String, callback: EventCallback, once: bool) -> Subscription {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let mut topics = self.shared.topics.lock().expect("bus lock poisoned");
        topics
            .entry(topic.clone())
            .or_default()
            .push(SubscriberEntry { id, callback, once });
        Subscription {
            topic,
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Publish `payload` on `topic`.
    ///
    /// Delivers to all current local subscribers first, then forwards over
    /// the broadcast transport (when attached) exactly once. Returns the
    /// number of local subscribers that received the event.
    pub fn publish(&self, topic: &str, payload: Value) -> usize {
        Self::dispatch(&self.shared, topic, &payload, Origin::Local)
    }

    /// Drop all subscribers of `topic`.
    pub fn clear(&self, topic: &str) {
        let mut topics = self.shared.topics.lock().expect("bus lock poisoned");
        topics.remove(topic);
    }

    /// Drop all subscribers of every topic.
    pub fn clear_all(&self) {
        let mut topics = self.shared.topics.lock().expect("bus lock poisoned");
        topics.clear();
    }

    /// Number of current subscribers of `topic`. No side effects.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.shared.topics.lock().expect("bus lock poisoned");
        topics.get(topic).map_or(0, Vec::len)
    }

    /// Whether this bus forwards to other windows.
    #[must_use]
    pub fn has_transport(&self) -> bool {
        self.shared.transport.is_some()
    }

    /// The single dispatch routine behind both `publish` and transport
    /// intake. Always delivers locally; forwards only `Local` events, which
    /// makes re-forwarding a `Remote` event structurally impossible.
    fn dispatch(shared: &Arc<BusShared>, topic: &str, payload: &Value, origin: Origin) -> usize {
        // Snapshot under the lock, invoke outside it: callbacks may freely
        // subscribe, unsubscribe, or publish again.
        let entries: Vec<(u64, EventCallback, bool)> = {
            let topics = shared.topics.lock().expect("bus lock poisoned");
            topics.get(topic).map_or_else(Vec::new, |subs| {
                subs.iter()
                    .map(|s| (s.id, Arc::clone(&s.callback), s.once))
                    .collect()
            })
        };

        let mut delivered = 0;
        for (id, callback, once) in entries {
            // Skip entries detached while this dispatch was in flight. A
            // `once` entry is detached here, before its callback runs.
            let live = {
                let mut topics = shared.topics.lock().expect("bus lock poisoned");
                match topics.get_mut(topic) {
                    Some(subs) if once => {
                        let before = subs.len();
                        subs.retain(|s| s.id != id);
                        subs.len() != before
                    }
                    Some(subs) => subs.iter().any(|s| s.id == id),
                    None => false,
                }
            };
            if !live {
                continue;
            }

            delivered += 1;
            if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                error!(topic, subscriber = id, "subscriber panicked during dispatch");
            }
        }

        if origin == Origin::Local {
            if let Some(transport) = &shared.transport {
                if let Err(e) = transport.forward(WireMessage::new(topic, payload.clone())) {
                    warn!(topic, error = %e, "broadcast forward failed");
                }
            }
        }

        delivered
    }
}

/// Token detaching exactly one registration.
pub struct Subscription {
    topic: String,
    id: u64,
    shared: Weak<BusShared>,
}

impl Subscription {
    /// Detach the registration this token was returned for.
    ///
    /// Detaching twice is impossible (consumes the token); detaching after
    /// the bus is gone is a no-op.
    pub fn unsubscribe(self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut topics = shared.topics.lock().expect("bus lock poisoned");
        if let Some(subs) = topics.get_mut(&self.topic) {
            subs.retain(|s| s.id != self.id);
            if subs.is_empty() {
                topics.remove(&self.topic);
            }
        }
    }
}
