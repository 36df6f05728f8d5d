use super::derived::DerivedView;
use super::types::{ListenerEntry, StateCallback, StateChange, StateMap};
use serde_json::Value;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error};

pub(crate) struct StoreShared {
    pub(crate) inner: Mutex<StoreInner>,
    next_id: AtomicU64,
}

pub(crate) struct StoreInner {
    state: StateMap,
    listeners: Vec<ListenerEntry>,
}

/// Process-local shared state store.
///
/// Constructed once at the application root with an initial snapshot and
/// injected into every consumer; never persisted by this layer. Cloning
/// yields another handle to the same store.
#[derive(Clone)]
pub struct SharedStateStore {
    shared: Arc<StoreShared>,
}

impl SharedStateStore {
    /// Create a store holding `initial`.
    #[must_use]
    pub fn new(initial: StateMap) -> Self {
        Self {
            shared: Arc::new(StoreShared {
                inner: Mutex::new(StoreInner {
                    state: initial,
                    listeners: Vec::new(),
                }),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Full state as an independent snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StateMap {
        let inner = self.shared.inner.lock().expect("store lock poisoned");
        inner.state.clone()
    }

    /// One value by key, cloned. Absent key is `None`, not an error.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let inner = self.shared.inner.lock().expect("store lock poisoned");
        inner.state.get(key).cloned()
    }

    /// Merge `partial` into the state.
    ///
    /// Only keys whose value actually differs from the current one enter the
    /// change set; a call with no effective change notifies nobody. Listeners
    /// whose filter intersects the change set (or is unfiltered) receive the
    /// resulting snapshot, the pre-change snapshot, and the changed keys, in
    /// subscription order.
    pub fn set(&self, partial: StateMap) {
        let (change, matched) = {
            let mut inner = self.shared.inner.lock().expect("store lock poisoned");
            let previous = inner.state.clone();

            let mut changed = Vec::new();
            for (key, value) in partial {
                if inner.state.get(&key) != Some(&value) {
                    changed.push(key.clone());
                    inner.state.insert(key, value);
                }
            }
            if changed.is_empty() {
                return;
            }
            debug!(keys = ?changed, "state changed");

            let change = StateChange {
                snapshot: inner.state.clone(),
                previous,
                changed,
            };
            let matched = Self::matching_listeners(&inner, &change.changed);
            (change, matched)
        };
        self.notify(&change, matched);
    }

    /// Replace the state wholesale.
    ///
    /// The change set is the union of keys present in either the old or the
    /// new state; listeners are notified as for `set`.
    pub fn reset(&self, new_state: StateMap) {
        let (change, matched) = {
            let mut inner = self.shared.inner.lock().expect("store lock poisoned");
            let previous = std::mem::replace(&mut inner.state, new_state);

            let mut changed: Vec<String> = previous.keys().cloned().collect();
            for key in inner.state.keys() {
                if !previous.contains_key(key) {
                    changed.push(key.clone());
                }
            }
            if changed.is_empty() {
                return;
            }
            debug!(keys = changed.len(), "state reset");

            let change = StateChange {
                snapshot: inner.state.clone(),
                previous,
                changed,
            };
            let matched = Self::matching_listeners(&inner, &change.changed);
            (change, matched)
        };
        self.notify(&change, matched);
    }

    /// Register `callback` for changes to `keys` (`None` = any change).
    ///
    /// Returns a token that detaches exactly this registration.
    pub fn subscribe(
        &self,
        keys: Option<&[&str]>,
        callback: impl Fn(&StateChange) + Send + Sync + 'static,
    ) -> StateSubscription {
        self.subscribe_arc(
            keys.map(|ks| ks.iter().map(|k| (*k).to_string()).collect()),
            Arc::new(callback),
        )
    }

    pub(crate) fn subscribe_arc(
        &self,
        filter: Option<HashSet<String>>,
        callback: StateCallback,
    ) -> StateSubscription {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.shared.inner.lock().expect("store lock poisoned");
        inner.listeners.push(ListenerEntry {
            id,
            filter,
            callback,
        });
        StateSubscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Create a memoized projection over `dependency_keys`.
    ///
    /// The view computes an initial value immediately and recomputes on each
    /// change touching a dependency key; its own listeners are notified only
    /// when the recomputed value differs from the previous one.
    #[must_use]
    pub fn derive(
        &self,
        compute: impl Fn(&StateMap) -> Value + Send + Sync + 'static,
        dependency_keys: &[&str],
    ) -> DerivedView {
        DerivedView::attach(self.clone(), Arc::new(compute), dependency_keys)
    }

    /// Number of listeners currently registered, derived views included.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let inner = self.shared.inner.lock().expect("store lock poisoned");
        inner.listeners.len()
    }

    fn matching_listeners(inner: &StoreInner, changed: &[String]) -> Vec<(u64, StateCallback)> {
        inner
            .listeners
            .iter()
            .filter(|l| l.matches(changed))
            .map(|l| (l.id, Arc::clone(&l.callback)))
            .collect()
    }

    /// Invoke listeners outside the lock; skip ones detached meanwhile.
    fn notify(&self, change: &StateChange, matched: Vec<(u64, StateCallback)>) {
        for (id, callback) in matched {
            let live = {
                let inner = self.shared.inner.lock().expect("store lock poisoned");
                inner.listeners.iter().any(|l| l.id == id)
            };
            if !live {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| callback(change))).is_err() {
                error!(listener = id, "state listener panicked");
            }
        }
    }
}

impl Default for SharedStateStore {
    fn default() -> Self {
        Self::new(StateMap::new())
    }
}

/// Token detaching exactly one store registration.
pub struct StateSubscription {
    id: u64,
    shared: Weak<StoreShared>,
}

impl StateSubscription {
    /// Detach the registration this token was returned for.
    pub fn unsubscribe(self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut inner = shared.inner.lock().expect("store lock poisoned");
        inner.listeners.retain(|l| l.id != self.id);
    }
}
