use super::store::{SharedStateStore, StateSubscription};
use super::types::{StateChange, StateMap};
use serde_json::Value;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{error, warn};

type ComputeFn = Arc<dyn Fn(&StateMap) -> Value + Send + Sync>;
type ViewCallback = Arc<dyn Fn(&Value) + Send + Sync>;

struct ViewShared {
    store: SharedStateStore,
    compute: ComputeFn,
    dependency_keys: Vec<String>,
    next_id: AtomicU64,
    inner: Mutex<ViewInner>,
}

struct ViewInner {
    last: Value,
    listeners: Vec<(u64, ViewCallback)>,
    /// Present while at least one listener is attached (and right after
    /// construction); released when the listener count returns to zero so a
    /// forgotten view does not leak a store listener.
    upstream: Option<StateSubscription>,
}

impl Drop for ViewShared {
    fn drop(&mut self) {
        // Last view handle gone; detach from the parent store.
        if let Ok(inner) = self.inner.get_mut() {
            if let Some(upstream) = inner.upstream.take() {
                upstream.unsubscribe();
            }
        }
    }
}

/// Memoized projection over a subset of store keys.
///
/// Created through [`SharedStateStore::derive`]. Recomputes only when a
/// dependency key changes, and notifies its own listeners only when the
/// recomputed value is structurally different from the previous one.
#[derive(Clone)]
pub struct DerivedView {
    shared: Arc<ViewShared>,
}

impl DerivedView {
    pub(crate) fn attach(
        store: SharedStateStore,
        compute: ComputeFn,
        dependency_keys: &[&str],
    ) -> Self {
        let initial = compute(&store.snapshot());
        let shared = Arc::new(ViewShared {
            store,
            compute,
            dependency_keys: dependency_keys.iter().map(|k| (*k).to_string()).collect(),
            next_id: AtomicU64::new(0),
            inner: Mutex::new(ViewInner {
                last: initial,
                listeners: Vec::new(),
                upstream: None,
            }),
        });
        let upstream = Self::subscribe_upstream(&shared);
        shared.inner.lock().expect("view lock poisoned").upstream = Some(upstream);
        Self { shared }
    }

    fn subscribe_upstream(shared: &Arc<ViewShared>) -> StateSubscription {
        let weak = Arc::downgrade(shared);
        let filter: HashSet<String> = shared.dependency_keys.iter().cloned().collect();
        shared.store.subscribe_arc(
            Some(filter),
            Arc::new(move |change: &StateChange| {
                if let Some(shared) = weak.upgrade() {
                    Self::on_dependency_change(&shared, change);
                }
            }),
        )
    }

    fn on_dependency_change(shared: &Arc<ViewShared>, change: &StateChange) {
        let computed =
            catch_unwind(AssertUnwindSafe(|| (shared.compute)(&change.snapshot)));
        let Ok(value) = computed else {
            error!("derived view compute panicked; keeping previous value");
            return;
        };

        let to_notify: Vec<(u64, ViewCallback)> = {
            let mut inner = shared.inner.lock().expect("view lock poisoned");
            if inner.last == value {
                return;
            }
            inner.last = value.clone();
            inner
                .listeners
                .iter()
                .map(|(id, cb)| (*id, Arc::clone(cb)))
                .collect()
        };

        for (id, callback) in to_notify {
            let live = {
                let inner = shared.inner.lock().expect("view lock poisoned");
                inner.listeners.iter().any(|(lid, _)| *lid == id)
            };
            if !live {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| callback(&value))).is_err() {
                error!(listener = id, "derived view listener panicked");
            }
        }
    }

    /// Current value of the projection.
    ///
    /// While at least one listener is attached this is the memoized value; a
    /// detached view recomputes on the fly without caching or notifying.
    #[must_use]
    pub fn get(&self) -> Value {
        {
            let inner = self.shared.inner.lock().expect("view lock poisoned");
            if inner.upstream.is_some() {
                return inner.last.clone();
            }
        }
        let snapshot = self.shared.store.snapshot();
        match catch_unwind(AssertUnwindSafe(|| (self.shared.compute)(&snapshot))) {
            Ok(value) => value,
            Err(_) => {
                warn!("derived view compute panicked; returning last known value");
                let inner = self.shared.inner.lock().expect("view lock poisoned");
                inner.last.clone()
            }
        }
    }

    /// Register `callback` for future value changes of this view.
    ///
    /// Re-attaching the first listener after the view went idle refreshes the
    /// cached value and re-subscribes to the parent store.
    pub fn subscribe(&self, callback: impl Fn(&Value) + Send + Sync + 'static) -> ViewSubscription {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let reattach = {
            let mut inner = self.shared.inner.lock().expect("view lock poisoned");
            inner.listeners.push((id, Arc::new(callback)));
            inner.upstream.is_none()
        };
        if reattach {
            let snapshot = self.shared.store.snapshot();
            let fresh = catch_unwind(AssertUnwindSafe(|| (self.shared.compute)(&snapshot)));
            let upstream = Self::subscribe_upstream(&self.shared);
            let mut inner = self.shared.inner.lock().expect("view lock poisoned");
            match fresh {
                Ok(value) => inner.last = value,
                Err(_) => warn!("derived view compute panicked; keeping stale value"),
            }
            inner.upstream = Some(upstream);
        }
        ViewSubscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Number of listeners currently attached to this view.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let inner = self.shared.inner.lock().expect("view lock poisoned");
        inner.listeners.len()
    }

    /// Whether the view currently holds a subscription on the parent store.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        let inner = self.shared.inner.lock().expect("view lock poisoned");
        inner.upstream.is_some()
    }
}

/// Token detaching exactly one view registration.
pub struct ViewSubscription {
    id: u64,
    shared: Weak<ViewShared>,
}

impl ViewSubscription {
    /// Detach the registration this token was returned for.
    ///
    /// When the last listener detaches, the view releases its subscription
    /// on the parent store.
    pub fn unsubscribe(self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let upstream = {
            let mut inner = shared.inner.lock().expect("view lock poisoned");
            inner.listeners.retain(|(id, _)| *id != self.id);
            if inner.listeners.is_empty() {
                inner.upstream.take()
            } else {
                None
            }
        };
        if let Some(subscription) = upstream {
            subscription.unsubscribe();
        }
    }
}
