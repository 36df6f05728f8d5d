use super::types::{ComponentFactory, ComponentHost, NoopHost};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Factories are shared; one registration serves every window.
pub type SharedFactory = Arc<dyn ComponentFactory>;

type Waiter = oneshot::Sender<Result<SharedFactory>>;

struct RegistryInner {
    components: HashMap<String, SharedFactory>,
    /// FIFO waiters per name, parked until registration or loader failure.
    waiters: HashMap<String, Vec<Waiter>>,
    /// Names with a loader currently in flight.
    loading: HashSet<String>,
    /// Names whose host definition side effect already ran.
    defined: HashSet<String>,
}

struct RegistryShared {
    host: Arc<dyn ComponentHost>,
    inner: Mutex<RegistryInner>,
}

/// Process-wide component factory registry.
///
/// Cloning yields another handle to the same registry. Registrations are
/// last-writer-wins; the registry never removes a name.
#[derive(Clone)]
pub struct ComponentRegistry {
    shared: Arc<RegistryShared>,
}

impl ComponentRegistry {
    /// Create a registry with no host side effects.
    #[must_use]
    pub fn new() -> Self {
        Self::with_host(Arc::new(NoopHost))
    }

    /// Create a registry that runs `host.define` once per component name.
    #[must_use]
    pub fn with_host(host: Arc<dyn ComponentHost>) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                host,
                inner: Mutex::new(RegistryInner {
                    components: HashMap::new(),
                    waiters: HashMap::new(),
                    loading: HashSet::new(),
                    defined: HashSet::new(),
                }),
            }),
        }
    }

    /// Install `factory` under its definition name.
    ///
    /// Resolves every waiter currently parked on the name, in the order the
    /// waits were requested. Re-registering a name replaces the factory
    /// (logged at warn level) but never re-runs the host definition and
    /// never fails.
    pub fn register(&self, factory: SharedFactory) {
        self.install(factory, false);
    }

    /// Shared tail of `register` and a successful `ensure` load: swap the
    /// factory in, drain parked waiters FIFO, and run the host definition
    /// the first time the name appears.
    fn install(&self, factory: SharedFactory, finished_load: bool) {
        let definition = factory.definition().clone();
        let name = definition.name.clone();

        let (waiters, needs_define) = {
            let mut inner = self.shared.inner.lock().expect("registry lock poisoned");
            if finished_load {
                inner.loading.remove(&name);
            }
            if inner.components.insert(name.clone(), Arc::clone(&factory)).is_some() {
                warn!(component = %name, "re-registering component; last registration wins");
            } else {
                debug!(component = %name, "component registered");
            }
            let waiters = inner.waiters.remove(&name).unwrap_or_default();
            let needs_define = inner.defined.insert(name.clone());
            (waiters, needs_define)
        };

        if needs_define {
            if let Err(e) = self.shared.host.define(&definition) {
                warn!(component = %name, error = %e, "host definition failed");
            }
        }

        for waiter in waiters {
            let _ = waiter.send(Ok(Arc::clone(&factory)));
        }
    }

    /// Factory registered under `name`, if any. Synchronous, non-blocking.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<SharedFactory> {
        let inner = self.shared.inner.lock().expect("registry lock poisoned");
        inner.components.get(name).cloned()
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        let inner = self.shared.inner.lock().expect("registry lock poisoned");
        inner.components.contains_key(name)
    }

    /// All registered component names.
    #[must_use]
    pub fn list_names(&self) -> Vec<String> {
        let inner = self.shared.inner.lock().expect("registry lock poisoned");
        inner.components.keys().cloned().collect()
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.shared.inner.lock().expect("registry lock poisoned");
        inner.components.len()
    }

    /// Whether the registry holds no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `name`, waiting for registration if necessary.
    ///
    /// Resolves immediately for a registered name; otherwise parks until
    /// `register` runs for it or an in-flight loader for it fails. There is
    /// no timeout: with no registration and no loader, the wait is
    /// indefinite.
    pub async fn get_async(&self, name: &str) -> Result<SharedFactory> {
        let receiver = {
            let mut inner = self.shared.inner.lock().expect("registry lock poisoned");
            if let Some(factory) = inner.components.get(name) {
                return Ok(Arc::clone(factory));
            }
            let (sender, receiver) = oneshot::channel();
            inner.waiters.entry(name.to_string()).or_default().push(sender);
            receiver
        };
        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(Error::ResolutionFailed {
                name: name.to_string(),
                reason: "registry dropped before resolution".to_string(),
            }),
        }
    }

    /// Idempotent accessor: resolve `name`, lazily loading it at most once.
    ///
    /// A registered name resolves immediately. Otherwise the first caller
    /// invokes `loader`; every concurrent caller for the same name shares
    /// that one invocation's eventual outcome, success or failure. On
    /// failure every parked waiter for the name observes the error and the
    /// in-flight marker is cleared, so a later call may retry.
    pub async fn ensure<F, Fut>(&self, name: &str, loader: F) -> Result<SharedFactory>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SharedFactory>>,
    {
        enum Entry {
            Ready(SharedFactory),
            Join(oneshot::Receiver<Result<SharedFactory>>),
            Load,
        }

        let entry = {
            let mut inner = self.shared.inner.lock().expect("registry lock poisoned");
            if let Some(factory) = inner.components.get(name) {
                Entry::Ready(Arc::clone(factory))
            } else if inner.loading.contains(name) {
                let (sender, receiver) = oneshot::channel();
                inner.waiters.entry(name.to_string()).or_default().push(sender);
                Entry::Join(receiver)
            } else {
                inner.loading.insert(name.to_string());
                Entry::Load
            }
        };

        match entry {
            Entry::Ready(factory) => Ok(factory),
            Entry::Join(receiver) => match receiver.await {
                Ok(result) => result,
                Err(_) => Err(Error::ResolutionFailed {
                    name: name.to_string(),
                    reason: "registry dropped before resolution".to_string(),
                }),
            },
            Entry::Load => {
                debug!(component = %name, "loading component");
                let outcome = loader().await.and_then(|factory| {
                    let loaded = &factory.definition().name;
                    if loaded == name {
                        Ok(factory)
                    } else {
                        Err(Error::ResolutionFailed {
                            name: name.to_string(),
                            reason: format!("loader produced component '{loaded}'"),
                        })
                    }
                });
                match outcome {
                    Ok(factory) => {
                        // Installing also drains the parked waiters for this
                        // name and clears the in-flight marker atomically.
                        self.install(Arc::clone(&factory), true);
                        Ok(factory)
                    }
                    Err(e) => {
                        let failure = match e {
                            failure @ Error::ResolutionFailed { .. } => failure,
                            other => Error::ResolutionFailed {
                                name: name.to_string(),
                                reason: other.to_string(),
                            },
                        };
                        let waiters = {
                            let mut inner =
                                self.shared.inner.lock().expect("registry lock poisoned");
                            inner.loading.remove(name);
                            inner.waiters.remove(name).unwrap_or_default()
                        };
                        warn!(component = %name, error = %failure, "component load failed");
                        for waiter in waiters {
                            let _ = waiter.send(Err(failure.clone()));
                        }
                        Err(failure)
                    }
                }
            }
        }
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
