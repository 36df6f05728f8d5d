//! Atelier Coord - Reactive Coordination Layer
//!
//! This crate provides the in-process glue that keeps Atelier's isolated UI
//! windows synchronized:
//! - Bus: per-window publish/subscribe with cross-window broadcast forwarding
//! - Store: shared mutable keyed state with selective change notification and
//!   memoized derived views
//! - Registry: name-keyed component factories with asynchronous, de-duplicated
//!   resolution
//! - Transport: injected cross-window messaging abstraction plus an in-process
//!   hub implementation
//!
//! Nothing in this crate persists state or renders UI; windows obtain their
//! bus/store/registry handles by construction-time injection from the host.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod error;
pub mod registry;
pub mod store;
pub mod transport;

pub use bus::{EventBus, Subscription};
pub use error::{Error, Result};
pub use registry::{
    ComponentDefinition, ComponentFactory, ComponentHost, ComponentInstance, ComponentRegistry,
    NoopHost, SharedFactory,
};
pub use store::{
    DerivedView, SharedStateStore, StateChange, StateMap, StateSubscription, ViewSubscription,
};
pub use transport::{BroadcastTransport, MemoryHub, WireMessage};
