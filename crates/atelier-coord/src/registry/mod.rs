//! Registry - component factory registration and lazy resolution.
//!
//! UI modules are loaded on demand: a window may ask for a component by name
//! before anything has registered it. The registry answers synchronous
//! lookups, parks asynchronous waiters until registration, and de-duplicates
//! concurrent lazy loads so a loader runs at most once per name. The
//! registry only grows for the life of the process.

/// Core registry implementation.
pub mod registry;
/// Factory, instance, and host traits plus component metadata.
pub mod types;

pub use registry::{ComponentRegistry, SharedFactory};
pub use types::{
    ComponentDefinition, ComponentFactory, ComponentHost, ComponentInstance, NoopHost,
};
