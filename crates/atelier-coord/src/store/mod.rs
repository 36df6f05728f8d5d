//! Store - shared mutable keyed state with change notification.
//!
//! One [`SharedStateStore`] is constructed at the application root and
//! injected into every consumer. The store owns its state exclusively:
//! every value handed out is an independent snapshot, mutation goes through
//! `set`/`reset` only, and all listeners notified by one mutation observe
//! the identical resulting snapshot.
//!
//! [`DerivedView`]s are memoized projections over a subset of keys,
//! recomputed only when a dependency changes and published only when the
//! recomputed value is structurally different.

/// Memoized derived projections.
pub mod derived;
/// Core store implementation.
pub mod store;
/// Change records and listener bookkeeping types.
pub mod types;

pub use derived::{DerivedView, ViewSubscription};
pub use store::{SharedStateStore, StateSubscription};
pub use types::{StateChange, StateMap};

#[cfg(test)]
mod tests;
