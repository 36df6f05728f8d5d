//! Bus - per-window publish/subscribe with cross-window forwarding.
//!
//! Each window owns one [`EventBus`] for its session. Local delivery is
//! synchronous and in subscription order; if the bus was constructed with a
//! broadcast transport, locally published events are additionally forwarded
//! to the other windows of the domain exactly once.

/// Core event bus implementation.
pub mod bus;
/// Origin tag and subscriber bookkeeping types.
pub mod types;

pub use bus::{EventBus, Subscription};
