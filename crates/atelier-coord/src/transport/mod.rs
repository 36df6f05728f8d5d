//! Transport - cross-window message delivery abstraction.
//!
//! Windows are separate execution realms with no shared memory; the only way
//! an event crosses a window boundary is as a [`WireMessage`] over a
//! [`BroadcastTransport`]. The transport for a bus is chosen once by the
//! composition root (a real IPC-backed implementation in the host, the
//! in-process [`MemoryHub`] for tests and the single-process host); a bus
//! constructed without one simply operates local-only.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// In-process transport hub with named domains.
pub mod memory;

pub use memory::MemoryHub;

/// A topic-tagged payload in the form it crosses a window boundary.
///
/// Payloads are plain `serde_json` values: no function references, no open
/// resource handles, nothing a cross-realm messaging primitive could not
/// carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Topic the payload was published under.
    pub topic: String,
    /// The published payload.
    pub payload: serde_json::Value,
}

impl WireMessage {
    /// Create a new wire message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// One member's sending half of a named broadcast domain.
///
/// `forward` delivers to every *other* member of the domain, never back to
/// the sender. Delivery between any two members is FIFO; no ordering is
/// guaranteed across three or more members.
pub trait BroadcastTransport: Send + Sync {
    /// Name of the domain this transport belongs to.
    fn domain(&self) -> &str;

    /// Forward one message to every other member of the domain.
    fn forward(&self, message: WireMessage) -> Result<()>;
}
