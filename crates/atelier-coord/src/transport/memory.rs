//! In-process broadcast hub.
//!
//! Simulates the host's cross-window messaging primitive with per-member
//! unbounded mpsc links. Each `join` hands back the member's sending half
//! (a [`BroadcastTransport`]) and the receiving end for its incoming
//! messages. Used by the single-process host and by tests; a production
//! host substitutes an IPC-backed implementation at the same seam.

use super::{BroadcastTransport, WireMessage};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tracing::debug;

struct Member {
    id: u64,
    sender: mpsc::UnboundedSender<WireMessage>,
}

struct HubInner {
    domains: Mutex<HashMap<String, Vec<Member>>>,
    next_member_id: AtomicU64,
}

/// In-process hub of named broadcast domains.
///
/// Cloning yields another handle to the same hub.
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl MemoryHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                domains: Mutex::new(HashMap::new()),
                next_member_id: AtomicU64::new(0),
            }),
        }
    }

    /// Join a domain, becoming one member of it.
    ///
    /// Returns the member's sending half plus the receiver for messages
    /// forwarded by other members. Dropping the receiver leaves the domain;
    /// the hub prunes the membership on the next forward.
    pub fn join(
        &self,
        domain: impl Into<String>,
    ) -> (Arc<dyn BroadcastTransport>, mpsc::UnboundedReceiver<WireMessage>) {
        let domain = domain.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.inner.next_member_id.fetch_add(1, Ordering::Relaxed);

        let mut domains = self.inner.domains.lock().expect("hub lock poisoned");
        domains
            .entry(domain.clone())
            .or_default()
            .push(Member { id, sender });
        debug!(domain = %domain, member = id, "member joined broadcast domain");

        let link = MemoryLink {
            hub: Arc::downgrade(&self.inner),
            domain,
            member_id: id,
        };
        (Arc::new(link), receiver)
    }

    /// Number of live members currently joined to `domain`.
    #[must_use]
    pub fn member_count(&self, domain: &str) -> usize {
        let domains = self.inner.domains.lock().expect("hub lock poisoned");
        domains.get(domain).map_or(0, Vec::len)
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryLink {
    hub: Weak<HubInner>,
    domain: String,
    member_id: u64,
}

impl BroadcastTransport for MemoryLink {
    fn domain(&self) -> &str {
        &self.domain
    }

    fn forward(&self, message: WireMessage) -> Result<()> {
        let hub = self.hub.upgrade().ok_or(Error::TransportClosed)?;
        let mut domains = hub.domains.lock().expect("hub lock poisoned");
        if let Some(members) = domains.get_mut(&self.domain) {
            // Deliver to everyone but the sender; prune members whose
            // receiver has hung up.
            members.retain(|m| {
                m.id == self.member_id || m.sender.send(message.clone()).is_ok()
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_forward_skips_sender() {
        let hub = MemoryHub::new();
        let (a_tx, mut a_rx) = hub.join("main");
        let (_b_tx, mut b_rx) = hub.join("main");

        a_tx.forward(WireMessage::new("ping", json!(1))).unwrap();

        let msg = b_rx.recv().await.unwrap();
        assert_eq!(msg.topic, "ping");
        assert_eq!(msg.payload, json!(1));
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_domains_are_isolated() {
        let hub = MemoryHub::new();
        let (a_tx, _a_rx) = hub.join("alpha");
        let (_b_tx, mut b_rx) = hub.join("beta");

        a_tx.forward(WireMessage::new("ping", json!(null))).unwrap();
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let hub = MemoryHub::new();
        let (a_tx, _a_rx) = hub.join("main");
        let (_b_tx, b_rx) = hub.join("main");
        assert_eq!(hub.member_count("main"), 2);

        drop(b_rx);
        a_tx.forward(WireMessage::new("ping", json!(null))).unwrap();
        assert_eq!(hub.member_count("main"), 1);
    }

    #[test]
    fn test_forward_after_hub_dropped() {
        let hub = MemoryHub::new();
        let (a_tx, _a_rx) = hub.join("main");
        drop(hub);
        // _a_rx keeps no hub alive; only the link's Weak remains
        let err = a_tx.forward(WireMessage::new("ping", serde_json::Value::Null));
        assert!(matches!(err, Err(Error::TransportClosed)));
    }

    #[test]
    fn test_pairwise_fifo() {
        let hub = MemoryHub::new();
        let (a_tx, _a_rx) = hub.join("main");
        let (_b_tx, mut b_rx) = hub.join("main");

        for i in 0..10 {
            a_tx.forward(WireMessage::new("seq", json!(i))).unwrap();
        }
        for i in 0..10 {
            let msg = b_rx.try_recv().unwrap();
            assert_eq!(msg.payload, json!(i));
        }
    }
}
