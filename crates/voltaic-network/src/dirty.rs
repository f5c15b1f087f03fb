use std::collections::BTreeSet;

use crate::id::NetworkId;

/// Tracks networks whose connectivity may be stale.
///
/// A network lands here when a node is removed while the network is
/// inactive and splits are being deferred. Until the network is flushed its
/// members may form more than one component. Iteration is in id order.
#[derive(Debug, Clone, Default)]
pub struct PendingSplits {
    networks: BTreeSet<NetworkId>,
}

impl PendingSplits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a network as needing a component recount.
    pub fn mark(&mut self, network: NetworkId) {
        self.networks.insert(network);
    }

    /// Clear the mark. Returns `true` if the network was marked.
    pub fn clear(&mut self, network: NetworkId) -> bool {
        self.networks.remove(&network)
    }

    /// Move the mark from `from` onto `to` (used when `from` is absorbed).
    pub fn transfer(&mut self, from: NetworkId, to: NetworkId) {
        if self.networks.remove(&from) {
            self.networks.insert(to);
        }
    }

    pub fn is_pending(&self, network: NetworkId) -> bool {
        self.networks.contains(&network)
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// Snapshot of the marked networks, in id order.
    pub fn pending(&self) -> Vec<NetworkId> {
        self.networks.iter().copied().collect()
    }
}
