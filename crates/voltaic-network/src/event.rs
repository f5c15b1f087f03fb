//! Structural events emitted by the registry.
//!
//! Events are buffered in emission order and handed out by
//! [`NetworkRegistry::drain_events`](crate::NetworkRegistry::drain_events).
//! Energy movement is reported through tick results, not events.

use serde::{Deserialize, Serialize};

use crate::id::NetworkId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkEvent {
    /// A single-node network was created for an isolated node.
    Created { network: NetworkId },
    /// `absorbed` networks were folded into `survivor` and no longer exist.
    Merged {
        survivor: NetworkId,
        absorbed: Vec<NetworkId>,
    },
    /// `original` fell apart into `parts`, one network per component. Each
    /// part already carries the state its members imply.
    Split {
        original: NetworkId,
        parts: Vec<NetworkId>,
    },
    /// The last node of the network was removed.
    Destroyed { network: NetworkId },
    /// Every member is in an active region again.
    Activated { network: NetworkId },
    /// Some member now lies in an inactive region.
    Deactivated { network: NetworkId },
}

impl NetworkEvent {
    /// The network the event is primarily about.
    pub fn network(&self) -> NetworkId {
        match self {
            NetworkEvent::Created { network }
            | NetworkEvent::Destroyed { network }
            | NetworkEvent::Activated { network }
            | NetworkEvent::Deactivated { network } => *network,
            NetworkEvent::Merged { survivor, .. } => *survivor,
            NetworkEvent::Split { original, .. } => *original,
        }
    }
}
