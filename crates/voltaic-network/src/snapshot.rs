//! Registry persistence.
//!
//! Two paths are supported:
//!
//! - [`NetworkRegistry::serialize`] / [`NetworkRegistry::deserialize`]: a
//!   bitcode blob behind a versioned [`SnapshotHeader`]. Network ids, caps,
//!   inactive regions, and deferred splits all survive; each network's
//!   activity is recomputed from the regions on load.
//! - [`NetworkRegistry::rebuild`]: networks are rediscovered from node
//!   positions alone. Ids are fresh and caps start at the configured
//!   default unless [`NetworkRegistry::apply_persisted_caps`] restores them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use voltaic_core::config::EnergyConfig;
use voltaic_core::fixed::Energy;
use voltaic_core::node::{EnergyHandler, EnergyNode};
use voltaic_core::serialize::{DeserializeError, PersistedNode, SerializeError, SnapshotHeader};
use voltaic_core::unit::EnergyType;
use voltaic_spatial::{BlockPos, ConnectivityGraph, RegionPos, components_of};

use crate::dirty::PendingSplits;
use crate::error::RegistryError;
use crate::id::NetworkId;
use crate::network::EnergyNetwork;
use crate::registry::NetworkRegistry;

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// Per-network identity for hosts that keep their own save format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedNetwork {
    pub network_id: NetworkId,
    pub energy_type: EnergyType,
    pub transfer_rate_cap: Energy,
    pub member_positions: Vec<BlockPos>,
}

/// The serializable portion of the registry. Events are not persisted and
/// the ownership map and graph are recomputed on load.
#[derive(Debug, Serialize, Deserialize)]
struct RegistrySnapshot {
    header: SnapshotHeader,
    config: EnergyConfig,
    networks: SlotMap<NetworkId, EnergyNetwork>,
    inactive_regions: Vec<RegionPos>,
    pending_splits: Vec<NetworkId>,
}

// ---------------------------------------------------------------------------
// Registry persistence methods
// ---------------------------------------------------------------------------

impl NetworkRegistry {
    /// Serialize the registry to a binary blob via bitcode.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = RegistrySnapshot {
            header: SnapshotHeader::new(self.last_tick),
            config: self.config.clone(),
            networks: self.networks.clone(),
            inactive_regions: self.inactive_regions.iter().copied().collect(),
            pending_splits: self.pending.pending(),
        };
        bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Deserialize a registry from a blob produced by [`serialize`](Self::serialize).
    ///
    /// The header is validated and the decoded state is checked for
    /// ownership and connectivity before it is returned.
    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializeError> {
        let snapshot: RegistrySnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;

        let mut owners = BTreeMap::new();
        for (id, network) in &snapshot.networks {
            if network.id() != id {
                return Err(DeserializeError::Inconsistent(format!(
                    "network stored under {id:?} claims id {:?}",
                    network.id()
                )));
            }
            for pos in network.positions() {
                if owners.insert(pos, id).is_some() {
                    return Err(DeserializeError::Inconsistent(format!(
                        "position {pos} belongs to more than one network"
                    )));
                }
            }
        }

        let mut pending = PendingSplits::new();
        for id in snapshot.pending_splits {
            if snapshot.networks.contains_key(id) {
                pending.mark(id);
            }
        }

        let mut registry = NetworkRegistry {
            config: snapshot.config,
            graph: ConnectivityGraph::from_positions(owners.keys().copied()),
            owners,
            networks: snapshot.networks,
            inactive_regions: snapshot.inactive_regions.into_iter().collect(),
            pending,
            events: Vec::new(),
            last_tick: snapshot.header.tick,
        };
        // Activity is derived from the regions, never from the stored state.
        registry.recount_activity();
        registry.check_invariants().map_err(|detail| {
            tracing::warn!(%detail, "rejecting inconsistent snapshot");
            DeserializeError::Inconsistent(detail)
        })?;

        tracing::debug!(
            networks = registry.network_count(),
            nodes = registry.node_count(),
            tick = registry.last_tick,
            "registry restored"
        );
        Ok(registry)
    }

    /// Rebuild networks from node records alone.
    ///
    /// Positions are grouped by face adjacency; each component becomes one
    /// network with the configured default cap. Fails if two records share
    /// a position or a component mixes energy types.
    pub fn rebuild<I>(nodes: I, config: EnergyConfig) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = PersistedNode<BlockPos>>,
    {
        let mut by_pos: BTreeMap<BlockPos, EnergyNode> = BTreeMap::new();
        for record in nodes {
            if by_pos.insert(record.position, record.to_node()).is_some() {
                return Err(RegistryError::PositionOccupied(record.position));
            }
        }

        let mut registry = NetworkRegistry::with_config(config);
        let cap = registry.config.network.default_transfer_rate_cap;

        for component in components_of(by_pos.keys()) {
            let Some(first) = component.first().and_then(|pos| by_pos.get(pos)) else {
                continue;
            };
            let energy_type = first.energy_type();
            let id = registry
                .networks
                .insert_with_key(|id| EnergyNetwork::new(id, energy_type, cap));
            for pos in component {
                let Some(node) = by_pos.remove(&pos) else {
                    continue;
                };
                registry.networks[id].insert(pos, node)?;
                registry.owners.insert(pos, id);
                registry
                    .graph
                    .insert(pos)
                    .map_err(|_| RegistryError::PositionOccupied(pos))?;
            }
        }

        tracing::debug!(
            networks = registry.network_count(),
            nodes = registry.node_count(),
            "registry rebuilt from node records"
        );
        Ok(registry)
    }

    /// Restore caps from persisted network records. A rebuilt network takes
    /// the largest cap among the records whose members it now holds.
    pub fn apply_persisted_caps(&mut self, records: &[PersistedNetwork]) {
        let mut caps: BTreeMap<NetworkId, Energy> = BTreeMap::new();
        for record in records {
            for pos in &record.member_positions {
                if let Some(&id) = self.owners.get(pos) {
                    let entry = caps.entry(id).or_insert(record.transfer_rate_cap);
                    *entry = (*entry).max(record.transfer_rate_cap);
                }
            }
        }
        for (id, cap) in caps {
            if let Some(network) = self.networks.get_mut(id) {
                network.set_transfer_rate_cap(cap);
            }
        }
    }

    /// Every node as a persistable record, in position order.
    pub fn persisted_nodes(&self) -> Vec<PersistedNode<BlockPos>> {
        self.owners
            .keys()
            .filter_map(|&pos| self.node(pos).map(|node| PersistedNode::from_node(pos, node)))
            .collect()
    }

    /// Every network as a persistable record, in slot order.
    pub fn persisted_networks(&self) -> Vec<PersistedNetwork> {
        self.networks
            .iter()
            .map(|(id, network)| PersistedNetwork {
                network_id: id,
                energy_type: network.energy_type(),
                transfer_rate_cap: network.transfer_rate_cap(),
                member_positions: network.positions().collect(),
            })
            .collect()
    }
}
