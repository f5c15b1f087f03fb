//! The registry that owns every network and keeps membership in step with
//! the grid.
//!
//! # Structural changes
//!
//! - **Add**: a node with no occupied neighbours founds a new network. A
//!   node touching one network joins it. A node touching several merges them
//!   first: the network with the most members survives (ties go to the
//!   lowest id), the others are folded into it, and the survivor takes the
//!   largest transfer-rate cap among them.
//! - **Remove**: the node leaves its network. An emptied network is
//!   destroyed. If the removal disconnects the network, it is replaced by
//!   one fresh network per component, each keeping the original cap.
//!
//! # Activity
//!
//! The host reports regions as active or inactive. A network with any
//! member in an inactive region is not ticked. Each network counts its
//! members in inactive regions, so membership changes only look at the
//! position that changed. With
//! `defer_inactive_splits`, removals inside inactive networks leave the
//! network marked instead of splitting it; the split runs as soon as the
//! network becomes active again, or on [`NetworkRegistry::flush_deferred_splits`].

use std::collections::{BTreeMap, BTreeSet};

use slotmap::SlotMap;
use voltaic_core::config::EnergyConfig;
use voltaic_core::fixed::{Energy, Ticks};
use voltaic_core::node::{EnergyHandler, EnergyNode};
use voltaic_core::transfer::{EnergyTransferResult, TransferStatus};
use voltaic_core::unit::EnergyType;
use voltaic_spatial::{BlockPos, ConnectivityGraph, RegionPos, component_containing_in, components_of};

use crate::dirty::PendingSplits;
use crate::error::RegistryError;
use crate::event::NetworkEvent;
use crate::id::{NetworkId, NetworkState};
use crate::network::EnergyNetwork;

// ---------------------------------------------------------------------------
// NetworkRegistry
// ---------------------------------------------------------------------------

/// Owns all networks of one simulation session.
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    pub(crate) config: EnergyConfig,
    pub(crate) networks: SlotMap<NetworkId, EnergyNetwork>,
    pub(crate) owners: BTreeMap<BlockPos, NetworkId>,
    pub(crate) graph: ConnectivityGraph,
    pub(crate) inactive_regions: BTreeSet<RegionPos>,
    pub(crate) pending: PendingSplits,
    pub(crate) events: Vec<NetworkEvent>,
    pub(crate) last_tick: Ticks,
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkRegistry {
    /// Create an empty registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EnergyConfig::default())
    }

    pub fn with_config(config: EnergyConfig) -> Self {
        Self {
            config,
            networks: SlotMap::with_key(),
            owners: BTreeMap::new(),
            graph: ConnectivityGraph::new(),
            inactive_regions: BTreeSet::new(),
            pending: PendingSplits::new(),
            events: Vec::new(),
            last_tick: 0,
        }
    }

    pub fn config(&self) -> &EnergyConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The network owning `pos`, if any.
    pub fn network_at(&self, pos: BlockPos) -> Option<NetworkId> {
        self.owners.get(&pos).copied()
    }

    pub fn network(&self, id: NetworkId) -> Option<&EnergyNetwork> {
        self.networks.get(id)
    }

    /// All networks in slot order.
    pub fn networks(&self) -> impl Iterator<Item = (NetworkId, &EnergyNetwork)> + '_ {
        self.networks.iter()
    }

    pub fn node(&self, pos: BlockPos) -> Option<&EnergyNode> {
        let id = self.owners.get(&pos)?;
        self.networks.get(*id)?.node(pos)
    }

    /// Mutable access to a node's buffer. Position and energy type cannot be
    /// changed through it.
    pub fn node_mut(&mut self, pos: BlockPos) -> Option<&mut EnergyNode> {
        let id = *self.owners.get(&pos)?;
        self.networks.get_mut(id)?.node_mut(pos)
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    pub fn node_count(&self) -> usize {
        self.owners.len()
    }

    /// Whether `id` is waiting for a deferred split.
    pub fn is_split_pending(&self, id: NetworkId) -> bool {
        self.pending.is_pending(id)
    }

    pub fn is_region_active(&self, region: RegionPos) -> bool {
        !self.inactive_regions.contains(&region)
    }

    fn in_inactive_region(&self, pos: BlockPos) -> bool {
        self.inactive_regions.contains(&pos.region())
    }

    /// Tick passed to the most recent [`tick`](Self::tick).
    pub fn last_tick(&self) -> Ticks {
        self.last_tick
    }

    /// Take all buffered structural events, oldest first.
    pub fn drain_events(&mut self) -> Vec<NetworkEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn set_transfer_rate_cap(&mut self, id: NetworkId, cap: Energy) -> Result<(), RegistryError> {
        let network = self.networks.get_mut(id).ok_or(RegistryError::NetworkNotFound)?;
        network.set_transfer_rate_cap(cap);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Add
    // -----------------------------------------------------------------------

    /// Register a node at `pos`. Returns the id of the network it joined.
    ///
    /// Rejected, with nothing changed, if `pos` is occupied or if any
    /// adjacent network carries a different energy type.
    pub fn add_node(&mut self, pos: BlockPos, node: EnergyNode) -> Result<NetworkId, RegistryError> {
        if self.owners.contains_key(&pos) {
            return Err(RegistryError::PositionOccupied(pos));
        }

        let mut adjacent: Vec<NetworkId> = Vec::new();
        for neighbor in self.graph.neighbors_of(pos) {
            if let Some(&id) = self.owners.get(&neighbor) {
                if !adjacent.contains(&id) {
                    adjacent.push(id);
                }
            }
        }
        for &id in &adjacent {
            let expected = self.networks[id].energy_type();
            if expected != node.energy_type() {
                return Err(RegistryError::IncompatibleEnergyType {
                    expected,
                    found: node.energy_type(),
                });
            }
        }

        let default_cap = self.config.network.default_transfer_rate_cap;
        let id = match adjacent.len() {
            0 => self.create_network(node.energy_type(), default_cap),
            1 => adjacent[0],
            _ => self.merge(adjacent),
        };

        self.networks[id].insert(pos, node)?;
        if self.in_inactive_region(pos) {
            let network = &mut self.networks[id];
            network.set_inactive_members(network.inactive_members() + 1);
        }
        self.owners.insert(pos, id);
        self.graph
            .insert(pos)
            .map_err(|_| RegistryError::PositionOccupied(pos))?;

        self.refresh_state(id);
        Ok(id)
    }

    fn create_network(&mut self, energy_type: EnergyType, cap: Energy) -> NetworkId {
        let id = self
            .networks
            .insert_with_key(|id| EnergyNetwork::new(id, energy_type, cap));
        tracing::debug!(network = ?id, %energy_type, cap, "network created");
        self.events.push(NetworkEvent::Created { network: id });
        id
    }

    /// Fold `ids` into the largest of them. Returns the survivor.
    fn merge(&mut self, mut ids: Vec<NetworkId>) -> NetworkId {
        ids.sort();
        let mut survivor = ids[0];
        for &id in &ids[1..] {
            if self.networks[id].len() > self.networks[survivor].len() {
                survivor = id;
            }
        }

        let mut absorbed = Vec::with_capacity(ids.len() - 1);
        for id in ids {
            if id == survivor {
                continue;
            }
            let Some(other) = self.networks.remove(id) else {
                continue;
            };
            for pos in other.positions() {
                self.owners.insert(pos, survivor);
            }
            self.pending.transfer(id, survivor);
            self.networks[survivor].absorb(other);
            absorbed.push(id);
        }

        tracing::debug!(
            network = ?survivor,
            absorbed = absorbed.len(),
            nodes = self.networks[survivor].len(),
            cap = self.networks[survivor].transfer_rate_cap(),
            "networks merged"
        );
        self.events.push(NetworkEvent::Merged { survivor, absorbed });
        survivor
    }

    // -----------------------------------------------------------------------
    // Remove
    // -----------------------------------------------------------------------

    /// Unregister the node at `pos` and return its buffer.
    pub fn remove_node(&mut self, pos: BlockPos) -> Result<EnergyNode, RegistryError> {
        let id = *self.owners.get(&pos).ok_or(RegistryError::NodeNotFound(pos))?;

        // Component analysis needs the node still present in the graph.
        let components = self.graph.components_after_removal(pos);

        let was_inactive_member = self.in_inactive_region(pos);
        let network = self.networks.get_mut(id).ok_or(RegistryError::NetworkNotFound)?;
        let node = network.remove(pos).ok_or(RegistryError::NodeNotFound(pos))?;
        if was_inactive_member {
            network.set_inactive_members(network.inactive_members().saturating_sub(1));
        }
        let emptied = network.is_empty();
        let inactive = !network.is_active();
        self.owners.remove(&pos);
        self.graph
            .remove(pos)
            .map_err(|_| RegistryError::NodeNotFound(pos))?;

        if emptied {
            self.networks.remove(id);
            self.pending.clear(id);
            tracing::debug!(network = ?id, "network destroyed");
            self.events.push(NetworkEvent::Destroyed { network: id });
            return Ok(node);
        }

        if self.pending.is_pending(id) {
            // Already stale; the deferred split recounts everything.
        } else if components.len() > 1 {
            if inactive && self.config.network.defer_inactive_splits {
                tracing::debug!(network = ?id, parts = components.len(), "split deferred");
                self.pending.mark(id);
            } else {
                self.split(id, components);
                return Ok(node);
            }
        }

        self.refresh_state(id);
        Ok(node)
    }

    /// Replace `id` with one network per component. Returns the new ids, or
    /// `[id]` if there is nothing to split.
    ///
    /// Parts start in the state their members imply. They are announced by
    /// the `Split` event alone.
    fn split(&mut self, id: NetworkId, components: Vec<BTreeSet<BlockPos>>) -> Vec<NetworkId> {
        self.pending.clear(id);
        if components.len() <= 1 {
            return vec![id];
        }
        let Some(original) = self.networks.remove(id) else {
            return Vec::new();
        };
        let energy_type = original.energy_type();
        let cap = original.transfer_rate_cap();

        let mut parts: Vec<NetworkId> = components
            .iter()
            .map(|_| {
                self.networks
                    .insert_with_key(|part| EnergyNetwork::new(part, energy_type, cap))
            })
            .collect();

        for (pos, node) in original.into_nodes() {
            let part = match components.iter().position(|c| c.contains(&pos)) {
                Some(slot) => parts[slot],
                None => {
                    // Every member lies in some component by construction.
                    tracing::warn!(network = ?id, %pos, "node outside every component; founding its own network");
                    let lone = self
                        .networks
                        .insert_with_key(|lone| EnergyNetwork::new(lone, energy_type, cap));
                    parts.push(lone);
                    lone
                }
            };
            let inactive = self.in_inactive_region(pos);
            let network = &mut self.networks[part];
            // Same type and fresh position: cannot fail.
            let _ = network.insert(pos, node);
            if inactive {
                network.set_inactive_members(network.inactive_members() + 1);
            }
            self.owners.insert(pos, part);
        }
        for &part in &parts {
            let network = &mut self.networks[part];
            network.set_state(network.derived_state());
        }

        tracing::debug!(network = ?id, parts = parts.len(), "network split");
        self.events.push(NetworkEvent::Split {
            original: id,
            parts: parts.clone(),
        });
        parts
    }

    /// Run every deferred split now, regardless of activity. Returns the
    /// number of networks that actually fell apart.
    pub fn flush_deferred_splits(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let mut split = 0;
        for id in self.pending.pending() {
            if self.run_deferred_split(id) > 1 {
                split += 1;
            }
        }
        split
    }

    /// Recount the components of a marked network and split it. Returns the
    /// number of resulting networks.
    fn run_deferred_split(&mut self, id: NetworkId) -> usize {
        let Some(network) = self.networks.get(id) else {
            self.pending.clear(id);
            return 0;
        };
        let positions: Vec<BlockPos> = network.positions().collect();
        let components = components_of(&positions);
        tracing::debug!(network = ?id, parts = components.len(), "running deferred split");
        self.split(id, components).len()
    }

    // -----------------------------------------------------------------------
    // Activity
    // -----------------------------------------------------------------------

    /// Host hint that `region` became active or inactive.
    ///
    /// Networks touching the region are re-evaluated. A network that comes
    /// back to life with a deferred split is split immediately.
    pub fn on_connectivity_hint(&mut self, region: RegionPos, active: bool) {
        let changed = if active {
            self.inactive_regions.remove(&region)
        } else {
            self.inactive_regions.insert(region)
        };
        if !changed {
            return;
        }
        tracing::debug!(?region, active, "region activity changed");

        let (min_x, max_x) = region.x_bounds();
        // One entry per member in the region.
        let members: Vec<NetworkId> = self
            .owners
            .range(BlockPos::new(min_x, i32::MIN, i32::MIN)..=BlockPos::new(max_x, i32::MAX, i32::MAX))
            .filter(|(pos, _)| region.contains(**pos))
            .map(|(_, id)| *id)
            .collect();

        let mut affected = BTreeSet::new();
        for id in members {
            if let Some(network) = self.networks.get_mut(id) {
                let count = if active {
                    network.inactive_members().saturating_sub(1)
                } else {
                    network.inactive_members() + 1
                };
                network.set_inactive_members(count);
                affected.insert(id);
            }
        }
        for id in affected {
            self.refresh_state(id);
        }
    }

    /// Recount every network's inactive members from scratch and bring its
    /// state in line. Transition events raised on the way are dropped.
    pub(crate) fn recount_activity(&mut self) {
        let ids: Vec<NetworkId> = self.networks.keys().collect();
        for &id in &ids {
            let count = self.networks[id]
                .positions()
                .filter(|pos| self.in_inactive_region(*pos))
                .count();
            self.networks[id].set_inactive_members(count);
        }
        for id in ids {
            self.refresh_state(id);
        }
        self.events.clear();
    }

    /// Recompute `id`'s state from its inactive member count. Emits a
    /// transition event and runs a deferred split if the network became
    /// active.
    fn refresh_state(&mut self, id: NetworkId) {
        let Some(network) = self.networks.get(id) else {
            return;
        };
        let state = network.derived_state();
        let previous = network.state();

        if state != previous {
            self.networks[id].set_state(state);
            match state {
                NetworkState::Active => {
                    tracing::debug!(network = ?id, "network activated");
                    self.events.push(NetworkEvent::Activated { network: id });
                }
                NetworkState::Inactive => {
                    tracing::debug!(network = ?id, "network deactivated");
                    self.events.push(NetworkEvent::Deactivated { network: id });
                }
            }
        }

        if state.is_active() && self.pending.is_pending(id) {
            self.run_deferred_split(id);
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Run one distribution pass on every active network, in slot order.
    pub fn tick(&mut self, current_tick: Ticks) -> Vec<(NetworkId, EnergyTransferResult)> {
        self.last_tick = current_tick;
        let results: Vec<_> = self
            .networks
            .iter_mut()
            .filter(|(_, network)| network.is_active())
            .map(|(id, network)| (id, network.tick()))
            .collect();
        tracing::trace!(tick = current_tick, networks = results.len(), "registry tick");
        results
    }

    /// [`tick`](Self::tick) with networks distributed across the rayon pool.
    ///
    /// Networks share no nodes, so the results are identical to the
    /// sequential tick and come back in the same order.
    #[cfg(feature = "parallel")]
    pub fn tick_parallel(&mut self, current_tick: Ticks) -> Vec<(NetworkId, EnergyTransferResult)> {
        use rayon::prelude::*;

        self.last_tick = current_tick;
        let active: Vec<(NetworkId, &mut EnergyNetwork)> = self
            .networks
            .iter_mut()
            .filter(|(_, network)| network.is_active())
            .collect();
        let results: Vec<_> = active
            .into_par_iter()
            .map(|(id, network)| (id, network.tick()))
            .collect();
        tracing::trace!(tick = current_tick, networks = results.len(), "registry tick (parallel)");
        results
    }

    /// Point-to-point transfer between two connected members.
    ///
    /// Nodes in inactive regions take no part. While a split is deferred the
    /// two nodes must still be reachable from each other.
    pub fn transfer_energy(
        &mut self,
        source: BlockPos,
        destination: BlockPos,
        amount: Energy,
        simulate: bool,
    ) -> EnergyTransferResult {
        let Some(&id) = self.owners.get(&source) else {
            return EnergyTransferResult::failure(
                TransferStatus::InvalidSource,
                format!("no node at {source}"),
            );
        };
        match self.owners.get(&destination) {
            None => {
                return EnergyTransferResult::failure(
                    TransferStatus::InvalidDestination,
                    format!("no node at {destination}"),
                );
            }
            Some(&other) if other != id => {
                return EnergyTransferResult::failure(
                    TransferStatus::InvalidDestination,
                    format!("{destination} is not connected to {source}"),
                );
            }
            Some(_) => {}
        }
        if self.in_inactive_region(source) {
            return EnergyTransferResult::failure(
                TransferStatus::InvalidSource,
                format!("{source} lies in an inactive region"),
            );
        }
        if self.in_inactive_region(destination) {
            return EnergyTransferResult::failure(
                TransferStatus::InvalidDestination,
                format!("{destination} lies in an inactive region"),
            );
        }

        let pending = self.pending.is_pending(id);
        let Some(network) = self.networks.get_mut(id) else {
            return EnergyTransferResult::failure(
                TransferStatus::UnknownError,
                "owning network is missing",
            );
        };
        if pending && !component_containing_in(source, |p| network.contains(*p)).contains(&destination) {
            return EnergyTransferResult::failure(
                TransferStatus::InvalidDestination,
                format!("{destination} is not connected to {source}"),
            );
        }
        network.transfer_energy(source, destination, amount, simulate)
    }

    /// Push up to `amount` (native unit) into network `id`, split evenly
    /// over its receiving members in active regions. Returns the native
    /// amount accepted.
    pub fn insert_energy(&mut self, id: NetworkId, amount: Energy, simulate: bool) -> Result<Energy, RegistryError> {
        let inactive = &self.inactive_regions;
        let network = self.networks.get_mut(id).ok_or(RegistryError::NetworkNotFound)?;
        Ok(network.insert_energy_where(amount, simulate, |pos| !inactive.contains(&pos.region())))
    }

    /// Pull up to `amount` (native unit) out of network `id`, split evenly
    /// over its extracting members in active regions. Returns the native
    /// amount released.
    pub fn extract_energy(&mut self, id: NetworkId, amount: Energy, simulate: bool) -> Result<Energy, RegistryError> {
        let inactive = &self.inactive_regions;
        let network = self.networks.get_mut(id).ok_or(RegistryError::NetworkNotFound)?;
        Ok(network.extract_energy_where(amount, simulate, |pos| !inactive.contains(&pos.region())))
    }

    // -----------------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------------

    /// Verify ownership, connectivity, and node bounds. Returns a description
    /// of the first violation found.
    ///
    /// Networks with a deferred split are exempt from the connectivity check.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.graph.len() != self.owners.len() {
            return Err(format!(
                "graph holds {} positions but {} are owned",
                self.graph.len(),
                self.owners.len()
            ));
        }

        let mut seen = 0usize;
        for (id, network) in &self.networks {
            if network.id() != id {
                return Err(format!("network {id:?} carries id {:?}", network.id()));
            }
            if network.is_empty() {
                return Err(format!("network {id:?} is empty"));
            }
            if !network.index_is_consistent() {
                return Err(format!("network {id:?} has a stale position index"));
            }
            for (pos, node) in network.nodes() {
                if self.owners.get(&pos) != Some(&id) {
                    return Err(format!("{pos} in network {id:?} is not owned by it"));
                }
                if !self.graph.contains(pos) {
                    return Err(format!("{pos} in network {id:?} is missing from the graph"));
                }
                if node.stored() > node.capacity() {
                    return Err(format!("node at {pos} stores more than its capacity"));
                }
                if node.energy_type() != network.energy_type() {
                    return Err(format!("node at {pos} has the wrong energy type"));
                }
            }
            seen += network.len();

            let inactive = network.positions().filter(|pos| self.in_inactive_region(*pos)).count();
            if network.inactive_members() != inactive {
                return Err(format!(
                    "network {id:?} counts {} inactive members but has {inactive}",
                    network.inactive_members()
                ));
            }
            if network.state() != network.derived_state() {
                return Err(format!("network {id:?} is {:?} against its members' regions", network.state()));
            }

            if !self.pending.is_pending(id) {
                let start = network.positions().next();
                if let Some(start) = start {
                    let reach = component_containing_in(start, |p| network.contains(*p));
                    if reach.len() != network.len() {
                        return Err(format!("network {id:?} is not connected"));
                    }
                }
            }
        }

        if seen != self.owners.len() {
            return Err(format!(
                "networks hold {seen} nodes but {} positions are owned",
                self.owners.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voltaic_core::test_utils::*;

    fn p(x: i32, y: i32, z: i32) -> BlockPos {
        BlockPos::new(x, y, z)
    }

    fn stored(registry: &NetworkRegistry, pos: BlockPos) -> Energy {
        registry.node(pos).map(|n| n.stored()).unwrap_or_default()
    }

    // ---- Test 1: add ------------------------------------------------------

    #[test]
    fn isolated_node_creates_network() {
        let mut registry = NetworkRegistry::new();
        let id = registry.add_node(p(0, 0, 0), make_cell(0, 100)).unwrap();
        assert_eq!(registry.network_count(), 1);
        assert_eq!(registry.network_at(p(0, 0, 0)), Some(id));
        assert_eq!(registry.network(id).unwrap().transfer_rate_cap(), 1000);
        assert_eq!(registry.drain_events(), vec![NetworkEvent::Created { network: id }]);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn adjacent_node_joins_existing() {
        let mut registry = NetworkRegistry::new();
        let a = registry.add_node(p(0, 0, 0), make_cell(0, 100)).unwrap();
        let b = registry.add_node(p(0, 1, 0), make_cell(0, 100)).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.network_count(), 1);
        assert_eq!(registry.network(a).unwrap().len(), 2);
    }

    #[test]
    fn diagonal_node_is_separate() {
        let mut registry = NetworkRegistry::new();
        let a = registry.add_node(p(0, 0, 0), make_cell(0, 100)).unwrap();
        let b = registry.add_node(p(1, 1, 0), make_cell(0, 100)).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.network_count(), 2);
    }

    #[test]
    fn occupied_position_is_rejected_without_change() {
        let mut registry = NetworkRegistry::new();
        registry.add_node(p(0, 0, 0), make_cell(40, 100)).unwrap();
        registry.drain_events();

        let err = registry.add_node(p(0, 0, 0), make_cell(99, 100)).unwrap_err();
        assert_eq!(err, RegistryError::PositionOccupied(p(0, 0, 0)));
        assert_eq!(stored(&registry, p(0, 0, 0)), 40);
        assert_eq!(registry.node_count(), 1);
        assert!(registry.drain_events().is_empty());
    }

    #[test]
    fn incompatible_neighbor_is_rejected() {
        let mut registry = NetworkRegistry::new();
        registry.add_node(p(0, 0, 0), make_cell(0, 100)).unwrap();
        let err = registry
            .add_node(p(1, 0, 0), make_typed_cell(0, 100, EnergyType::Steam))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::IncompatibleEnergyType {
                expected: EnergyType::Electrical,
                found: EnergyType::Steam,
            }
        );
        assert_eq!(registry.node_count(), 1);
        assert!(registry.node(p(1, 0, 0)).is_none());
        registry.check_invariants().unwrap();
    }

    // ---- Test 2: merge ----------------------------------------------------

    #[test]
    fn bridge_merges_with_max_cap() {
        let mut registry = NetworkRegistry::new();
        let a = registry.add_node(p(0, 0, 0), make_cell(100, 100)).unwrap();
        let b = registry.add_node(p(2, 0, 0), make_cell(50, 50)).unwrap();
        registry.set_transfer_rate_cap(a, 100).unwrap();
        registry.set_transfer_rate_cap(b, 50).unwrap();
        registry.drain_events();

        let merged = registry.add_node(p(1, 0, 0), make_cell(0, 10)).unwrap();
        assert_eq!(registry.network_count(), 1);
        let network = registry.network(merged).unwrap();
        assert_eq!(network.transfer_rate_cap(), 100);
        assert!(network.contains(p(0, 0, 0)));
        assert!(network.contains(p(2, 0, 0)));
        assert_eq!(network.len(), 3);
        assert_eq!(stored(&registry, p(0, 0, 0)), 100);
        assert_eq!(stored(&registry, p(2, 0, 0)), 50);

        let events = registry.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], NetworkEvent::Merged { absorbed, .. } if absorbed.len() == 1));
        registry.check_invariants().unwrap();
    }

    #[test]
    fn larger_network_survives_merge() {
        let mut registry = NetworkRegistry::new();
        registry.add_node(p(0, 0, 0), make_cell(0, 10)).unwrap();
        let big = registry.add_node(p(2, 0, 0), make_cell(0, 10)).unwrap();
        registry.add_node(p(3, 0, 0), make_cell(0, 10)).unwrap();

        let merged = registry.add_node(p(1, 0, 0), make_cell(0, 10)).unwrap();
        assert_eq!(merged, big);
    }

    #[test]
    fn hub_merges_four_networks() {
        let mut registry = NetworkRegistry::new();
        for pos in [p(1, 0, 0), p(-1, 0, 0), p(0, 1, 0), p(0, 0, 1)] {
            registry.add_node(pos, make_cell(0, 10)).unwrap();
        }
        assert_eq!(registry.network_count(), 4);
        registry.add_node(p(0, 0, 0), make_cell(0, 10)).unwrap();
        assert_eq!(registry.network_count(), 1);
        assert_eq!(registry.node_count(), 5);
        registry.check_invariants().unwrap();
    }

    // ---- Test 3: remove and split -----------------------------------------

    #[test]
    fn removing_middle_of_line_splits() {
        let mut registry = NetworkRegistry::new();
        let original = registry.add_node(p(0, 0, 0), make_cell(10, 100)).unwrap();
        registry.add_node(p(1, 0, 0), make_cell(20, 100)).unwrap();
        registry.add_node(p(2, 0, 0), make_cell(30, 100)).unwrap();
        registry.set_transfer_rate_cap(original, 77).unwrap();
        registry.drain_events();

        let removed = registry.remove_node(p(1, 0, 0)).unwrap();
        assert_eq!(removed.stored(), 20);
        assert_eq!(registry.network_count(), 2);
        assert!(registry.network(original).is_none());

        let left = registry.network_at(p(0, 0, 0)).unwrap();
        let right = registry.network_at(p(2, 0, 0)).unwrap();
        assert_ne!(left, right);
        assert_eq!(registry.network(left).unwrap().len(), 1);
        assert_eq!(registry.network(right).unwrap().len(), 1);
        assert_eq!(registry.network(left).unwrap().transfer_rate_cap(), 77);
        assert_eq!(registry.network(right).unwrap().transfer_rate_cap(), 77);
        assert_eq!(stored(&registry, p(0, 0, 0)), 10);
        assert_eq!(stored(&registry, p(2, 0, 0)), 30);

        let events = registry.drain_events();
        assert!(matches!(&events[..], [NetworkEvent::Split { original: o, parts }] if *o == original && parts.len() == 2));
        registry.check_invariants().unwrap();
    }

    #[test]
    fn removing_end_keeps_network() {
        let mut registry = NetworkRegistry::new();
        let id = registry.add_node(p(0, 0, 0), make_cell(0, 100)).unwrap();
        registry.add_node(p(1, 0, 0), make_cell(0, 100)).unwrap();
        registry.remove_node(p(1, 0, 0)).unwrap();
        assert_eq!(registry.network_at(p(0, 0, 0)), Some(id));
        assert_eq!(registry.network_count(), 1);
    }

    #[test]
    fn removing_last_node_destroys_network() {
        let mut registry = NetworkRegistry::new();
        let id = registry.add_node(p(0, 0, 0), make_cell(0, 100)).unwrap();
        registry.drain_events();
        registry.remove_node(p(0, 0, 0)).unwrap();
        assert_eq!(registry.network_count(), 0);
        assert_eq!(registry.drain_events(), vec![NetworkEvent::Destroyed { network: id }]);
    }

    #[test]
    fn removing_missing_node_is_rejected() {
        let mut registry = NetworkRegistry::new();
        assert_eq!(
            registry.remove_node(p(0, 0, 0)).unwrap_err(),
            RegistryError::NodeNotFound(p(0, 0, 0))
        );
    }

    // ---- Test 4: activity hints -------------------------------------------

    #[test]
    fn inactive_network_is_not_ticked() {
        let mut registry = NetworkRegistry::new();
        let id = registry.add_node(p(0, 0, 0), make_provider(50, 50)).unwrap();
        registry.add_node(p(1, 0, 0), make_consumer(100, 100)).unwrap();
        registry.drain_events();

        registry.on_connectivity_hint(RegionPos::new(0, 0), false);
        assert_eq!(registry.network(id).unwrap().state(), NetworkState::Inactive);
        assert!(registry.tick(1).is_empty());
        assert_eq!(stored(&registry, p(1, 0, 0)), 0);

        registry.on_connectivity_hint(RegionPos::new(0, 0), true);
        let results = registry.tick(2);
        assert_eq!(results.len(), 1);
        assert_eq!(stored(&registry, p(1, 0, 0)), 50);
        assert_eq!(
            registry.drain_events(),
            vec![
                NetworkEvent::Deactivated { network: id },
                NetworkEvent::Activated { network: id },
            ]
        );
    }

    #[test]
    fn network_spanning_regions_is_inactive_if_any_region_is() {
        let mut registry = NetworkRegistry::new();
        let id = registry.add_node(p(15, 0, 0), make_cell(0, 10)).unwrap();
        registry.add_node(p(16, 0, 0), make_cell(0, 10)).unwrap();
        registry.on_connectivity_hint(RegionPos::new(1, 0), false);
        assert!(!registry.network(id).unwrap().is_active());
        registry.on_connectivity_hint(RegionPos::new(0, 0), true);
        assert!(!registry.network(id).unwrap().is_active());
    }

    #[test]
    fn split_is_deferred_until_reactivation() {
        let mut registry = NetworkRegistry::new();
        let id = registry.add_node(p(0, 0, 0), make_cell(0, 100)).unwrap();
        registry.add_node(p(1, 0, 0), make_cell(0, 100)).unwrap();
        registry.add_node(p(2, 0, 0), make_cell(0, 100)).unwrap();

        registry.on_connectivity_hint(RegionPos::new(0, 0), false);
        registry.remove_node(p(1, 0, 0)).unwrap();
        assert!(registry.is_split_pending(id));
        assert_eq!(registry.network_count(), 1);
        assert_eq!(registry.node_count(), 2);
        // Bookkeeping stays consistent while stale.
        registry.check_invariants().unwrap();

        registry.on_connectivity_hint(RegionPos::new(0, 0), true);
        assert!(!registry.is_split_pending(id));
        assert_eq!(registry.network_count(), 2);
        assert!(registry.network(id).is_none());
        assert_eq!(registry.node_count(), 2);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn splits_run_immediately_when_not_deferring() {
        let mut config = EnergyConfig::default();
        config.network.defer_inactive_splits = false;
        let mut registry = NetworkRegistry::with_config(config);
        for x in 0..3 {
            registry.add_node(p(x, 0, 0), make_cell(0, 100)).unwrap();
        }
        registry.on_connectivity_hint(RegionPos::new(0, 0), false);
        registry.remove_node(p(1, 0, 0)).unwrap();
        assert_eq!(registry.network_count(), 2);
        for (_, network) in registry.networks() {
            assert!(!network.is_active());
        }
    }

    #[test]
    fn split_parts_start_in_their_own_state() {
        let mut config = EnergyConfig::default();
        config.network.defer_inactive_splits = false;
        let mut registry = NetworkRegistry::with_config(config);
        for x in 14..19 {
            registry.add_node(p(x, 0, 0), make_cell(0, 100)).unwrap();
        }
        // Only the right half lies in region (1, 0).
        registry.on_connectivity_hint(RegionPos::new(1, 0), false);
        registry.drain_events();

        registry.remove_node(p(15, 0, 0)).unwrap();
        let left = registry.network_at(p(14, 0, 0)).unwrap();
        let right = registry.network_at(p(16, 0, 0)).unwrap();
        assert!(registry.network(left).unwrap().is_active());
        assert!(!registry.network(right).unwrap().is_active());

        let events = registry.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], NetworkEvent::Split { parts, .. } if parts.len() == 2));
        registry.check_invariants().unwrap();
    }

    #[test]
    fn activity_counts_follow_membership() {
        let mut registry = NetworkRegistry::new();
        let id = registry.add_node(p(15, 0, 0), make_cell(0, 10)).unwrap();
        registry.on_connectivity_hint(RegionPos::new(1, 0), false);
        assert!(registry.network(id).unwrap().is_active());

        // Joining from the inactive region pauses the network; leaving
        // resumes it.
        registry.add_node(p(16, 0, 0), make_cell(0, 10)).unwrap();
        assert!(!registry.network(id).unwrap().is_active());
        registry.add_node(p(17, 0, 0), make_cell(0, 10)).unwrap();
        registry.check_invariants().unwrap();

        registry.remove_node(p(17, 0, 0)).unwrap();
        assert!(!registry.network(id).unwrap().is_active());
        registry.remove_node(p(16, 0, 0)).unwrap();
        assert!(registry.network(id).unwrap().is_active());
        registry.check_invariants().unwrap();

        // Hints for regions nobody occupies change nothing.
        registry.on_connectivity_hint(RegionPos::new(5, 5), false);
        assert!(registry.network(id).unwrap().is_active());
        registry.check_invariants().unwrap();
    }

    #[test]
    fn nodes_at_grid_edge_connect() {
        let mut registry = NetworkRegistry::new();
        let a = registry.add_node(p(i32::MAX, 0, 0), make_cell(0, 10)).unwrap();
        let b = registry.add_node(p(i32::MAX - 1, 0, 0), make_cell(0, 10)).unwrap();
        assert_eq!(a, b);
        let c = registry.add_node(p(i32::MIN, i32::MIN, i32::MIN), make_cell(0, 10)).unwrap();
        assert_ne!(a, c);

        registry.on_connectivity_hint(p(i32::MAX, 0, 0).region(), false);
        assert!(!registry.network(a).unwrap().is_active());
        registry.remove_node(p(i32::MAX, 0, 0)).unwrap();
        registry.remove_node(p(i32::MIN, i32::MIN, i32::MIN)).unwrap();
        assert_eq!(registry.node_count(), 1);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn flush_runs_deferred_splits_while_inactive() {
        let mut registry = NetworkRegistry::new();
        for x in 0..5 {
            registry.add_node(p(x, 0, 0), make_cell(0, 100)).unwrap();
        }
        registry.on_connectivity_hint(RegionPos::new(0, 0), false);
        registry.remove_node(p(1, 0, 0)).unwrap();
        registry.remove_node(p(3, 0, 0)).unwrap();

        assert_eq!(registry.flush_deferred_splits(), 1);
        assert_eq!(registry.network_count(), 3);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn merge_with_pending_network_inherits_mark() {
        let mut registry = NetworkRegistry::new();
        let id = registry.add_node(p(0, 0, 0), make_cell(0, 100)).unwrap();
        registry.add_node(p(1, 0, 0), make_cell(0, 100)).unwrap();
        registry.add_node(p(2, 0, 0), make_cell(0, 100)).unwrap();
        registry.on_connectivity_hint(RegionPos::new(0, 0), false);
        registry.remove_node(p(1, 0, 0)).unwrap();
        assert!(registry.is_split_pending(id));

        // A new member joins the stale network and the mark stays.
        registry.add_node(p(2, 1, 0), make_cell(0, 100)).unwrap();
        assert_eq!(registry.network_at(p(2, 1, 0)), Some(id));
        assert!(registry.is_split_pending(id));

        registry.on_connectivity_hint(RegionPos::new(0, 0), true);
        assert_eq!(registry.network_count(), 2);
        assert_eq!(
            registry.network_at(p(2, 0, 0)),
            registry.network_at(p(2, 1, 0))
        );
        registry.check_invariants().unwrap();
    }

    // ---- Test 5: tick and transfer ----------------------------------------

    #[test]
    fn tick_reports_each_active_network() {
        let mut registry = NetworkRegistry::new();
        registry.add_node(p(0, 0, 0), make_provider(90, 90)).unwrap();
        for y in 1..=3 {
            registry.add_node(p(0, y, 0), make_consumer(100, 100)).unwrap();
        }
        registry.add_node(p(10, 0, 0), make_cell(5, 10)).unwrap();

        let results = registry.tick(7);
        assert_eq!(results.len(), 2);
        assert_eq!(registry.last_tick(), 7);
        let total: Energy = results.iter().map(|(_, r)| r.amount_transferred()).sum();
        assert_eq!(total, 90);
        assert!(results.iter().all(|(_, r)| r.status() == TransferStatus::Success));
    }

    #[test]
    fn registry_transfer_requires_same_network() {
        let mut registry = NetworkRegistry::new();
        registry.add_node(p(0, 0, 0), make_cell(100, 100)).unwrap();
        registry.add_node(p(1, 0, 0), make_cell(0, 100)).unwrap();
        registry.add_node(p(5, 0, 0), make_cell(0, 100)).unwrap();

        assert_eq!(
            registry.transfer_energy(p(0, 0, 0), p(5, 0, 0), 10, false).status(),
            TransferStatus::InvalidDestination
        );
        assert_eq!(
            registry.transfer_energy(p(9, 0, 0), p(1, 0, 0), 10, false).status(),
            TransferStatus::InvalidSource
        );
        let ok = registry.transfer_energy(p(0, 0, 0), p(1, 0, 0), 10, false);
        assert_eq!(ok.status(), TransferStatus::Success);
        assert_eq!(stored(&registry, p(1, 0, 0)), 10);
    }

    #[test]
    fn transfer_refuses_inactive_regions() {
        let mut registry = NetworkRegistry::new();
        registry.add_node(p(0, 0, 0), make_cell(100, 100)).unwrap();
        registry.add_node(p(1, 0, 0), make_cell(0, 100)).unwrap();
        registry.add_node(p(2, 0, 0), make_cell(0, 100)).unwrap();
        registry.on_connectivity_hint(RegionPos::new(0, 0), false);
        registry.remove_node(p(1, 0, 0)).unwrap();

        let result = registry.transfer_energy(p(0, 0, 0), p(2, 0, 0), 40, false);
        assert_eq!(result.status(), TransferStatus::InvalidSource);
        assert_eq!(result.amount_transferred(), 0);
        assert_eq!(stored(&registry, p(0, 0, 0)), 100);
        assert_eq!(stored(&registry, p(2, 0, 0)), 0);
    }

    #[test]
    fn transfer_respects_deferred_split() {
        let mut registry = NetworkRegistry::new();
        for x in 12..17 {
            registry.add_node(p(x, 0, 0), make_cell(50, 100)).unwrap();
        }
        // (16, 0, 0) holds the network inactive while (12..16) stay loaded.
        registry.on_connectivity_hint(RegionPos::new(1, 0), false);
        let id = registry.network_at(p(12, 0, 0)).unwrap();
        registry.remove_node(p(14, 0, 0)).unwrap();
        assert!(registry.is_split_pending(id));

        let across = registry.transfer_energy(p(13, 0, 0), p(15, 0, 0), 10, false);
        assert_eq!(across.status(), TransferStatus::InvalidDestination);
        assert_eq!(stored(&registry, p(15, 0, 0)), 50);

        let within = registry.transfer_energy(p(12, 0, 0), p(13, 0, 0), 10, false);
        assert_eq!(within.status(), TransferStatus::Success);
        assert_eq!(stored(&registry, p(13, 0, 0)), 60);
    }

    #[test]
    fn aggregate_storage_skips_inactive_members() {
        let mut registry = NetworkRegistry::new();
        let id = registry.add_node(p(15, 0, 0), make_cell(0, 100)).unwrap();
        registry.add_node(p(16, 0, 0), make_cell(0, 100)).unwrap();
        registry.on_connectivity_hint(RegionPos::new(1, 0), false);

        assert_eq!(registry.insert_energy(id, 30, false), Ok(30));
        assert_eq!(stored(&registry, p(15, 0, 0)), 30);
        assert_eq!(stored(&registry, p(16, 0, 0)), 0);

        registry.on_connectivity_hint(RegionPos::new(1, 0), true);
        assert_eq!(registry.insert_energy(id, 20, false), Ok(20));
        assert_eq!(stored(&registry, p(15, 0, 0)), 40);
        assert_eq!(stored(&registry, p(16, 0, 0)), 10);

        assert_eq!(registry.extract_energy(id, 100, true), Ok(50));
        assert_eq!(registry.extract_energy(id, 100, false), Ok(50));
        assert_eq!(stored(&registry, p(15, 0, 0)), 0);
        assert_eq!(stored(&registry, p(16, 0, 0)), 0);

        registry.remove_node(p(15, 0, 0)).unwrap();
        let gone = registry.network_at(p(16, 0, 0)).unwrap();
        registry.remove_node(p(16, 0, 0)).unwrap();
        assert_eq!(registry.insert_energy(gone, 1, false), Err(RegistryError::NetworkNotFound));
    }

    #[test]
    fn set_cap_on_missing_network() {
        let mut registry = NetworkRegistry::new();
        let id = registry.add_node(p(0, 0, 0), make_cell(0, 1)).unwrap();
        registry.remove_node(p(0, 0, 0)).unwrap();
        assert_eq!(
            registry.set_transfer_rate_cap(id, 5),
            Err(RegistryError::NetworkNotFound)
        );
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_tick_matches_sequential() {
        let mut a = NetworkRegistry::new();
        for i in 0..20 {
            a.add_node(p(i * 3, 0, 0), make_provider(100, 40)).unwrap();
            a.add_node(p(i * 3, 1, 0), make_consumer(100, 100)).unwrap();
        }
        let mut b = a.clone();
        assert_eq!(a.tick(1), b.tick_parallel(1));
        for (_, network) in a.networks() {
            for (pos, node) in network.nodes() {
                assert_eq!(b.node(pos), Some(node));
            }
        }
    }
}
