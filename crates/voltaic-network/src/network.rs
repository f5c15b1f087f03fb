//! A single connected energy network and its per-tick distribution.
//!
//! # Distribution
//!
//! Each tick the network snapshots its providers (can extract, not empty)
//! and consumers (can receive, not full). Providers are then visited in
//! node insertion order. A provider offers `min(stored, transfer_rate_cap)`
//! split evenly over the consumers, at least one unit each, and every pair
//! is planned by simulating both sides before anything is committed. The
//! committed amount is the smaller of the two simulations, so the even-split
//! floor can never push a node past its stored amount, capacity, or rate.
//!
//! Visit order is node insertion order. It is deterministic but otherwise
//! implementation-defined.
//!
//! # Aggregate storage
//!
//! [`EnergyNetwork::insert_energy`] and [`EnergyNetwork::extract_energy`]
//! treat the whole network as one buffer for external generators and
//! consumers. Amounts are in the native unit and are split evenly over the
//! eligible members, the remainder going one unit at a time to the first
//! members in insertion order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use voltaic_core::fixed::{Energy, Fixed64, ratio};
use voltaic_core::node::{EnergyHandler, EnergyNode};
use voltaic_core::transfer::{
    EnergyTransferResult, PlanRejection, TransferStatus, commit_pair, plan_pair, transfer,
};
use voltaic_core::unit::{EnergyType, EnergyUnit, convert};
use voltaic_spatial::BlockPos;

use crate::error::RegistryError;
use crate::id::{NetworkId, NetworkState};

/// Insertion sequence number of a member.
type Seq = u64;

// ---------------------------------------------------------------------------
// EnergyNetwork
// ---------------------------------------------------------------------------

/// A maximal connected set of nodes sharing one energy type.
///
/// Members are keyed by insertion sequence, so iteration follows insertion
/// order and both insert and remove are logarithmic. The network does not
/// check adjacency itself; the registry guarantees that members form one
/// component (except while a split is deferred).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyNetwork {
    id: NetworkId,
    energy_type: EnergyType,
    transfer_rate_cap: Energy,
    state: NetworkState,
    nodes: BTreeMap<Seq, (BlockPos, EnergyNode)>,
    index: BTreeMap<BlockPos, Seq>,
    next_seq: Seq,
    /// Source-unit amount moved by `transfer_energy` since the last tick.
    manual_transferred: Energy,
    /// Members lying in inactive regions. Maintained by the registry and
    /// recomputed on load.
    #[serde(skip)]
    inactive_members: usize,
}

impl EnergyNetwork {
    /// Create an empty, active network.
    pub fn new(id: NetworkId, energy_type: EnergyType, transfer_rate_cap: Energy) -> Self {
        Self {
            id,
            energy_type,
            transfer_rate_cap,
            state: NetworkState::Active,
            nodes: BTreeMap::new(),
            index: BTreeMap::new(),
            next_seq: 0,
            manual_transferred: 0,
            inactive_members: 0,
        }
    }

    // -- Metadata --

    pub fn id(&self) -> NetworkId {
        self.id
    }

    pub fn energy_type(&self) -> EnergyType {
        self.energy_type
    }

    pub fn transfer_rate_cap(&self) -> Energy {
        self.transfer_rate_cap
    }

    pub fn set_transfer_rate_cap(&mut self, cap: Energy) {
        self.transfer_rate_cap = cap;
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub(crate) fn set_state(&mut self, state: NetworkState) {
        self.state = state;
    }

    pub(crate) fn inactive_members(&self) -> usize {
        self.inactive_members
    }

    pub(crate) fn set_inactive_members(&mut self, count: usize) {
        self.inactive_members = count;
    }

    /// State implied by the inactive member count.
    pub(crate) fn derived_state(&self) -> NetworkState {
        if self.inactive_members > 0 {
            NetworkState::Inactive
        } else {
            NetworkState::Active
        }
    }

    // -- Membership --

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.index.contains_key(&pos)
    }

    /// Member positions in insertion order.
    pub fn positions(&self) -> impl Iterator<Item = BlockPos> + '_ {
        self.nodes.values().map(|(pos, _)| *pos)
    }

    /// Members in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (BlockPos, &EnergyNode)> + '_ {
        self.nodes.values().map(|(pos, node)| (*pos, node))
    }

    pub fn node(&self, pos: BlockPos) -> Option<&EnergyNode> {
        let seq = self.index.get(&pos)?;
        self.nodes.get(seq).map(|(_, node)| node)
    }

    pub fn node_mut(&mut self, pos: BlockPos) -> Option<&mut EnergyNode> {
        let seq = self.index.get(&pos)?;
        self.nodes.get_mut(seq).map(|(_, node)| node)
    }

    /// Add a member. Adjacency is the caller's concern.
    pub fn insert(&mut self, pos: BlockPos, node: EnergyNode) -> Result<(), RegistryError> {
        if self.index.contains_key(&pos) {
            return Err(RegistryError::PositionOccupied(pos));
        }
        if node.energy_type() != self.energy_type {
            return Err(RegistryError::IncompatibleEnergyType {
                expected: self.energy_type,
                found: node.energy_type(),
            });
        }
        self.push(pos, node);
        Ok(())
    }

    fn push(&mut self, pos: BlockPos, node: EnergyNode) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(pos, seq);
        self.nodes.insert(seq, (pos, node));
    }

    /// Remove a member, keeping the insertion order of the rest.
    pub fn remove(&mut self, pos: BlockPos) -> Option<EnergyNode> {
        let seq = self.index.remove(&pos)?;
        self.nodes.remove(&seq).map(|(_, node)| node)
    }

    /// Fold `other` into this network. Its nodes are appended in their own
    /// order and the larger of the two caps is kept.
    pub(crate) fn absorb(&mut self, other: EnergyNetwork) {
        self.transfer_rate_cap = self.transfer_rate_cap.max(other.transfer_rate_cap);
        self.inactive_members += other.inactive_members;
        for (pos, node) in other.nodes.into_values() {
            self.push(pos, node);
        }
    }

    /// Consume the network, yielding its members in insertion order.
    pub(crate) fn into_nodes(self) -> Vec<(BlockPos, EnergyNode)> {
        self.nodes.into_values().collect()
    }

    /// Whether the position index agrees with the node map.
    pub(crate) fn index_is_consistent(&self) -> bool {
        self.index.len() == self.nodes.len()
            && self
                .nodes
                .iter()
                .all(|(seq, (pos, _))| self.index.get(pos) == Some(seq) && *seq < self.next_seq)
    }

    // -- Aggregates --

    /// Sum of stored energy, in the native unit.
    pub fn total_energy(&self) -> Energy {
        self.nodes.values().fold(0, |acc: Energy, (_, node)| {
            acc.saturating_add(convert(node.stored(), node.energy_unit(), EnergyUnit::default()))
        })
    }

    /// Sum of capacities, in the native unit.
    pub fn total_capacity(&self) -> Energy {
        self.nodes.values().fold(0, |acc: Energy, (_, node)| {
            acc.saturating_add(convert(node.capacity(), node.energy_unit(), EnergyUnit::default()))
        })
    }

    /// `total_energy / total_capacity` in [0, 1]; zero for an empty network.
    pub fn fill_level(&self) -> Fixed64 {
        ratio(self.total_energy(), self.total_capacity())
    }

    // -----------------------------------------------------------------------
    // Aggregate storage
    // -----------------------------------------------------------------------

    /// Push up to `amount` (native unit) into the members that can receive.
    /// Returns the native amount accepted.
    pub fn insert_energy(&mut self, amount: Energy, simulate: bool) -> Energy {
        self.insert_energy_where(amount, simulate, |_| true)
    }

    /// Pull up to `amount` (native unit) out of the members that can
    /// extract. Returns the native amount released.
    pub fn extract_energy(&mut self, amount: Energy, simulate: bool) -> Energy {
        self.extract_energy_where(amount, simulate, |_| true)
    }

    /// [`insert_energy`](Self::insert_energy) restricted to members at
    /// positions accepted by `eligible`.
    pub(crate) fn insert_energy_where<F>(&mut self, amount: Energy, simulate: bool, eligible: F) -> Energy
    where
        F: Fn(BlockPos) -> bool,
    {
        self.spread(amount, |pos, node| eligible(pos) && node.can_receive(), |node, share| {
            node.receive(share, simulate)
        })
    }

    /// [`extract_energy`](Self::extract_energy) restricted to members at
    /// positions accepted by `eligible`.
    pub(crate) fn extract_energy_where<F>(&mut self, amount: Energy, simulate: bool, eligible: F) -> Energy
    where
        F: Fn(BlockPos) -> bool,
    {
        self.spread(amount, |pos, node| eligible(pos) && node.can_extract(), |node, share| {
            node.extract(share, simulate)
        })
    }

    /// Split `amount` evenly over the selected members and apply `op` to
    /// each. Shares are converted into each member's unit and the results
    /// back into the native unit, rounding down both ways.
    fn spread<S, O>(&mut self, amount: Energy, select: S, mut op: O) -> Energy
    where
        S: Fn(BlockPos, &EnergyNode) -> bool,
        O: FnMut(&mut EnergyNode, Energy) -> Energy,
    {
        let native = EnergyUnit::default();
        let members: Vec<&mut EnergyNode> = self
            .nodes
            .values_mut()
            .filter(|(pos, node)| select(*pos, node))
            .map(|(_, node)| node)
            .collect();
        if amount == 0 || members.is_empty() {
            return 0;
        }

        let count = members.len() as Energy;
        let per_member = amount / count;
        let mut remainder = amount % count;
        let mut moved: Energy = 0;
        for node in members {
            let mut share = per_member;
            if remainder > 0 {
                share += 1;
                remainder -= 1;
            }
            if share == 0 {
                break;
            }
            let unit = node.energy_unit();
            let done = op(node, convert(share, native, unit));
            moved = moved.saturating_add(convert(done, unit, native));
        }
        moved
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Run one distribution pass.
    ///
    /// Always succeeds. The reported amount is the total extracted from
    /// providers, each in its own unit. Also resets the manual transfer
    /// budget.
    pub fn tick(&mut self) -> EnergyTransferResult {
        self.manual_transferred = 0;

        let providers: Vec<Seq> = self
            .nodes
            .iter()
            .filter(|(_, (_, node))| node.can_extract() && node.stored() > 0)
            .map(|(seq, _)| *seq)
            .collect();
        let consumers: Vec<Seq> = self
            .nodes
            .iter()
            .filter(|(_, (_, node))| node.can_receive() && node.stored() < node.capacity())
            .map(|(seq, _)| *seq)
            .collect();

        if providers.is_empty() || consumers.is_empty() {
            tracing::trace!(
                network = ?self.id,
                providers = providers.len(),
                consumers = consumers.len(),
                "nothing to distribute"
            );
            return EnergyTransferResult::success(0);
        }

        let mut transferred: Energy = 0;
        for &provider in &providers {
            transferred = transferred.saturating_add(self.distribute_from(provider, &consumers));
        }

        tracing::trace!(
            network = ?self.id,
            transferred,
            providers = providers.len(),
            consumers = consumers.len(),
            "network tick"
        );
        EnergyTransferResult::success(transferred)
    }

    /// Spread one provider's offer over the consumers. Returns the amount
    /// extracted from the provider.
    fn distribute_from(&mut self, provider: Seq, consumers: &[Seq]) -> Energy {
        // The provider is held outside the map while it is paired.
        let Some((pos, mut source)) = self.nodes.remove(&provider) else {
            return 0;
        };
        let extracted = self.offer(&mut source, provider, consumers);
        self.nodes.insert(provider, (pos, source));
        extracted
    }

    fn offer(&mut self, source: &mut EnergyNode, provider: Seq, consumers: &[Seq]) -> Energy {
        let available = source.stored().min(self.transfer_rate_cap);
        if available == 0 {
            return 0;
        }
        // A node that both gives and takes never feeds itself.
        let targets = consumers.iter().filter(|&&c| c != provider).count() as Energy;
        if targets == 0 {
            return 0;
        }
        let per_consumer = (available / targets).max(1);

        let mut extracted: Energy = 0;
        for consumer in consumers {
            if extracted >= available {
                break;
            }
            let Some((_, destination)) = self.nodes.get_mut(consumer) else {
                continue;
            };
            if destination.is_full() {
                continue;
            }
            let to_transfer = per_consumer.min(available - extracted);
            let plan = match plan_pair(source, destination, to_transfer) {
                Ok(plan) => plan,
                Err(PlanRejection::SourceEmpty) => break,
                Err(_) => continue,
            };
            let commit = commit_pair(source, destination, plan);
            extracted = extracted.saturating_add(commit.extracted);
        }
        extracted
    }

    // -----------------------------------------------------------------------
    // Point-to-point transfer
    // -----------------------------------------------------------------------

    /// Move up to `amount` (source units) between two members.
    ///
    /// Manual transfers share a per-tick budget equal to the network's
    /// transfer-rate cap. The reported amount is what the destination
    /// received, in its own unit.
    pub fn transfer_energy(
        &mut self,
        source: BlockPos,
        destination: BlockPos,
        amount: Energy,
        simulate: bool,
    ) -> EnergyTransferResult {
        let Some(&s) = self.index.get(&source) else {
            return EnergyTransferResult::failure(
                TransferStatus::InvalidSource,
                format!("no node at {source}"),
            );
        };
        let Some(&d) = self.index.get(&destination) else {
            return EnergyTransferResult::failure(
                TransferStatus::InvalidDestination,
                format!("no node at {destination}"),
            );
        };
        if s == d {
            return EnergyTransferResult::failure(
                TransferStatus::InvalidDestination,
                "source and destination are the same node",
            );
        }
        if amount == 0 {
            return EnergyTransferResult::success(0);
        }

        let budget = self.transfer_rate_cap.saturating_sub(self.manual_transferred);
        if budget == 0 {
            return EnergyTransferResult::failure(
                TransferStatus::CapacityExceeded,
                format!(
                    "network transfer cap of {} reached this tick",
                    self.transfer_rate_cap
                ),
            );
        }
        let requested = amount.min(budget);

        let Some((pos, mut src)) = self.nodes.remove(&s) else {
            return EnergyTransferResult::failure(TransferStatus::UnknownError, "member index is stale");
        };
        let before = src.stored();
        let result = match self.nodes.get_mut(&d) {
            Some((_, dst)) => transfer(&mut src, dst, requested, simulate),
            None => EnergyTransferResult::failure(TransferStatus::UnknownError, "member index is stale"),
        };
        let extracted = before.saturating_sub(src.stored());
        self.nodes.insert(s, (pos, src));
        if !simulate {
            self.manual_transferred = self.manual_transferred.saturating_add(extracted);
        }

        if result.status() == TransferStatus::Success && requested < amount {
            return EnergyTransferResult::partial(
                result.amount_transferred(),
                format!("limited by network cap: {requested} of {amount} requested"),
            );
        }
        result
    }

    /// Source-unit amount moved by manual transfers since the last tick.
    pub fn manual_transferred(&self) -> Energy {
        self.manual_transferred
    }
}
