//! Energy buffers and the capability seam shared with host devices.
//!
//! [`EnergyHandler`] is the single capability interface through which the
//! distribution code talks to anything that holds energy. [`EnergyNode`] is
//! the buffer owned by a network; hosts that keep their own state implement
//! the trait on their device type instead.

use serde::{Deserialize, Serialize};

use crate::config::EnergyConfig;
use crate::fixed::{Energy, Fixed64, ratio};
use crate::unit::{EnergyType, EnergyUnit};

// ---------------------------------------------------------------------------
// Capability interface
// ---------------------------------------------------------------------------

/// Anything that can give or accept energy.
///
/// Implementations must never fail: out-of-range requests are clamped and
/// the clamped amount is returned. With `simulate = true` no state changes.
pub trait EnergyHandler {
    /// Accept up to `amount`. Returns the amount accepted.
    fn receive_energy(&mut self, amount: Energy, simulate: bool) -> Energy;

    /// Release up to `amount`. Returns the amount released.
    fn extract_energy(&mut self, amount: Energy, simulate: bool) -> Energy;

    /// Amount currently stored.
    fn energy(&self) -> Energy;

    /// Maximum amount that can be stored.
    fn max_energy(&self) -> Energy;

    fn can_receive(&self) -> bool;

    fn can_extract(&self) -> bool;

    fn energy_type(&self) -> EnergyType;

    fn energy_unit(&self) -> EnergyUnit;

    /// Stored / capacity in [0, 1].
    fn fill_level(&self) -> Fixed64 {
        ratio(self.energy(), self.max_energy())
    }
}

// ---------------------------------------------------------------------------
// Storage tiers
// ---------------------------------------------------------------------------

/// Preset capacity/rate combinations. Actual numbers come from
/// [`EnergyConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StorageTier {
    Basic,
    Advanced,
    Elite,
    Ultimate,
}

impl StorageTier {
    pub fn all() -> [StorageTier; 4] {
        [
            StorageTier::Basic,
            StorageTier::Advanced,
            StorageTier::Elite,
            StorageTier::Ultimate,
        ]
    }
}

// ---------------------------------------------------------------------------
// EnergyNode
// ---------------------------------------------------------------------------

/// A position-less energy buffer with capacity and per-tick rate limits.
///
/// Invariant: `stored <= capacity`. Every mutator preserves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyNode {
    stored: Energy,
    capacity: Energy,
    max_input_rate: Energy,
    max_output_rate: Energy,
    energy_type: EnergyType,
    energy_unit: EnergyUnit,
}

impl EnergyNode {
    /// Create an empty node.
    pub fn new(
        capacity: Energy,
        max_input_rate: Energy,
        max_output_rate: Energy,
        energy_type: EnergyType,
        energy_unit: EnergyUnit,
    ) -> Self {
        Self {
            stored: 0,
            capacity,
            max_input_rate,
            max_output_rate,
            energy_type,
            energy_unit,
        }
    }

    /// A node whose input and output rates both equal its capacity, in the
    /// native unit.
    pub fn with_capacity(capacity: Energy, energy_type: EnergyType) -> Self {
        Self::new(
            capacity,
            capacity,
            capacity,
            energy_type,
            EnergyUnit::default(),
        )
    }

    /// Build a node from a configured storage tier.
    pub fn from_tier(tier: StorageTier, config: &EnergyConfig, energy_type: EnergyType) -> Self {
        let spec = config.storage.tier(tier);
        Self::new(
            spec.capacity,
            spec.transfer_rate,
            spec.transfer_rate,
            energy_type,
            EnergyUnit::default(),
        )
    }

    /// A machine buffer of the given capacity, moving energy at the
    /// configured machine rate in both directions.
    pub fn machine(capacity: Energy, config: &EnergyConfig, energy_type: EnergyType) -> Self {
        let rate = config.network.machine_transfer_rate;
        Self::new(capacity, rate, rate, energy_type, EnergyUnit::default())
    }

    /// A cable segment. It buffers one tick of throughput at the configured
    /// cable rate.
    pub fn cable(config: &EnergyConfig, energy_type: EnergyType) -> Self {
        let rate = config.network.cable_transfer_rate;
        Self::new(rate, rate, rate, energy_type, EnergyUnit::default())
    }

    /// Set the initial charge (clamped to capacity).
    pub fn with_stored(mut self, stored: Energy) -> Self {
        self.set_stored(stored);
        self
    }

    pub fn with_unit(mut self, unit: EnergyUnit) -> Self {
        self.energy_unit = unit;
        self
    }

    // -- Accessors --

    pub fn stored(&self) -> Energy {
        self.stored
    }

    pub fn capacity(&self) -> Energy {
        self.capacity
    }

    pub fn max_input_rate(&self) -> Energy {
        self.max_input_rate
    }

    pub fn max_output_rate(&self) -> Energy {
        self.max_output_rate
    }

    pub fn is_full(&self) -> bool {
        self.stored >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.stored == 0
    }

    // -- Mutators --

    /// Overwrite the stored amount, clamped to `[0, capacity]`.
    pub fn set_stored(&mut self, stored: Energy) {
        self.stored = stored.min(self.capacity);
    }

    /// Change capacity. Stored energy above the new capacity is discarded.
    pub fn set_capacity(&mut self, capacity: Energy) {
        self.capacity = capacity;
        self.stored = self.stored.min(capacity);
    }

    pub fn set_max_input_rate(&mut self, rate: Energy) {
        self.max_input_rate = rate;
    }

    pub fn set_max_output_rate(&mut self, rate: Energy) {
        self.max_output_rate = rate;
    }

    /// `min(amount, capacity - stored, max_input_rate)`; committed unless
    /// `simulate`.
    pub fn receive(&mut self, amount: Energy, simulate: bool) -> Energy {
        let headroom = self.capacity.saturating_sub(self.stored);
        let accepted = amount.min(headroom).min(self.max_input_rate);
        if !simulate {
            self.stored += accepted;
        }
        accepted
    }

    /// `min(amount, stored, max_output_rate)`; committed unless `simulate`.
    pub fn extract(&mut self, amount: Energy, simulate: bool) -> Energy {
        let released = amount.min(self.stored).min(self.max_output_rate);
        if !simulate {
            self.stored -= released;
        }
        released
    }
}

impl EnergyHandler for EnergyNode {
    fn receive_energy(&mut self, amount: Energy, simulate: bool) -> Energy {
        self.receive(amount, simulate)
    }

    fn extract_energy(&mut self, amount: Energy, simulate: bool) -> Energy {
        self.extract(amount, simulate)
    }

    fn energy(&self) -> Energy {
        self.stored
    }

    fn max_energy(&self) -> Energy {
        self.capacity
    }

    fn can_receive(&self) -> bool {
        self.max_input_rate > 0
    }

    fn can_extract(&self) -> bool {
        self.max_output_rate > 0
    }

    fn energy_type(&self) -> EnergyType {
        self.energy_type
    }

    fn energy_unit(&self) -> EnergyUnit {
        self.energy_unit
    }
}
