//! Shared test helpers for unit tests, integration tests, and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`.

use crate::fixed::Energy;
use crate::node::EnergyNode;
use crate::unit::{EnergyType, EnergyUnit};

// ===========================================================================
// Node constructors
// ===========================================================================

/// Electrical node in the native unit with the given limits.
pub fn make_node(stored: Energy, capacity: Energy, input: Energy, output: Energy) -> EnergyNode {
    EnergyNode::new(
        capacity,
        input,
        output,
        EnergyType::Electrical,
        EnergyUnit::GalacticEnergyUnit,
    )
    .with_stored(stored)
}

/// A node that only gives energy.
pub fn make_provider(stored: Energy, rate: Energy) -> EnergyNode {
    make_node(stored, stored.max(1), 0, rate)
}

/// An empty node that only accepts energy.
pub fn make_consumer(capacity: Energy, rate: Energy) -> EnergyNode {
    make_node(0, capacity, rate, 0)
}

/// A node with input and output rates equal to its capacity.
pub fn make_cell(stored: Energy, capacity: Energy) -> EnergyNode {
    make_node(stored, capacity, capacity, capacity)
}

/// Same as [`make_cell`] but of a different energy kind.
pub fn make_typed_cell(stored: Energy, capacity: Energy, energy_type: EnergyType) -> EnergyNode {
    EnergyNode::new(capacity, capacity, capacity, energy_type, EnergyUnit::GalacticEnergyUnit)
        .with_stored(stored)
}
