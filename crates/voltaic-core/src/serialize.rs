//! Versioned snapshot header and persisted node record.
//!
//! The payload codec lives with the registry; this module fixes the header
//! layout and the per-node record every snapshot carries.

use serde::{Deserialize, Serialize};

use crate::fixed::{Energy, Ticks};
use crate::node::{EnergyHandler, EnergyNode};
use crate::unit::{EnergyType, EnergyUnit};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a voltaic registry snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x5017_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

/// Errors that can occur during deserialization.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("snapshot is inconsistent: {0}")]
    Inconsistent(String),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

/// Header prepended to every serialized snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick count at the time the snapshot was taken.
    pub tick: Ticks,
}

impl SnapshotHeader {
    /// Create a header for the current format version.
    pub fn new(tick: Ticks) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    /// Validate the header. Returns `Ok(())` if valid.
    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Persisted node
// ---------------------------------------------------------------------------

/// The minimum per-node state needed to rebuild a node after a restart.
///
/// Generic over the position type so the core crate stays free of the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedNode<P> {
    pub position: P,
    pub stored: Energy,
    pub capacity: Energy,
    pub max_input_rate: Energy,
    pub max_output_rate: Energy,
    pub energy_unit: EnergyUnit,
    pub energy_type: EnergyType,
}

impl<P> PersistedNode<P> {
    pub fn from_node(position: P, node: &EnergyNode) -> Self {
        Self {
            position,
            stored: node.stored(),
            capacity: node.capacity(),
            max_input_rate: node.max_input_rate(),
            max_output_rate: node.max_output_rate(),
            energy_unit: node.energy_unit(),
            energy_type: node.energy_type(),
        }
    }

    /// Rebuild the node. A stored amount above capacity is clamped.
    pub fn to_node(&self) -> EnergyNode {
        EnergyNode::new(
            self.capacity,
            self.max_input_rate,
            self.max_output_rate,
            self.energy_type,
            self.energy_unit,
        )
        .with_stored(self.stored)
    }
}
