use voltaic_core::unit::EnergyType;
use voltaic_spatial::BlockPos;

/// Rejections from structural registry operations.
///
/// A rejected operation leaves every network and node unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("position {0} is already occupied")]
    PositionOccupied(BlockPos),

    #[error("incompatible energy type: adjacent network carries {expected}, node is {found}")]
    IncompatibleEnergyType {
        expected: EnergyType,
        found: EnergyType,
    },

    #[error("no node at {0}")]
    NodeNotFound(BlockPos),

    #[error("network not found")]
    NetworkNotFound,
}
