//! Energy currencies and energy kinds.
//!
//! An [`EnergyUnit`] is a scale: amounts convert between units through a
//! fixed factor relative to the base unit. An [`EnergyType`] is a kind:
//! two different kinds never exchange energy directly.

use serde::{Deserialize, Serialize};

use crate::fixed::Energy;

// ---------------------------------------------------------------------------
// EnergyUnit
// ---------------------------------------------------------------------------

/// An energy currency with a fixed conversion factor to the base unit.
///
/// Factors are kept as exact integer tenths so conversion is pure integer
/// arithmetic: `floor(amount * from.tenths / to.tenths)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum EnergyUnit {
    /// Native unit. Factor 1.0.
    #[default]
    GalacticEnergyUnit,
    /// Factor 1.0.
    ForgeEnergy,
    /// Factor 1.0.
    RedstoneFlux,
    /// Higher-tier unit. Factor 10.0.
    ModApiEnergy,
    /// Heat-based machines. Factor 0.5.
    ThermalUnit,
    /// Movement-based generators. Factor 2.0.
    KineticUnit,
    /// Steam generators. Factor 0.2.
    SteamUnit,
}

impl EnergyUnit {
    /// All units, in declaration order.
    pub fn all() -> [EnergyUnit; 7] {
        [
            EnergyUnit::GalacticEnergyUnit,
            EnergyUnit::ForgeEnergy,
            EnergyUnit::RedstoneFlux,
            EnergyUnit::ModApiEnergy,
            EnergyUnit::ThermalUnit,
            EnergyUnit::KineticUnit,
            EnergyUnit::SteamUnit,
        ]
    }

    /// Conversion factor relative to the base unit, in tenths.
    pub const fn factor_tenths(self) -> u64 {
        match self {
            EnergyUnit::GalacticEnergyUnit => 10,
            EnergyUnit::ForgeEnergy => 10,
            EnergyUnit::RedstoneFlux => 10,
            EnergyUnit::ModApiEnergy => 100,
            EnergyUnit::ThermalUnit => 5,
            EnergyUnit::KineticUnit => 20,
            EnergyUnit::SteamUnit => 2,
        }
    }

    /// Full display name.
    pub fn name(self) -> &'static str {
        match self {
            EnergyUnit::GalacticEnergyUnit => "Galactic Energy Unit",
            EnergyUnit::ForgeEnergy => "Forge Energy",
            EnergyUnit::RedstoneFlux => "Redstone Flux",
            EnergyUnit::ModApiEnergy => "ModAPI Energy",
            EnergyUnit::ThermalUnit => "Thermal Unit",
            EnergyUnit::KineticUnit => "Kinetic Unit",
            EnergyUnit::SteamUnit => "Steam Unit",
        }
    }

    /// Short abbreviation for display.
    pub fn abbreviation(self) -> &'static str {
        match self {
            EnergyUnit::GalacticEnergyUnit => "GEU",
            EnergyUnit::ForgeEnergy => "FE",
            EnergyUnit::RedstoneFlux => "RF",
            EnergyUnit::ModApiEnergy => "ME",
            EnergyUnit::ThermalUnit => "TU",
            EnergyUnit::KineticUnit => "KU",
            EnergyUnit::SteamUnit => "SU",
        }
    }

    /// Convert `amount` expressed in `self` into `target`. Rounds down.
    pub fn convert_to(self, amount: Energy, target: EnergyUnit) -> Energy {
        convert(amount, self, target)
    }
}

/// Convert an amount between units: `floor(amount * from / to)`.
///
/// Converting to the same unit is the identity. Saturates at `Energy::MAX`.
pub fn convert(amount: Energy, from: EnergyUnit, to: EnergyUnit) -> Energy {
    if from == to {
        return amount;
    }
    let scaled = amount as u128 * from.factor_tenths() as u128 / to.factor_tenths() as u128;
    Energy::try_from(scaled).unwrap_or(Energy::MAX)
}

// ---------------------------------------------------------------------------
// EnergyType
// ---------------------------------------------------------------------------

/// The kind of energy a node stores. Networks never mix kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum EnergyType {
    #[default]
    Electrical,
    Steam,
    Nuclear,
    Solar,
}

impl EnergyType {
    pub fn all() -> [EnergyType; 4] {
        [
            EnergyType::Electrical,
            EnergyType::Steam,
            EnergyType::Nuclear,
            EnergyType::Solar,
        ]
    }

    /// Stable string identifier, used in persisted data.
    pub fn id(self) -> &'static str {
        match self {
            EnergyType::Electrical => "electrical",
            EnergyType::Steam => "steam",
            EnergyType::Nuclear => "nuclear",
            EnergyType::Solar => "solar",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EnergyType::Electrical => "Electrical",
            EnergyType::Steam => "Steam",
            EnergyType::Nuclear => "Nuclear",
            EnergyType::Solar => "Solar",
        }
    }

    /// Look up a type by its identifier. Unknown identifiers map to
    /// [`EnergyType::Electrical`].
    pub fn from_id(id: &str) -> EnergyType {
        EnergyType::all()
            .into_iter()
            .find(|t| t.id() == id)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for EnergyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
