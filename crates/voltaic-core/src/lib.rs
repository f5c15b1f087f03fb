//! Voltaic Core -- energy values, buffers, and transfer outcomes.
//!
//! This crate holds everything about energy that does not depend on where a
//! node sits: units and kinds, the [`node::EnergyHandler`] capability seam,
//! the [`node::EnergyNode`] buffer, the transfer result taxonomy, the
//! configuration, and the persisted-state records.
//!
//! # Key Types
//!
//! - [`unit::EnergyUnit`] -- Currency with an exact conversion factor.
//! - [`unit::EnergyType`] -- Kind of energy; kinds never mix.
//! - [`node::EnergyNode`] -- Buffer with capacity and per-tick rate caps.
//! - [`transfer::EnergyTransferResult`] -- Outcome of a transfer attempt.
//! - [`config::EnergyConfig`] -- Network and storage-tier settings.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point used for fill ratios.

pub mod config;
pub mod fixed;
pub mod node;
pub mod serialize;
pub mod transfer;
pub mod unit;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
