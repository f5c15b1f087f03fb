//! Energy networks for the voltaic grid.
//!
//! Nodes placed on the grid are grouped into networks: maximal face-connected
//! sets of nodes carrying one energy type. The [`NetworkRegistry`] keeps that
//! grouping correct as nodes come and go, merging networks that become
//! connected and splitting networks that fall apart. Each tick every active
//! network runs its own distribution pass from providers to consumers.
//!
//! # Design
//!
//! - The registry is an owned value; there is no global state.
//! - Networks live in a [`slotmap::SlotMap`] so ids are never confused with
//!   retired ones.
//! - Nodes keep insertion order inside a network; that order drives the
//!   distribution pass and makes ticks deterministic.
//! - Independent networks can tick in parallel (feature `parallel`); a single
//!   network's pass is always sequential.

pub mod dirty;
pub mod error;
pub mod event;
pub mod id;
pub mod network;
pub mod registry;
pub mod snapshot;

pub use error::RegistryError;
pub use event::NetworkEvent;
pub use id::{NetworkId, NetworkState};
pub use network::EnergyNetwork;
pub use registry::NetworkRegistry;
pub use snapshot::PersistedNetwork;
