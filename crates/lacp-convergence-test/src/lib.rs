//! Test infrastructure for LACP convergence verification
//!
//! Provides:
//! - A simulated pair of switches joined by cabled ports
//! - Fixtures for snapshots, configuration and fabrics
//! - Command capture and assertion helpers

pub mod fixtures;
mod simulated;
mod verification;

pub use fixtures::*;
pub use simulated::{SimulatedFabric, SimulatedSwitch};
pub use verification::*;
