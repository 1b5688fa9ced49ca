//! Test fixtures for LACP convergence scenarios
//!
//! Provides reusable fabrics, configuration and snapshots

use std::time::Duration;

use lacp_convergence::{BudgetConfig, ConvergenceConfig};

use crate::simulated::SimulatedFabric;

/// System id advertised by `sw1`
pub const SYSTEM_A: &str = "70:72:cf:00:00:01";

/// System id advertised by `sw2`
pub const SYSTEM_B: &str = "70:72:cf:00:00:02";

/// Negotiation delay of [`lab_fabric`]
pub const LAB_NEGOTIATION_DELAY: Duration = Duration::from_secs(10);

/// Relink delay of [`lab_fabric`]
pub const LAB_RELINK_DELAY: Duration = Duration::from_secs(2);

/// Owned port labels
pub fn ports(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|label| label.to_string()).collect()
}

/// A fabric that behaves like the lab pair: negotiation settles within the
/// default dynamic budget and a relink within the default relink budget.
pub fn lab_fabric() -> SimulatedFabric {
    SimulatedFabric::pair(SYSTEM_A, SYSTEM_B)
        .with_negotiation_delay(LAB_NEGOTIATION_DELAY)
        .with_relink_delay(LAB_RELINK_DELAY)
}

/// Default configuration with the dynamic convergence budget replaced
pub fn config_with_dynamic_budget(budget: BudgetConfig) -> ConvergenceConfig {
    let mut config = ConvergenceConfig::default();
    config.budgets.dynamic_convergence = budget;
    config
}

/// Peer samples for validator scenarios
pub mod snapshot_fixtures {
    use lacp_convergence::{
        LacpMode, LinkPair, PeerSample, StateFlags, StateSnapshot, SyncFlags,
    };

    use super::{SYSTEM_A, SYSTEM_B};

    /// Static member of `lag_id`, in sync
    pub fn static_end(device: &str, system_id: &str, lag_id: &str) -> PeerSample {
        let flags = StateFlags {
            static_sync: true,
            ..Default::default()
        };
        PeerSample {
            device: device.to_string(),
            configured_system_id: system_id.to_string(),
            snapshot: StateSnapshot {
                lag_id: lag_id.to_string(),
                sync: SyncFlags {
                    local: flags,
                    remote: flags,
                },
                ..Default::default()
            },
        }
    }

    /// Dynamic member of `lag_id` that negotiated with `partner_id`
    pub fn dynamic_end(
        device: &str,
        system_id: &str,
        partner_id: &str,
        mode: LacpMode,
        partner_mode: LacpMode,
    ) -> PeerSample {
        PeerSample {
            device: device.to_string(),
            configured_system_id: system_id.to_string(),
            snapshot: StateSnapshot {
                lag_id: "1".to_string(),
                key: "1".to_string(),
                priority: "65534".to_string(),
                system_id: system_id.to_string(),
                system_priority: "65534".to_string(),
                partner_id: partner_id.to_string(),
                sync: SyncFlags {
                    local: StateFlags {
                        activity: mode == LacpMode::Active,
                        in_sync: true,
                        static_sync: false,
                    },
                    remote: StateFlags {
                        activity: partner_mode == LacpMode::Active,
                        in_sync: true,
                        static_sync: false,
                    },
                },
            },
        }
    }

    /// Both ends of port `port` converged as static members of LAG 1
    pub fn static_link(port: &str) -> LinkPair {
        LinkPair {
            port: port.to_string(),
            a: static_end("sw1", SYSTEM_A, "1"),
            b: static_end("sw2", SYSTEM_B, "1"),
        }
    }

    /// Both ends of port `port` converged with `sw1` in `a` mode and `sw2` in `b` mode
    pub fn dynamic_link(port: &str, a: LacpMode, b: LacpMode) -> LinkPair {
        LinkPair {
            port: port.to_string(),
            a: dynamic_end("sw1", SYSTEM_A, SYSTEM_B, a, b),
            b: dynamic_end("sw2", SYSTEM_B, SYSTEM_A, b, a),
        }
    }
}
