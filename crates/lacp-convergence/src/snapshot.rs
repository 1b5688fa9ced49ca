//! Observed LACP state.
//!
//! Snapshots are plain values produced fresh on every poll. Unset fields are
//! empty strings, the same way the switch reports them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::mode::{LacpMode, LacpRate};

/// Which half of an LACP interface report a flag set comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateView {
    /// The actor's own state (`LOCAL_STATE`).
    Local,
    /// This end's view of its partner (`REMOTE_STATE`).
    Remote,
}

impl StateView {
    /// Returns the view name used in diagnostics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            StateView::Local => "LOCAL_STATE",
            StateView::Remote => "REMOTE_STATE",
        }
    }
}

/// Negotiation flags of one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateFlags {
    /// LACP activity bit (set when the port runs in active mode).
    #[serde(default)]
    pub activity: bool,
    /// Synchronization bit.
    #[serde(default)]
    pub in_sync: bool,
    /// Static LAG indicator; a link not running LACP is in sync by convention.
    #[serde(default)]
    pub static_sync: bool,
}

/// Both flag views reported for one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncFlags {
    /// Actor flags.
    #[serde(default)]
    pub local: StateFlags,
    /// Partner flags as seen by the actor.
    #[serde(default)]
    pub remote: StateFlags,
}

impl SyncFlags {
    /// Returns the flags of one view.
    pub fn view(&self, view: StateView) -> &StateFlags {
        match view {
            StateView::Local => &self.local,
            StateView::Remote => &self.remote,
        }
    }
}

/// One peer's LACP attributes for one link at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Aggregation group the link believes it belongs to.
    #[serde(default)]
    pub lag_id: String,
    /// Actor operational key.
    #[serde(default)]
    pub key: String,
    /// Actor port priority.
    #[serde(default)]
    pub priority: String,
    /// Actor system identifier.
    #[serde(default)]
    pub system_id: String,
    /// Actor system priority.
    #[serde(default)]
    pub system_priority: String,
    /// Partner system identifier as seen by the actor.
    #[serde(default)]
    pub partner_id: String,
    /// Negotiation flags.
    #[serde(default)]
    pub sync: SyncFlags,
}

impl StateSnapshot {
    /// Returns true once the link reports LAG membership.
    pub fn is_member(&self) -> bool {
        !self.lag_id.is_empty()
    }
}

/// Switch-wide LACP configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LacpConfiguration {
    /// System identifier the switch advertises (a MAC address).
    pub system_id: String,
    /// System priority the switch advertises.
    #[serde(default)]
    pub system_priority: String,
}

/// One end of a link as sampled in a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSample {
    /// Device name.
    pub device: String,
    /// System identifier from the device's LACP configuration.
    pub configured_system_id: String,
    /// Interface state for the link's port.
    pub snapshot: StateSnapshot,
}

/// Both ends of one physical link, sampled close together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPair {
    /// Port label of the link.
    pub port: String,
    /// Peer A.
    pub a: PeerSample,
    /// Peer B.
    pub b: PeerSample,
}

impl LinkPair {
    /// The same link seen from peer B.
    pub fn reversed(&self) -> LinkPair {
        LinkPair {
            port: self.port.clone(),
            a: self.b.clone(),
            b: self.a.clone(),
        }
    }
}

/// LAG configuration as read back from a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagConfiguration {
    /// Configured LACP mode.
    pub mode: LacpMode,
    /// Configured heartbeat rate.
    #[serde(default)]
    pub rate: LacpRate,
    /// Member ports.
    #[serde(default)]
    pub members: BTreeSet<String>,
}

/// Link state of a physical interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterfaceState {
    /// Administratively enabled.
    pub admin_up: bool,
    /// Link detected.
    pub link_up: bool,
}

impl InterfaceState {
    /// Short form for diagnostics.
    pub fn describe(&self) -> &'static str {
        match (self.admin_up, self.link_up) {
            (true, true) => "up",
            (true, false) => "admin up/link down",
            (false, _) => "down",
        }
    }
}
