//! LAG negotiation modes and the per-mode defaults table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{VerifyError, VerifyResult};

/// LACP mode configured on a LAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LacpMode {
    /// Static LAG, no LACP negotiation.
    Off,
    /// Actively sends LACPDUs.
    Active,
    /// Only answers LACPDUs from an active partner.
    Passive,
}

impl LacpMode {
    /// Returns true for `Active` and `Passive`.
    pub const fn is_dynamic(&self) -> bool {
        !matches!(self, LacpMode::Off)
    }

    /// Returns the mode name as used in device configuration.
    pub const fn as_str(&self) -> &'static str {
        match self {
            LacpMode::Off => "off",
            LacpMode::Active => "active",
            LacpMode::Passive => "passive",
        }
    }
}

impl fmt::Display for LacpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LacpMode {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "static" => Ok(LacpMode::Off),
            "active" => Ok(LacpMode::Active),
            "passive" => Ok(LacpMode::Passive),
            _ => Err(VerifyError::invalid_config(
                "mode",
                format!("unknown LACP mode '{}'", s),
            )),
        }
    }
}

/// LACPDU heartbeat rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LacpRate {
    /// One LACPDU every 30 seconds.
    #[default]
    Slow,
    /// One LACPDU every second.
    Fast,
}

impl fmt::Display for LacpRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LacpRate::Slow => f.write_str("slow"),
            LacpRate::Fast => f.write_str("fast"),
        }
    }
}

/// The modes configured on the two ends of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkModes {
    /// Mode on peer A.
    pub a: LacpMode,
    /// Mode on peer B.
    pub b: LacpMode,
}

impl LinkModes {
    /// Creates a mode pair.
    pub const fn new(a: LacpMode, b: LacpMode) -> Self {
        Self { a, b }
    }

    /// Both ends static.
    pub const fn static_off() -> Self {
        Self::new(LacpMode::Off, LacpMode::Off)
    }

    /// Returns whether the pair negotiates LACP.
    ///
    /// A static end facing a dynamic end never converges, so such a pair is
    /// rejected instead of being polled.
    pub fn dynamic(&self) -> VerifyResult<bool> {
        match (self.a.is_dynamic(), self.b.is_dynamic()) {
            (true, true) => Ok(true),
            (false, false) => Ok(false),
            _ => Err(VerifyError::InvalidModePair {
                a: self.a.to_string(),
                b: self.b.to_string(),
            }),
        }
    }

    /// The same pair seen from peer B.
    pub const fn reversed(&self) -> Self {
        Self::new(self.b, self.a)
    }
}

impl fmt::Display for LinkModes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.a, self.b)
    }
}

/// Expected actor values for one class of LAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeDefaults {
    /// Operational key.
    #[serde(default = "default_key")]
    pub key: String,
    /// Actor port priority.
    #[serde(default = "default_priority")]
    pub port_priority: String,
    /// Actor system priority.
    #[serde(default = "default_priority")]
    pub system_priority: String,
}

fn default_key() -> String {
    "1".to_string()
}

fn default_priority() -> String {
    "65534".to_string()
}

impl ModeDefaults {
    /// Static LAGs advertise nothing.
    pub fn empty() -> Self {
        Self {
            key: String::new(),
            port_priority: String::new(),
            system_priority: String::new(),
        }
    }
}

impl Default for ModeDefaults {
    fn default() -> Self {
        Self {
            key: default_key(),
            port_priority: default_priority(),
            system_priority: default_priority(),
        }
    }
}

/// Defaults keyed by mode class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeTable {
    dynamic: ModeDefaults,
    static_off: ModeDefaults,
}

impl ModeTable {
    /// Creates a table with the given dynamic defaults.
    pub fn new(dynamic: ModeDefaults) -> Self {
        Self {
            dynamic,
            static_off: ModeDefaults::empty(),
        }
    }

    /// Looks up the defaults for a static or dynamic link.
    pub fn defaults(&self, dynamic: bool) -> &ModeDefaults {
        if dynamic {
            &self.dynamic
        } else {
            &self.static_off
        }
    }
}

impl Default for ModeTable {
    fn default() -> Self {
        Self::new(ModeDefaults::default())
    }
}
