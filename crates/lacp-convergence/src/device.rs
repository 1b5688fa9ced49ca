//! Device collaborator interface.
//!
//! Everything the engine knows about a switch comes through [`LacpDevice`].
//! Commands return [`VerifyError::DeviceCommand`] when rejected; reads return
//! [`VerifyError::DeviceQuery`] when they cannot be served.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{VerifyError, VerifyResult};
use crate::mode::{LacpMode, LacpRate};
use crate::snapshot::{InterfaceState, LacpConfiguration, LagConfiguration, StateSnapshot};

/// Shared handle to a device.
pub type Peer = Arc<dyn LacpDevice>;

/// Command and query channel of one switch.
#[async_trait]
pub trait LacpDevice: Send + Sync {
    /// Device name for logging and diagnostics.
    fn name(&self) -> &str;

    /// Switch-wide LACP configuration.
    async fn lacp_configuration(&self) -> VerifyResult<LacpConfiguration>;

    /// LACP state of one interface. A port outside any LAG reports an
    /// empty `lag_id`.
    async fn lacp_interface_state(&self, port: &str) -> VerifyResult<StateSnapshot>;

    /// Changes the LACP mode of an existing LAG.
    async fn set_lag_mode(&self, lag_id: &str, mode: LacpMode) -> VerifyResult<()>;

    /// Creates a LAG in the given mode.
    async fn create_lag(&self, lag_id: &str, mode: LacpMode) -> VerifyResult<()>;

    /// Deletes a LAG and releases its members.
    async fn delete_lag(&self, lag_id: &str) -> VerifyResult<()>;

    /// Sets the LACPDU heartbeat rate.
    async fn set_lag_rate(&self, lag_id: &str, rate: LacpRate) -> VerifyResult<()>;

    /// Adds a port to a LAG.
    async fn add_lag_member(&self, lag_id: &str, port: &str) -> VerifyResult<()>;

    /// Removes a port from a LAG.
    async fn remove_lag_member(&self, lag_id: &str, port: &str) -> VerifyResult<()>;

    /// Reads a LAG's configuration back, `None` if it does not exist.
    async fn lag_configuration(&self, lag_id: &str) -> VerifyResult<Option<LagConfiguration>>;

    /// Administratively enables or disables an interface.
    async fn set_interface_enabled(&self, port: &str, enabled: bool) -> VerifyResult<()>;

    /// Link state of an interface.
    async fn interface_state(&self, port: &str) -> VerifyResult<InterfaceState>;
}

/// Captured state of one switch, as written by `show` commands to JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceDump {
    /// Device name.
    pub name: String,
    /// Switch-wide LACP configuration.
    pub lacp: LacpConfiguration,
    /// Interface state keyed by port label.
    #[serde(default)]
    pub interfaces: BTreeMap<String, StateSnapshot>,
    /// LAG configuration keyed by LAG id.
    #[serde(default)]
    pub lags: BTreeMap<String, LagConfiguration>,
}

impl DeviceDump {
    /// Loads a dump from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> VerifyResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            VerifyError::device_query(path.display().to_string(), "read dump", e.to_string())
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            VerifyError::device_query(path.display().to_string(), "parse dump", e.to_string())
        })
    }
}

/// Read-only device backed by a [`DeviceDump`].
///
/// Every configuration command is rejected.
#[derive(Debug, Clone)]
pub struct DumpDevice {
    dump: DeviceDump,
}

impl DumpDevice {
    /// Wraps a dump.
    pub fn new(dump: DeviceDump) -> Self {
        Self { dump }
    }

    fn read_only(&self, command: String) -> VerifyError {
        VerifyError::device_command(&self.dump.name, command, "device is a read-only dump")
    }
}

#[async_trait]
impl LacpDevice for DumpDevice {
    fn name(&self) -> &str {
        &self.dump.name
    }

    async fn lacp_configuration(&self) -> VerifyResult<LacpConfiguration> {
        Ok(self.dump.lacp.clone())
    }

    async fn lacp_interface_state(&self, port: &str) -> VerifyResult<StateSnapshot> {
        Ok(self.dump.interfaces.get(port).cloned().unwrap_or_default())
    }

    async fn set_lag_mode(&self, lag_id: &str, mode: LacpMode) -> VerifyResult<()> {
        Err(self.read_only(format!("lag {} lacp mode {}", lag_id, mode)))
    }

    async fn create_lag(&self, lag_id: &str, mode: LacpMode) -> VerifyResult<()> {
        Err(self.read_only(format!("create lag {} mode {}", lag_id, mode)))
    }

    async fn delete_lag(&self, lag_id: &str) -> VerifyResult<()> {
        Err(self.read_only(format!("no lag {}", lag_id)))
    }

    async fn set_lag_rate(&self, lag_id: &str, rate: LacpRate) -> VerifyResult<()> {
        Err(self.read_only(format!("lag {} lacp rate {}", lag_id, rate)))
    }

    async fn add_lag_member(&self, lag_id: &str, port: &str) -> VerifyResult<()> {
        Err(self.read_only(format!("interface {} lag {}", port, lag_id)))
    }

    async fn remove_lag_member(&self, lag_id: &str, port: &str) -> VerifyResult<()> {
        Err(self.read_only(format!("interface {} no lag {}", port, lag_id)))
    }

    async fn lag_configuration(&self, lag_id: &str) -> VerifyResult<Option<LagConfiguration>> {
        Ok(self.dump.lags.get(lag_id).cloned())
    }

    async fn set_interface_enabled(&self, port: &str, enabled: bool) -> VerifyResult<()> {
        let action = if enabled { "no shutdown" } else { "shutdown" };
        Err(self.read_only(format!("interface {} {}", port, action)))
    }

    async fn interface_state(&self, port: &str) -> VerifyResult<InterfaceState> {
        // Dumps only carry interfaces that were up when captured.
        let up = self.dump.interfaces.contains_key(port);
        Ok(InterfaceState {
            admin_up: up,
            link_up: up,
        })
    }
}
