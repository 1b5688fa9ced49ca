//! Read-back checks of LAG configuration.
//!
//! These run once, right after configuration commands, to confirm the
//! device accepted them. They do not wait for negotiation.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use crate::device::LacpDevice;
use crate::error::{VerifyError, VerifyResult};
use crate::mode::{LacpMode, LacpRate};

/// What a LAG should look like on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedLag<'a> {
    /// LAG identifier.
    pub lag_id: &'a str,
    /// Member ports.
    pub members: &'a [String],
    /// Heartbeat rate.
    pub rate: LacpRate,
    /// LACP mode.
    pub mode: LacpMode,
}

/// Verifies that a device reports the expected LAG configuration.
#[instrument(skip(device, expected), fields(device = %device.name(), lag = %expected.lag_id))]
pub async fn verify_lag_config(
    device: &dyn LacpDevice,
    expected: &ExpectedLag<'_>,
) -> VerifyResult<()> {
    let mismatch = |field: &str, expected_value: String, actual: String| {
        VerifyError::LagConfigMismatch {
            device: device.name().to_string(),
            lag_id: expected.lag_id.to_string(),
            field: field.to_string(),
            expected: expected_value,
            actual,
        }
    };

    let Some(config) = device.lag_configuration(expected.lag_id).await? else {
        return Err(mismatch(
            "exists",
            "true".to_string(),
            "false".to_string(),
        ));
    };

    if config.mode != expected.mode {
        return Err(mismatch(
            "mode",
            expected.mode.to_string(),
            config.mode.to_string(),
        ));
    }
    if config.rate != expected.rate {
        return Err(mismatch(
            "rate",
            expected.rate.to_string(),
            config.rate.to_string(),
        ));
    }

    let wanted: BTreeSet<String> = expected.members.iter().cloned().collect();
    if config.members != wanted {
        return Err(mismatch(
            "members",
            join(&wanted),
            join(&config.members),
        ));
    }

    debug!("LAG configuration applied");
    Ok(())
}

/// Verifies that a port is no longer a member of a LAG.
pub async fn verify_member_absent(
    device: &dyn LacpDevice,
    lag_id: &str,
    port: &str,
) -> VerifyResult<()> {
    let members = device
        .lag_configuration(lag_id)
        .await?
        .map(|config| config.members)
        .unwrap_or_default();

    if members.contains(port) {
        return Err(VerifyError::LagConfigMismatch {
            device: device.name().to_string(),
            lag_id: lag_id.to_string(),
            field: "members".to_string(),
            expected: format!("without {}", port),
            actual: join(&members),
        });
    }
    Ok(())
}

fn join(ports: &BTreeSet<String>) -> String {
    ports.iter().cloned().collect::<Vec<_>>().join(",")
}
