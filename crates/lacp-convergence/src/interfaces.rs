//! Interface link-state checks.

use tracing::instrument;

use crate::device::{LacpDevice, Peer};
use crate::error::{VerifyError, VerifyResult};

/// Enables or disables every listed port on every peer.
#[instrument(skip(peers, ports), fields(port_count = ports.len()))]
pub async fn set_interfaces_enabled(
    peers: &[Peer],
    ports: &[String],
    enabled: bool,
) -> VerifyResult<()> {
    for peer in peers {
        for port in ports {
            peer.set_interface_enabled(port, enabled).await?;
        }
    }
    Ok(())
}

/// Checks that every listed port on every peer is up (or down).
///
/// A port counts as up only when both admin and link state are up, and as
/// down when its link is down.
pub async fn verify_interfaces(
    peers: &[Peer],
    ports: &[String],
    expect_up: bool,
) -> VerifyResult<()> {
    for peer in peers {
        for port in ports {
            check_interface(peer.as_ref(), port, expect_up).await?;
        }
    }
    Ok(())
}

async fn check_interface(
    device: &dyn LacpDevice,
    port: &str,
    expect_up: bool,
) -> VerifyResult<()> {
    let state = device.interface_state(port).await?;
    let ok = if expect_up {
        state.admin_up && state.link_up
    } else {
        !state.link_up
    };

    if ok {
        Ok(())
    } else {
        Err(VerifyError::InterfaceState {
            device: device.name().to_string(),
            port: port.to_string(),
            expected: if expect_up { "up" } else { "down" }.to_string(),
            actual: state.describe().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceDump, DumpDevice};
    use crate::snapshot::StateSnapshot;
    use std::sync::Arc;

    fn peer(name: &str, up_ports: &[&str]) -> Peer {
        let mut dump = DeviceDump {
            name: name.to_string(),
            ..Default::default()
        };
        for port in up_ports {
            dump.interfaces.insert(port.to_string(), StateSnapshot::default());
        }
        Arc::new(DumpDevice::new(dump))
    }

    #[tokio::test]
    async fn test_all_up() {
        let peers = vec![peer("sw1", &["2", "3"]), peer("sw2", &["2", "3"])];
        let ports = vec!["2".to_string(), "3".to_string()];
        verify_interfaces(&peers, &ports, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_one_down() {
        let peers = vec![peer("sw1", &["2", "3"]), peer("sw2", &["2"])];
        let ports = vec!["2".to_string(), "3".to_string()];

        let err = verify_interfaces(&peers, &ports, true).await.unwrap_err();
        match err {
            VerifyError::InterfaceState { device, port, .. } => {
                assert_eq!(device, "sw2");
                assert_eq!(port, "3");
            }
            other => panic!("unexpected error: {other}"),
        }

        let down = vec!["4".to_string()];
        verify_interfaces(&peers, &down, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_enable_on_read_only_device_fails() {
        let peers = vec![peer("sw1", &[])];
        let ports = vec!["2".to_string()];
        let err = set_interfaces_enabled(&peers, &ports, true)
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
