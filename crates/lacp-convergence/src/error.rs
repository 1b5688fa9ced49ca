//! Error types for convergence verification.
//!
//! All errors implement `std::error::Error` via `thiserror`. The split that
//! matters to callers is [`VerifyError::is_retryable`]: observation failures
//! feed the retry loop, command rejections end it.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for verification operations.
pub type VerifyResult<T> = Result<T, VerifyError>;

/// The relation a snapshot field was expected to satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// Equal to the mode default on this end and to the peer's value.
    DefaultAndPeer {
        /// Mode default for the field (empty for static LAGs).
        default: String,
    },
    /// Equal to the system identifier the switch reports for itself.
    ConfiguredSystemId {
        /// The identifier from the switch's LACP configuration.
        expected: String,
    },
    /// Partner identity on one end equals the other end's own system id.
    PartnerReference,
    /// Field must be empty (no negotiation on a static LAG).
    Empty,
    /// Both ends report the same LAG identifier.
    SameLag,
    /// A flag in a state view must be set.
    FlagSet {
        /// `LOCAL_STATE` or `REMOTE_STATE`.
        view: &'static str,
        /// Flag name.
        flag: &'static str,
    },
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::DefaultAndPeer { default } if default.is_empty() => {
                write!(f, "match default/peer (empty)")
            }
            Relation::DefaultAndPeer { default } => {
                write!(f, "match default/peer ('{}')", default)
            }
            Relation::ConfiguredSystemId { expected } => {
                write!(f, "equal configured system id '{}'", expected)
            }
            Relation::PartnerReference => write!(f, "reference peer system id"),
            Relation::Empty => write!(f, "be empty on a static LAG"),
            Relation::SameLag => write!(f, "match peer LAG id"),
            Relation::FlagSet { view, flag } => write!(f, "{} {} set", view, flag),
        }
    }
}

/// One snapshot field violating a cross-peer invariant.
///
/// `a` is the value on the end being checked, `b` the value it was compared
/// against on the opposite end (or the expectation when there is none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    /// Port label of the link.
    pub port: String,
    /// Snapshot field name (e.g. `key`, `system_id`).
    pub field: String,
    /// Relation that failed.
    pub expected: Relation,
    /// Value observed on the checked end.
    pub a: String,
    /// Value observed on the opposite end.
    pub b: String,
}

impl fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "port {}: field '{}' should {} (a='{}', b='{}')",
            self.port, self.field, self.expected, self.a, self.b
        )
    }
}

/// Errors that can occur while verifying LAG/LACP state.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// A snapshot field violates an invariant.
    #[error("Field mismatch: {0}")]
    FieldMismatch(Box<FieldMismatch>),

    /// One end does not report LAG membership yet.
    #[error("Port {port} on {device} is not yet a LAG member")]
    NotYetMember {
        /// The device name.
        device: String,
        /// The port label.
        port: String,
    },

    /// Retry budget spent without a passing check.
    #[error("{description}: {failure_message} (gave up after {attempts} attempts in {elapsed:?}): {last}")]
    RetryExhausted {
        /// Orchestration step being verified.
        description: String,
        /// Message attached by the caller for this budget.
        failure_message: String,
        /// Number of check invocations.
        attempts: u32,
        /// Time spent polling.
        elapsed: Duration,
        /// Failure from the final attempt.
        last: Box<VerifyError>,
    },

    /// The device rejected a configuration command.
    #[error("Device {device} rejected '{command}': {message}")]
    DeviceCommand {
        /// The device name.
        device: String,
        /// The command that was issued.
        command: String,
        /// Rejection message.
        message: String,
    },

    /// A read against the device failed.
    #[error("Device {device} query '{query}' failed: {message}")]
    DeviceQuery {
        /// The device name.
        device: String,
        /// The query that failed.
        query: String,
        /// Error message.
        message: String,
    },

    /// An interface did not report the expected link state.
    #[error("Interface {port} on {device} is {actual}, expected {expected}")]
    InterfaceState {
        /// The device name.
        device: String,
        /// The port label.
        port: String,
        /// Expected state.
        expected: String,
        /// Observed state.
        actual: String,
    },

    /// LAG configuration on a device differs from what was applied.
    #[error("LAG {lag_id} on {device}: {field} is '{actual}', expected '{expected}'")]
    LagConfigMismatch {
        /// The device name.
        device: String,
        /// The LAG identifier.
        lag_id: String,
        /// Configuration field.
        field: String,
        /// Expected value.
        expected: String,
        /// Observed value.
        actual: String,
    },

    /// One peer static and the other dynamic.
    #[error("Invalid mode pair: {a} / {b}")]
    InvalidModePair {
        /// Mode of the first peer.
        a: String,
        /// Mode of the second peer.
        b: String,
    },

    /// The orchestrator was asked for a transition its state does not allow.
    #[error("Cannot {operation} while LAG is {state}")]
    InvalidTransition {
        /// Requested operation.
        operation: String,
        /// Current lifecycle state.
        state: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },
}

impl VerifyError {
    /// Creates a field mismatch error.
    pub fn mismatch(
        port: impl Into<String>,
        field: impl Into<String>,
        expected: Relation,
        a: impl Into<String>,
        b: impl Into<String>,
    ) -> Self {
        Self::FieldMismatch(Box::new(FieldMismatch {
            port: port.into(),
            field: field.into(),
            expected,
            a: a.into(),
            b: b.into(),
        }))
    }

    /// Creates a device command error.
    pub fn device_command(
        device: impl Into<String>,
        command: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DeviceCommand {
            device: device.into(),
            command: command.into(),
            message: message.into(),
        }
    }

    /// Creates a device query error.
    pub fn device_query(
        device: impl Into<String>,
        query: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DeviceQuery {
            device: device.into(),
            query: query.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the field mismatch detail, looking through `RetryExhausted`.
    ///
    /// An end that is not yet a LAG member is reported as
    /// [`VerifyError::NotYetMember`] rather than a `lag_id` mismatch, so this
    /// returns `None` for it even when wrapped in `RetryExhausted`.
    pub fn field_mismatch(&self) -> Option<&FieldMismatch> {
        match self {
            VerifyError::FieldMismatch(detail) => Some(detail),
            VerifyError::RetryExhausted { last, .. } => last.field_mismatch(),
            _ => None,
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VerifyError::FieldMismatch(_)
                | VerifyError::NotYetMember { .. }
                | VerifyError::DeviceQuery { .. }
                | VerifyError::InterfaceState { .. }
                | VerifyError::LagConfigMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_display() {
        let err = VerifyError::mismatch(
            "2",
            "key",
            Relation::DefaultAndPeer {
                default: "1".to_string(),
            },
            "1",
            "2",
        );
        assert_eq!(
            err.to_string(),
            "Field mismatch: port 2: field 'key' should match default/peer ('1') (a='1', b='2')"
        );
    }

    #[test]
    fn test_retry_exhausted_exposes_last_mismatch() {
        let err = VerifyError::RetryExhausted {
            description: "Verify LACP status on both devices".to_string(),
            failure_message: "Configuration not yet applied".to_string(),
            attempts: 2,
            elapsed: Duration::from_secs(2),
            last: Box::new(VerifyError::mismatch("3", "lag_id", Relation::SameLag, "lag1", "lag2")),
        };
        let detail = err.field_mismatch().unwrap();
        assert_eq!(detail.field, "lag_id");
        assert!(err.to_string().starts_with("Verify LACP status on both devices"));
        assert!(err.to_string().contains("2 attempts"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(VerifyError::NotYetMember {
            device: "sw1".to_string(),
            port: "2".to_string()
        }
        .is_retryable());
        assert!(VerifyError::device_query("sw1", "show lacp", "timeout").is_retryable());
        assert!(!VerifyError::device_command("sw1", "lacp mode active", "rejected").is_retryable());
        assert!(!VerifyError::invalid_config("lag.ports", "empty").is_retryable());
    }

    #[test]
    fn test_missing_member_is_not_a_field_mismatch() {
        let err = VerifyError::RetryExhausted {
            description: "Verify LACP status on both devices".to_string(),
            failure_message: "Member not released".to_string(),
            attempts: 1,
            elapsed: Duration::ZERO,
            last: Box::new(VerifyError::NotYetMember {
                device: "sw2".to_string(),
                port: "4".to_string(),
            }),
        };
        assert!(err.field_mismatch().is_none());
        assert!(err.to_string().contains("Port 4 on sw2 is not yet a LAG member"));
        match err {
            VerifyError::RetryExhausted { last, .. } => {
                assert!(last.is_retryable());
                assert!(matches!(*last, VerifyError::NotYetMember { ref port, .. } if port == "4"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
