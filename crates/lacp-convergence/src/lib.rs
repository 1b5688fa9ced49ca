//! LACP convergence verification for LAG functional tests.
//!
//! Two switches joined by a LAG each report their own view of the LACP
//! session. This crate polls both views until they agree, with the
//! invariants depending on whether the LAG is static or dynamic:
//!
//! - [`retry`]: bounded retry of any read-then-assert check
//! - [`validator`]: cross-peer invariants between two snapshots of a link
//! - [`orchestrator`]: static -> active/passive lifecycle with convergence polls
//! - [`device`]: the switch command/query interface the engine drives
//!
//! # Example
//!
//! ```ignore
//! use lacp_convergence::{ConvergenceConfig, LacpMode, LagOrchestrator, LinkModes};
//!
//! let config = ConvergenceConfig::load("lacp.toml")?;
//! let mut lag = LagOrchestrator::new(sw1, sw2, &config);
//! lag.enable_interfaces().await?;
//! lag.configure_static().await?;
//! let report = lag
//!     .transition_to_dynamic(LinkModes::new(LacpMode::Active, LacpMode::Passive))
//!     .await?;
//! println!("converged after {} attempts", report.attempts);
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod interfaces;
pub mod lag_config;
pub mod mode;
pub mod orchestrator;
pub mod retry;
pub mod snapshot;
pub mod validator;

// Re-export commonly used items at crate root
pub use config::{BudgetConfig, ConvergenceConfig};
pub use device::{DeviceDump, DumpDevice, LacpDevice, Peer};
pub use error::{FieldMismatch, Relation, VerifyError, VerifyResult};
pub use mode::{LacpMode, LacpRate, LinkModes, ModeDefaults, ModeTable};
pub use orchestrator::{
    poll_until_converged, ConvergenceReport, ConvergenceResult, LagOrchestrator, LagState,
    LinkPairProvider, PeerLinks, VERIFY_LACP_STEP,
};
pub use retry::{RetryOutcome, RetryPoller, RetryPolicy};
pub use snapshot::{
    InterfaceState, LacpConfiguration, LagConfiguration, LinkPair, PeerSample, StateFlags,
    StateSnapshot, StateView, SyncFlags,
};
pub use validator::CrossPeerValidator;
