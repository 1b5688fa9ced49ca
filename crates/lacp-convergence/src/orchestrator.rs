//! LAG mode lifecycle and convergence polling.
//!
//! A LAG starts static. [`LagOrchestrator::transition_to_dynamic`] switches
//! both peers to LACP and polls until the two ends agree on one session:
//!
//! ```text
//! StaticOff --set modes--> Transitioning --converged--> Converged(active/passive)
//!     ^                        |  ^                          |
//!     |                        |  +---- cycle_links fails ---+
//!     +------- teardown -------+-----------------------------+
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::config::{BudgetConfig, BudgetsConfig, ConvergenceConfig};
use crate::device::Peer;
use crate::error::{VerifyError, VerifyResult};
use crate::interfaces::{set_interfaces_enabled, verify_interfaces};
use crate::lag_config::{verify_lag_config, ExpectedLag};
use crate::mode::{LacpMode, LacpRate, LinkModes};
use crate::retry::{RetryPolicy, RetryPoller};
use crate::snapshot::{LinkPair, PeerSample};
use crate::validator::CrossPeerValidator;

/// Step name used for every LACP state poll.
pub const VERIFY_LACP_STEP: &str = "Verify LACP status on both devices";

/// Produces fresh link pairs for one verification attempt.
#[async_trait]
pub trait LinkPairProvider: Send + Sync {
    /// Samples both ends of every link.
    async fn sample(&self) -> VerifyResult<Vec<LinkPair>>;
}

/// Samples the same port labels on two peers.
#[derive(Clone)]
pub struct PeerLinks {
    a: Peer,
    b: Peer,
    ports: Vec<String>,
}

impl PeerLinks {
    /// Creates a sampler for `ports` on both peers.
    pub fn new(a: Peer, b: Peer, ports: Vec<String>) -> Self {
        Self { a, b, ports }
    }
}

#[async_trait]
impl LinkPairProvider for PeerLinks {
    async fn sample(&self) -> VerifyResult<Vec<LinkPair>> {
        let config_a = self.a.lacp_configuration().await?;
        let config_b = self.b.lacp_configuration().await?;

        let mut pairs = Vec::with_capacity(self.ports.len());
        for port in &self.ports {
            let a = self.a.lacp_interface_state(port).await?;
            let b = self.b.lacp_interface_state(port).await?;
            pairs.push(LinkPair {
                port: port.clone(),
                a: PeerSample {
                    device: self.a.name().to_string(),
                    configured_system_id: config_a.system_id.clone(),
                    snapshot: a,
                },
                b: PeerSample {
                    device: self.b.name().to_string(),
                    configured_system_id: config_b.system_id.clone(),
                    snapshot: b,
                },
            });
        }
        Ok(pairs)
    }
}

/// A successful convergence poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceReport {
    /// Modes the links converged in.
    pub modes: LinkModes,
    /// Links validated.
    pub links: usize,
    /// Poll attempts used.
    pub attempts: u32,
    /// Time spent polling.
    pub elapsed: Duration,
}

/// Result of a convergence poll.
pub type ConvergenceResult = VerifyResult<ConvergenceReport>;

/// Polls `provider` until every link validates under `modes`.
///
/// Both peers are sampled before any comparison in each attempt, and only
/// one attempt runs at a time.
pub async fn poll_until_converged<P>(
    poller: &RetryPoller,
    provider: &P,
    validator: &CrossPeerValidator,
    modes: LinkModes,
    policy: &RetryPolicy,
) -> ConvergenceResult
where
    P: LinkPairProvider + ?Sized,
{
    modes.dynamic()?;

    let outcome = poller
        .retry(policy, move || async move {
            let pairs = provider.sample().await?;
            if pairs.is_empty() {
                return Err(VerifyError::invalid_config("ports", "no links to verify"));
            }
            validator.validate_all(&pairs, modes)?;
            Ok(pairs.len())
        })
        .await?;

    info!(
        modes = %modes,
        links = outcome.value,
        attempts = outcome.attempts,
        elapsed = ?outcome.elapsed,
        "LACP state converged"
    );

    Ok(ConvergenceReport {
        modes,
        links: outcome.value,
        attempts: outcome.attempts,
        elapsed: outcome.elapsed,
    })
}

/// Lifecycle state of the LAG under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagState {
    /// Static LAG (or no LAG at all).
    StaticOff,
    /// Dynamic modes issued, convergence not yet confirmed.
    Transitioning(LinkModes),
    /// Both ends negotiated a single LACP session.
    Converged(LinkModes),
}

impl fmt::Display for LagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LagState::StaticOff => write!(f, "static"),
            LagState::Transitioning(modes) => write!(f, "transitioning to {}", modes),
            LagState::Converged(modes) => write!(f, "converged ({})", modes),
        }
    }
}

/// Drives one LAG between two peers through its mode lifecycle.
pub struct LagOrchestrator {
    lag_id: String,
    peers: [Peer; 2],
    ports: Vec<String>,
    rate: LacpRate,
    budgets: BudgetsConfig,
    poller: RetryPoller,
    validator: CrossPeerValidator,
    state: LagState,
}

impl LagOrchestrator {
    /// Creates an orchestrator for the LAG described by `config`.
    pub fn new(a: Peer, b: Peer, config: &ConvergenceConfig) -> Self {
        Self {
            lag_id: config.lag.id.clone(),
            peers: [a, b],
            ports: config.lag.ports.clone(),
            rate: config.lag.rate,
            budgets: config.budgets.clone(),
            poller: config.poller(),
            validator: CrossPeerValidator::new(config.mode_table()),
            state: LagState::StaticOff,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LagState {
        self.state
    }

    /// LAG identifier.
    pub fn lag_id(&self) -> &str {
        &self.lag_id
    }

    /// Member ports.
    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    fn links(&self) -> PeerLinks {
        let [a, b] = &self.peers;
        PeerLinks::new(a.clone(), b.clone(), self.ports.clone())
    }

    /// Polls the LAG's links until they validate under `modes`.
    pub async fn await_convergence(
        &self,
        modes: LinkModes,
        policy: &RetryPolicy,
    ) -> ConvergenceResult {
        poll_until_converged(&self.poller, &self.links(), &self.validator, modes, policy).await
    }

    /// Enables the member ports on both peers and waits for link up.
    #[instrument(skip(self), fields(lag = %self.lag_id))]
    pub async fn enable_interfaces(&self) -> VerifyResult<()> {
        self.set_links(true).await
    }

    /// Disables the member ports on both peers and waits for link down.
    #[instrument(skip(self), fields(lag = %self.lag_id))]
    pub async fn disable_interfaces(&self) -> VerifyResult<()> {
        self.set_links(false).await
    }

    async fn set_links(&self, enabled: bool) -> VerifyResult<()> {
        set_interfaces_enabled(&self.peers, &self.ports, enabled).await?;

        let description = if enabled {
            "Ensure interfaces are turned on"
        } else {
            "Ensure interfaces are turned off"
        };
        let policy = self
            .budgets
            .interfaces
            .policy(description, "Interfaces not yet ready");
        let (peers, ports) = (&self.peers, &self.ports);
        self.poller
            .retry(&policy, move || verify_interfaces(peers, ports, enabled))
            .await?;
        Ok(())
    }

    async fn verify_config(&self, modes: LinkModes) -> VerifyResult<()> {
        for (peer, mode) in self.peers.iter().zip([modes.a, modes.b]) {
            let expected = ExpectedLag {
                lag_id: &self.lag_id,
                members: &self.ports,
                rate: self.rate,
                mode,
            };
            verify_lag_config(peer.as_ref(), &expected).await?;
        }
        Ok(())
    }

    /// Creates a static LAG on both peers and waits for it to settle.
    #[instrument(skip(self), fields(lag = %self.lag_id))]
    pub async fn configure_static(&mut self) -> ConvergenceResult {
        if self.state != LagState::StaticOff {
            return Err(self.invalid("configure a static LAG"));
        }

        for peer in &self.peers {
            peer.create_lag(&self.lag_id, LacpMode::Off).await?;
            peer.set_lag_rate(&self.lag_id, self.rate).await?;
            for port in &self.ports {
                peer.add_lag_member(&self.lag_id, port).await?;
            }
        }
        self.verify_config(LinkModes::static_off()).await?;

        let policy = self
            .budgets
            .static_convergence
            .policy(VERIFY_LACP_STEP, "Configuration not yet applied");
        self.await_convergence(LinkModes::static_off(), &policy).await
    }

    /// Switches both peers to LACP and waits for negotiation.
    ///
    /// `roles` gives the mode of each peer; both must be dynamic and at
    /// least one active. A failed poll leaves the LAG `Transitioning`, from
    /// where the transition may be issued again.
    #[instrument(skip(self), fields(lag = %self.lag_id))]
    pub async fn transition_to_dynamic(&mut self, roles: LinkModes) -> ConvergenceResult {
        match self.state {
            LagState::StaticOff | LagState::Transitioning(_) => {}
            LagState::Converged(_) => return Err(self.invalid("change LACP mode")),
        }
        if !roles.dynamic()? || (roles.a != LacpMode::Active && roles.b != LacpMode::Active) {
            return Err(VerifyError::InvalidModePair {
                a: roles.a.to_string(),
                b: roles.b.to_string(),
            });
        }

        info!("Transition {} -> {}", self.state, LagState::Transitioning(roles));
        self.state = LagState::Transitioning(roles);

        for (peer, mode) in self.peers.iter().zip([roles.a, roles.b]) {
            peer.set_lag_mode(&self.lag_id, mode).await?;
        }
        self.verify_config(roles).await?;

        let policy = self
            .budgets
            .dynamic_convergence
            .policy(VERIFY_LACP_STEP, "Retry to make sure negotiation took place");
        let report = self.await_convergence(roles, &policy).await?;

        self.state = LagState::Converged(roles);
        info!("LAG {} is {}", self.lag_id, self.state);
        Ok(report)
    }

    /// Takes the member links down and back up, then confirms negotiation
    /// re-establishes within `budget` without a mode change.
    ///
    /// The LAG is `Transitioning` while the links cycle and stays there if
    /// any step fails.
    #[instrument(skip(self), fields(lag = %self.lag_id))]
    pub async fn cycle_links(&mut self, budget: BudgetConfig) -> ConvergenceResult {
        let LagState::Converged(modes) = self.state else {
            return Err(self.invalid("cycle links"));
        };
        self.state = LagState::Transitioning(modes);

        self.disable_interfaces().await?;
        self.enable_interfaces().await?;

        let policy = budget.policy(VERIFY_LACP_STEP, "Negotiation not yet re-established");
        let report = self.await_convergence(modes, &policy).await?;

        self.state = LagState::Converged(modes);
        Ok(report)
    }

    /// Deletes the LAG on both peers.
    #[instrument(skip(self), fields(lag = %self.lag_id))]
    pub async fn teardown(&mut self) -> VerifyResult<()> {
        for peer in &self.peers {
            peer.delete_lag(&self.lag_id).await?;
        }
        info!("Transition {} -> {}", self.state, LagState::StaticOff);
        self.state = LagState::StaticOff;
        Ok(())
    }

    fn invalid(&self, operation: &str) -> VerifyError {
        VerifyError::InvalidTransition {
            operation: operation.to_string(),
            state: self.state.to_string(),
        }
    }
}
