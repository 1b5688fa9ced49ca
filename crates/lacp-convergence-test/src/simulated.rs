//! Simulated pair of switches.
//!
//! Port `N` on one switch is cabled to port `N` on the other. A link is up
//! when both ends are administratively enabled. Static LAG members are in
//! sync as soon as the link is up and the far end is a static member too.
//! Dynamic members negotiate only after the fabric has been quiet for the
//! configured negotiation delay (LAG changes) and relink delay (interface
//! changes), measured with tokio's clock so paused-time tests stay
//! deterministic. Both switches advertise the same operational key on
//! dynamic LAGs, regardless of the LAG id.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use lacp_convergence::{
    InterfaceState, LacpConfiguration, LacpDevice, LacpMode, LacpRate, LagConfiguration, Peer,
    StateFlags, StateSnapshot, SyncFlags, VerifyError, VerifyResult,
};

use crate::verification::CommandVerifier;

const DEFAULT_KEY: &str = "1";
const DEFAULT_PRIORITY: &str = "65534";

#[derive(Debug)]
struct SwitchState {
    name: String,
    system_id: String,
    system_priority: String,
    port_priority: String,
    key: String,
    lags: BTreeMap<String, LagConfiguration>,
    admin_up: BTreeSet<String>,
    reject_patterns: Vec<String>,
    commands: Vec<String>,
    lacp_queries: u32,
}

impl SwitchState {
    fn new(name: &str, system_id: &str) -> Self {
        Self {
            name: name.to_string(),
            system_id: system_id.to_string(),
            system_priority: DEFAULT_PRIORITY.to_string(),
            port_priority: DEFAULT_PRIORITY.to_string(),
            key: DEFAULT_KEY.to_string(),
            lags: BTreeMap::new(),
            admin_up: BTreeSet::new(),
            reject_patterns: Vec::new(),
            commands: Vec::new(),
            lacp_queries: 0,
        }
    }

    fn lag_of(&self, port: &str) -> Option<(&String, &LagConfiguration)> {
        self.lags.iter().find(|(_, lag)| lag.members.contains(port))
    }

    fn lag_mut(&mut self, lag_id: &str) -> VerifyResult<&mut LagConfiguration> {
        let name = self.name.clone();
        self.lags.get_mut(lag_id).ok_or_else(|| {
            VerifyError::device_command(name, format!("lag {}", lag_id), "no such LAG")
        })
    }
}

#[derive(Debug)]
struct FabricState {
    switches: [SwitchState; 2],
    negotiation_delay: Duration,
    relink_delay: Duration,
    lag_changed: Option<Instant>,
    link_changed: Option<Instant>,
}

impl FabricState {
    fn link_up(&self, port: &str) -> bool {
        self.switches.iter().all(|sw| sw.admin_up.contains(port))
    }

    fn settled(&self, now: Instant) -> bool {
        let quiet = |changed: Option<Instant>, delay: Duration| {
            changed.map_or(true, |at| now >= at + delay)
        };
        quiet(self.lag_changed, self.negotiation_delay)
            && quiet(self.link_changed, self.relink_delay)
    }

    fn snapshot(&self, index: usize, port: &str, now: Instant) -> StateSnapshot {
        let (me, peer) = (&self.switches[index], &self.switches[1 - index]);
        let Some((lag_id, lag)) = me.lag_of(port) else {
            return StateSnapshot::default();
        };
        let peer_mode = peer.lag_of(port).map(|(_, lag)| lag.mode);
        let link_up = self.link_up(port);

        if !lag.mode.is_dynamic() {
            let synced = link_up && peer_mode == Some(LacpMode::Off);
            let flags = StateFlags {
                static_sync: synced,
                ..Default::default()
            };
            return StateSnapshot {
                lag_id: lag_id.clone(),
                sync: SyncFlags {
                    local: flags,
                    remote: flags,
                },
                ..Default::default()
            };
        }

        let peer_active = peer_mode == Some(LacpMode::Active);
        let negotiated = link_up
            && peer_mode.is_some_and(|mode| mode.is_dynamic())
            && (lag.mode == LacpMode::Active || peer_active)
            && self.settled(now);

        StateSnapshot {
            lag_id: lag_id.clone(),
            key: me.key.clone(),
            priority: me.port_priority.clone(),
            system_id: me.system_id.clone(),
            system_priority: me.system_priority.clone(),
            partner_id: if negotiated {
                peer.system_id.clone()
            } else {
                String::new()
            },
            sync: SyncFlags {
                local: StateFlags {
                    activity: lag.mode == LacpMode::Active,
                    in_sync: negotiated,
                    static_sync: false,
                },
                remote: StateFlags {
                    activity: negotiated && peer_active,
                    in_sync: negotiated,
                    static_sync: false,
                },
            },
        }
    }
}

/// Two simulated switches, `sw1` and `sw2`, cabled port to port.
#[derive(Clone)]
pub struct SimulatedFabric {
    state: Arc<Mutex<FabricState>>,
}

impl SimulatedFabric {
    /// Creates a fabric whose switches advertise the given system ids.
    pub fn pair(system_a: &str, system_b: &str) -> Self {
        let state = FabricState {
            switches: [
                SwitchState::new("sw1", system_a),
                SwitchState::new("sw2", system_b),
            ],
            negotiation_delay: Duration::ZERO,
            relink_delay: Duration::ZERO,
            lag_changed: None,
            link_changed: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Time LACP needs to negotiate after any LAG change.
    pub fn with_negotiation_delay(self, delay: Duration) -> Self {
        self.state.lock().negotiation_delay = delay;
        self
    }

    /// Time LACP needs to renegotiate after any interface change.
    pub fn with_relink_delay(self, delay: Duration) -> Self {
        self.state.lock().relink_delay = delay;
        self
    }

    /// Device handle for switch `index` (0 or 1).
    pub fn switch(&self, index: usize) -> Peer {
        let name = self.state.lock().switches[index].name.clone();
        Arc::new(SimulatedSwitch {
            index,
            name,
            state: Arc::clone(&self.state),
        })
    }

    /// Device handles for both switches.
    pub fn peers(&self) -> (Peer, Peer) {
        (self.switch(0), self.switch(1))
    }

    /// Operational key both switches advertise on dynamic LAGs.
    pub fn with_key(self, key: &str) -> Self {
        for switch in self.state.lock().switches.iter_mut() {
            switch.key = key.to_string();
        }
        self
    }

    /// Makes switch `index` advertise `key`.
    pub fn set_key(&self, index: usize, key: &str) {
        self.state.lock().switches[index].key = key.to_string();
    }

    /// Makes switch `index` reject every command containing `pattern`.
    pub fn reject_commands(&self, index: usize, pattern: &str) {
        self.state.lock().switches[index]
            .reject_patterns
            .push(pattern.to_string());
    }

    /// Lifts every rejection set with [`SimulatedFabric::reject_commands`].
    pub fn accept_all_commands(&self, index: usize) {
        self.state.lock().switches[index].reject_patterns.clear();
    }

    /// Commands switch `index` accepted, in order.
    pub fn commands(&self, index: usize) -> Vec<String> {
        self.state.lock().switches[index].commands.clone()
    }

    /// Command verifier over switch `index`.
    pub fn verifier(&self, index: usize) -> CommandVerifier {
        CommandVerifier::new(self.commands(index))
    }

    /// Number of LACP interface state reads served by switch `index`.
    pub fn lacp_queries(&self, index: usize) -> u32 {
        self.state.lock().switches[index].lacp_queries
    }
}

/// One switch of a [`SimulatedFabric`].
pub struct SimulatedSwitch {
    index: usize,
    name: String,
    state: Arc<Mutex<FabricState>>,
}

impl SimulatedSwitch {
    fn command<F>(&self, command: String, apply: F) -> VerifyResult<()>
    where
        F: FnOnce(&mut FabricState, usize) -> VerifyResult<()>,
    {
        let mut state = self.state.lock();
        let switch = &state.switches[self.index];
        if switch
            .reject_patterns
            .iter()
            .any(|pattern| command.contains(pattern.as_str()))
        {
            return Err(VerifyError::device_command(&self.name, command, "rejected"));
        }

        apply(&mut *state, self.index)?;
        debug!(device = %self.name, command = %command, "Applied");
        state.switches[self.index].commands.push(command);
        Ok(())
    }

    fn lag_command<F>(&self, command: String, apply: F) -> VerifyResult<()>
    where
        F: FnOnce(&mut SwitchState) -> VerifyResult<()>,
    {
        self.command(command, |state, index| {
            apply(&mut state.switches[index])?;
            state.lag_changed = Some(Instant::now());
            Ok(())
        })
    }
}

#[async_trait]
impl LacpDevice for SimulatedSwitch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lacp_configuration(&self) -> VerifyResult<LacpConfiguration> {
        let state = self.state.lock();
        let switch = &state.switches[self.index];
        Ok(LacpConfiguration {
            system_id: switch.system_id.clone(),
            system_priority: switch.system_priority.clone(),
        })
    }

    async fn lacp_interface_state(&self, port: &str) -> VerifyResult<StateSnapshot> {
        let mut state = self.state.lock();
        state.switches[self.index].lacp_queries += 1;
        Ok(state.snapshot(self.index, port, Instant::now()))
    }

    async fn set_lag_mode(&self, lag_id: &str, mode: LacpMode) -> VerifyResult<()> {
        self.lag_command(format!("lag {} lacp mode {}", lag_id, mode), |sw| {
            sw.lag_mut(lag_id)?.mode = mode;
            Ok(())
        })
    }

    async fn create_lag(&self, lag_id: &str, mode: LacpMode) -> VerifyResult<()> {
        let command = format!("create lag {} mode {}", lag_id, mode);
        self.lag_command(command.clone(), |sw| {
            if sw.lags.contains_key(lag_id) {
                return Err(VerifyError::device_command(
                    &sw.name,
                    command,
                    "LAG already exists",
                ));
            }
            sw.lags.insert(
                lag_id.to_string(),
                LagConfiguration {
                    mode,
                    rate: LacpRate::default(),
                    members: BTreeSet::new(),
                },
            );
            Ok(())
        })
    }

    async fn delete_lag(&self, lag_id: &str) -> VerifyResult<()> {
        self.lag_command(format!("no lag {}", lag_id), |sw| {
            sw.lag_mut(lag_id)?;
            sw.lags.remove(lag_id);
            Ok(())
        })
    }

    async fn set_lag_rate(&self, lag_id: &str, rate: LacpRate) -> VerifyResult<()> {
        self.lag_command(format!("lag {} lacp rate {}", lag_id, rate), |sw| {
            sw.lag_mut(lag_id)?.rate = rate;
            Ok(())
        })
    }

    async fn add_lag_member(&self, lag_id: &str, port: &str) -> VerifyResult<()> {
        let command = format!("interface {} lag {}", port, lag_id);
        self.lag_command(command.clone(), |sw| {
            if let Some((other, _)) = sw.lag_of(port) {
                if other != lag_id {
                    let message = format!("port already in lag {}", other);
                    return Err(VerifyError::device_command(&sw.name, command, message));
                }
            }
            sw.lag_mut(lag_id)?.members.insert(port.to_string());
            Ok(())
        })
    }

    async fn remove_lag_member(&self, lag_id: &str, port: &str) -> VerifyResult<()> {
        self.lag_command(format!("interface {} no lag {}", port, lag_id), |sw| {
            sw.lag_mut(lag_id)?.members.remove(port);
            Ok(())
        })
    }

    async fn lag_configuration(&self, lag_id: &str) -> VerifyResult<Option<LagConfiguration>> {
        Ok(self.state.lock().switches[self.index]
            .lags
            .get(lag_id)
            .cloned())
    }

    async fn set_interface_enabled(&self, port: &str, enabled: bool) -> VerifyResult<()> {
        let action = if enabled { "no shutdown" } else { "shutdown" };
        self.command(format!("interface {} {}", port, action), |state, index| {
            let admin_up = &mut state.switches[index].admin_up;
            if enabled {
                admin_up.insert(port.to_string());
            } else {
                admin_up.remove(port);
            }
            state.link_changed = Some(Instant::now());
            Ok(())
        })
    }

    async fn interface_state(&self, port: &str) -> VerifyResult<InterfaceState> {
        let state = self.state.lock();
        Ok(InterfaceState {
            admin_up: state.switches[self.index].admin_up.contains(port),
            link_up: state.link_up(port),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SYS_A: &str = "70:72:cf:00:00:01";
    const SYS_B: &str = "70:72:cf:00:00:02";

    async fn dynamic_lag(fabric: &SimulatedFabric, modes: [LacpMode; 2]) {
        for (index, mode) in modes.into_iter().enumerate() {
            let sw = fabric.switch(index);
            sw.create_lag("1", mode).await.unwrap();
            sw.add_lag_member("1", "2").await.unwrap();
            sw.set_interface_enabled("2", true).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_needs_both_ends() {
        let fabric = SimulatedFabric::pair(SYS_A, SYS_B);
        let (sw1, sw2) = fabric.peers();

        sw1.set_interface_enabled("2", true).await.unwrap();
        let state = sw1.interface_state("2").await.unwrap();
        assert!(state.admin_up);
        assert!(!state.link_up);

        sw2.set_interface_enabled("2", true).await.unwrap();
        assert!(sw1.interface_state("2").await.unwrap().link_up);
        assert!(sw2.interface_state("2").await.unwrap().link_up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiation_waits_for_delay() {
        let fabric = SimulatedFabric::pair(SYS_A, SYS_B)
            .with_negotiation_delay(Duration::from_secs(10));
        dynamic_lag(&fabric, [LacpMode::Active, LacpMode::Passive]).await;
        let (sw1, sw2) = fabric.peers();

        let early = sw2.lacp_interface_state("2").await.unwrap();
        assert!(early.is_member());
        assert!(early.partner_id.is_empty());
        assert!(!early.sync.local.in_sync);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let a = sw1.lacp_interface_state("2").await.unwrap();
        let b = sw2.lacp_interface_state("2").await.unwrap();
        assert_eq!(a.partner_id, SYS_B);
        assert_eq!(b.partner_id, SYS_A);
        assert_eq!(a.key, "1");
        assert!(a.sync.local.activity);
        assert!(!a.sync.remote.activity);
        assert!(!b.sync.local.activity);
        assert!(b.sync.remote.activity);
        assert_eq!(fabric.lacp_queries(1), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_does_not_follow_lag_id() {
        let fabric = SimulatedFabric::pair(SYS_A, SYS_B);
        let sw = fabric.switch(0);
        sw.create_lag("5", LacpMode::Active).await.unwrap();
        sw.add_lag_member("5", "2").await.unwrap();

        let snapshot = sw.lacp_interface_state("2").await.unwrap();
        assert_eq!(snapshot.lag_id, "5");
        assert_eq!(snapshot.key, "1");

        let fabric = fabric.with_key("7");
        let snapshot = fabric.switch(1).lacp_interface_state("2").await.unwrap();
        assert!(!snapshot.is_member());
        assert_eq!(sw.lacp_interface_state("2").await.unwrap().key, "7");
    }

    #[tokio::test(start_paused = true)]
    async fn test_passive_pair_never_negotiates() {
        let fabric = SimulatedFabric::pair(SYS_A, SYS_B);
        dynamic_lag(&fabric, [LacpMode::Passive, LacpMode::Passive]).await;

        let snapshot = fabric.switch(0).lacp_interface_state("2").await.unwrap();
        assert!(!snapshot.sync.local.in_sync);
        assert!(snapshot.partner_id.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_member_reports_nothing_but_sync() {
        let fabric = SimulatedFabric::pair(SYS_A, SYS_B);
        dynamic_lag(&fabric, [LacpMode::Off, LacpMode::Off]).await;

        let snapshot = fabric.switch(0).lacp_interface_state("2").await.unwrap();
        assert_eq!(snapshot.lag_id, "1");
        assert!(snapshot.key.is_empty());
        assert!(snapshot.system_id.is_empty());
        assert!(snapshot.sync.local.static_sync);
        assert!(snapshot.sync.remote.static_sync);
    }

    #[tokio::test]
    async fn test_rejected_command_not_recorded() {
        let fabric = SimulatedFabric::pair(SYS_A, SYS_B);
        fabric.reject_commands(0, "create lag");

        let err = fabric
            .switch(0)
            .create_lag("1", LacpMode::Off)
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::DeviceCommand { .. }));
        assert!(fabric.commands(0).is_empty());
    }

    #[tokio::test]
    async fn test_lag_commands_validate_state() {
        let fabric = SimulatedFabric::pair(SYS_A, SYS_B);
        let sw = fabric.switch(0);

        assert!(sw.set_lag_mode("1", LacpMode::Active).await.is_err());
        sw.create_lag("1", LacpMode::Off).await.unwrap();
        assert!(sw.create_lag("1", LacpMode::Off).await.is_err());
        sw.create_lag("2", LacpMode::Off).await.unwrap();
        sw.add_lag_member("1", "3").await.unwrap();
        assert!(sw.add_lag_member("2", "3").await.is_err());

        sw.set_lag_rate("1", LacpRate::Fast).await.unwrap();
        let config = sw.lag_configuration("1").await.unwrap().unwrap();
        assert_eq!(config.rate, LacpRate::Fast);

        sw.delete_lag("1").await.unwrap();
        assert!(sw.lag_configuration("1").await.unwrap().is_none());
        assert!(!sw.lacp_interface_state("3").await.unwrap().is_member());
        assert_eq!(
            fabric.commands(0),
            vec![
                "create lag 1 mode off",
                "create lag 2 mode off",
                "interface 3 lag 1",
                "lag 1 lacp rate fast",
                "no lag 1",
            ]
        );
    }
}
