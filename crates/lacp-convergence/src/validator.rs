//! Cross-peer validation of LACP state.
//!
//! Validation is a relation over two independently sampled snapshots of the
//! same link. Every check runs in both directions, A against B and B
//! against A, and the first violated invariant is reported.
//!
//! | Field | Static LAG | Dynamic LAG |
//! |-------|------------|-------------|
//! | `lag_id` | non-empty, equal on both ends | same |
//! | `key`, `priority`, `system_priority` | empty | mode default, equal on both ends |
//! | `system_id` | empty | the switch's configured system id |
//! | `partner_id` | empty | the peer's `system_id` |
//! | flags | `static_sync` in both views | `in_sync` + `activity` cross-checked |

use tracing::debug;

use crate::error::{Relation, VerifyError, VerifyResult};
use crate::mode::{LacpMode, LinkModes, ModeDefaults, ModeTable};
use crate::snapshot::{LinkPair, StateView};

/// Checks the relational invariants between the two ends of a link.
#[derive(Debug, Clone, Default)]
pub struct CrossPeerValidator {
    table: ModeTable,
}

impl CrossPeerValidator {
    /// Creates a validator using the given defaults table.
    pub fn new(table: ModeTable) -> Self {
        Self { table }
    }

    /// Validates one link.
    ///
    /// # Errors
    ///
    /// * [`VerifyError::InvalidModePair`] - one end static, the other dynamic
    /// * [`VerifyError::NotYetMember`] - an end reports no LAG membership
    /// * [`VerifyError::FieldMismatch`] - the first field violating an invariant
    pub fn validate(&self, pair: &LinkPair, modes: LinkModes) -> VerifyResult<()> {
        let dynamic = modes.dynamic()?;

        for end in [&pair.a, &pair.b] {
            if !end.snapshot.is_member() {
                return Err(VerifyError::NotYetMember {
                    device: end.device.clone(),
                    port: pair.port.clone(),
                });
            }
        }
        if pair.a.snapshot.lag_id != pair.b.snapshot.lag_id {
            return Err(VerifyError::mismatch(
                &pair.port,
                "lag_id",
                Relation::SameLag,
                &pair.a.snapshot.lag_id,
                &pair.b.snapshot.lag_id,
            ));
        }

        let defaults = self.table.defaults(dynamic);
        let reversed = pair.reversed();
        for (link, mode) in [(pair, modes.a), (&reversed, modes.b)] {
            check_advertised(link, defaults)?;
            check_system_id(link, dynamic)?;
            if dynamic {
                check_partner_reference(link)?;
                check_dynamic_flags(link, mode)?;
            } else {
                check_static(link)?;
            }
        }

        debug!(port = %pair.port, modes = %modes, "Link state consistent");
        Ok(())
    }

    /// Validates every link, stopping at the first failure.
    pub fn validate_all(&self, pairs: &[LinkPair], modes: LinkModes) -> VerifyResult<()> {
        pairs.iter().try_for_each(|pair| self.validate(pair, modes))
    }
}

/// Key and priorities must equal the mode default and the peer's value.
///
/// Checking against the default as well as the peer catches two ends that
/// agree on a nonstandard value.
fn check_advertised(link: &LinkPair, defaults: &ModeDefaults) -> VerifyResult<()> {
    let (end, peer) = (&link.a.snapshot, &link.b.snapshot);
    let fields = [
        ("key", &end.key, &peer.key, &defaults.key),
        ("priority", &end.priority, &peer.priority, &defaults.port_priority),
        (
            "system_priority",
            &end.system_priority,
            &peer.system_priority,
            &defaults.system_priority,
        ),
    ];

    for (field, value, peer_value, default) in fields {
        if value != default || value != peer_value {
            return Err(VerifyError::mismatch(
                &link.port,
                field,
                Relation::DefaultAndPeer {
                    default: default.clone(),
                },
                value,
                peer_value,
            ));
        }
    }
    Ok(())
}

fn check_system_id(link: &LinkPair, dynamic: bool) -> VerifyResult<()> {
    let end = &link.a;
    let expected = if dynamic {
        end.configured_system_id.as_str()
    } else {
        ""
    };
    if end.snapshot.system_id != expected {
        return Err(VerifyError::mismatch(
            &link.port,
            "system_id",
            Relation::ConfiguredSystemId {
                expected: expected.to_string(),
            },
            &end.snapshot.system_id,
            expected,
        ));
    }
    Ok(())
}

/// B's view of its partner must be A's own identity.
fn check_partner_reference(link: &LinkPair) -> VerifyResult<()> {
    let (end, peer) = (&link.a.snapshot, &link.b.snapshot);
    if peer.partner_id.is_empty() || peer.partner_id != end.system_id {
        return Err(VerifyError::mismatch(
            &link.port,
            "partner_id",
            Relation::PartnerReference,
            &peer.partner_id,
            &end.system_id,
        ));
    }
    Ok(())
}

/// The actor's own flags and the peer's observation of them must agree.
fn check_dynamic_flags(link: &LinkPair, mode: LacpMode) -> VerifyResult<()> {
    let local = link.a.snapshot.sync.view(StateView::Local);
    let observed = link.b.snapshot.sync.view(StateView::Remote);

    if !local.in_sync {
        return Err(flag_mismatch(
            link,
            "local_sync",
            StateView::Local,
            "in_sync",
            local.in_sync,
            observed.in_sync,
        ));
    }
    if !observed.in_sync {
        return Err(flag_mismatch(
            link,
            "remote_sync",
            StateView::Remote,
            "in_sync",
            observed.in_sync,
            local.in_sync,
        ));
    }

    let active = mode == LacpMode::Active;
    if local.activity != active {
        return Err(VerifyError::mismatch(
            &link.port,
            "local_activity",
            Relation::FlagSet {
                view: StateView::Local.as_str(),
                flag: activity_flag(active),
            },
            local.activity.to_string(),
            active.to_string(),
        ));
    }
    if observed.activity != active {
        return Err(VerifyError::mismatch(
            &link.port,
            "remote_activity",
            Relation::FlagSet {
                view: StateView::Remote.as_str(),
                flag: activity_flag(active),
            },
            observed.activity.to_string(),
            local.activity.to_string(),
        ));
    }
    Ok(())
}

/// Static links advertise nothing and are in sync by convention.
fn check_static(link: &LinkPair) -> VerifyResult<()> {
    let (end, peer) = (&link.a.snapshot, &link.b.snapshot);
    if !end.partner_id.is_empty() {
        return Err(VerifyError::mismatch(
            &link.port,
            "partner_id",
            Relation::Empty,
            &end.partner_id,
            &peer.partner_id,
        ));
    }

    let views = [
        ("local_static", StateView::Local),
        ("remote_static", StateView::Remote),
    ];
    for (field, view) in views {
        let flags = end.sync.view(view);
        if !flags.static_sync {
            return Err(flag_mismatch(
                link,
                field,
                view,
                "static_sync",
                flags.static_sync,
                peer.sync.view(view).static_sync,
            ));
        }
    }
    Ok(())
}

fn flag_mismatch(
    link: &LinkPair,
    field: &str,
    view: StateView,
    flag: &'static str,
    value: bool,
    other: bool,
) -> VerifyError {
    VerifyError::mismatch(
        &link.port,
        field,
        Relation::FlagSet {
            view: view.as_str(),
            flag,
        },
        value.to_string(),
        other.to_string(),
    )
}

fn activity_flag(active: bool) -> &'static str {
    if active {
        "activity"
    } else {
        "!activity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{PeerSample, StateFlags, StateSnapshot, SyncFlags};
    use pretty_assertions::assert_eq;

    const SYS_A: &str = "70:72:cf:00:00:01";
    const SYS_B: &str = "70:72:cf:00:00:02";

    fn dynamic_end(
        system_id: &str,
        partner_id: &str,
        active: bool,
        partner_active: bool,
    ) -> StateSnapshot {
        StateSnapshot {
            lag_id: "lag1".to_string(),
            key: "1".to_string(),
            priority: "65534".to_string(),
            system_id: system_id.to_string(),
            system_priority: "65534".to_string(),
            partner_id: partner_id.to_string(),
            sync: SyncFlags {
                local: StateFlags {
                    activity: active,
                    in_sync: true,
                    static_sync: false,
                },
                remote: StateFlags {
                    activity: partner_active,
                    in_sync: true,
                    static_sync: false,
                },
            },
        }
    }

    fn static_end() -> StateSnapshot {
        let flags = StateFlags {
            activity: false,
            in_sync: false,
            static_sync: true,
        };
        StateSnapshot {
            lag_id: "lag1".to_string(),
            sync: SyncFlags {
                local: flags,
                remote: flags,
            },
            ..Default::default()
        }
    }

    fn link_pair(port: &str, a: PeerSample, b: PeerSample) -> LinkPair {
        LinkPair {
            port: port.to_string(),
            a,
            b,
        }
    }

    fn sample(device: &str, system_id: &str, snapshot: StateSnapshot) -> PeerSample {
        PeerSample {
            device: device.to_string(),
            configured_system_id: system_id.to_string(),
            snapshot,
        }
    }

    fn converged() -> LinkPair {
        link_pair(
            "2",
            sample("sw1", SYS_A, dynamic_end(SYS_A, SYS_B, true, false)),
            sample("sw2", SYS_B, dynamic_end(SYS_B, SYS_A, false, true)),
        )
    }

    fn active_passive() -> LinkModes {
        LinkModes::new(LacpMode::Active, LacpMode::Passive)
    }

    #[test]
    fn test_converged_dynamic_link() {
        let validator = CrossPeerValidator::default();
        let pair = converged();
        validator.validate(&pair, active_passive()).unwrap();
        // Same input, same answer.
        validator.validate(&pair, active_passive()).unwrap();
        validator
            .validate(&pair.reversed(), active_passive().reversed())
            .unwrap();
    }

    #[test]
    fn test_static_link() {
        let pair = link_pair(
            "2",
            sample("sw1", SYS_A, static_end()),
            sample("sw2", SYS_B, static_end()),
        );
        CrossPeerValidator::default()
            .validate(&pair, LinkModes::static_off())
            .unwrap();
    }

    #[test]
    fn test_key_mismatch() {
        let mut pair = converged();
        pair.b.snapshot.key = "2".to_string();

        let err = CrossPeerValidator::default()
            .validate(&pair, active_passive())
            .unwrap_err();
        let detail = err.field_mismatch().unwrap();
        assert_eq!(detail.field, "key");
        assert_eq!(detail.a, "1");
        assert_eq!(detail.b, "2");
        assert_eq!(detail.expected.to_string(), "match default/peer ('1')");
    }

    #[test]
    fn test_matching_nonstandard_key_rejected() {
        let mut pair = converged();
        pair.a.snapshot.key = "7".to_string();
        pair.b.snapshot.key = "7".to_string();

        let err = CrossPeerValidator::default()
            .validate(&pair, active_passive())
            .unwrap_err();
        assert_eq!(err.field_mismatch().unwrap().field, "key");
    }

    #[test]
    fn test_system_priority_mismatch() {
        let mut pair = converged();
        pair.b.snapshot.system_priority = "100".to_string();

        let err = CrossPeerValidator::default()
            .validate(&pair, active_passive())
            .unwrap_err();
        let detail = err.field_mismatch().unwrap();
        assert_eq!(detail.field, "system_priority");
        assert_eq!((detail.a.as_str(), detail.b.as_str()), ("65534", "100"));
    }

    #[test]
    fn test_not_yet_member() {
        let mut pair = converged();
        pair.b.snapshot = StateSnapshot::default();

        let err = CrossPeerValidator::default()
            .validate(&pair, active_passive())
            .unwrap_err();
        assert!(matches!(err, VerifyError::NotYetMember { ref device, .. } if device == "sw2"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_lag_id_mismatch() {
        let mut pair = converged();
        pair.b.snapshot.lag_id = "lag2".to_string();

        let err = CrossPeerValidator::default()
            .validate(&pair, active_passive())
            .unwrap_err();
        assert_eq!(err.field_mismatch().unwrap().field, "lag_id");
    }

    #[test]
    fn test_system_id_must_match_configuration() {
        let mut pair = converged();
        pair.a.configured_system_id = "70:72:cf:00:00:09".to_string();

        let err = CrossPeerValidator::default()
            .validate(&pair, active_passive())
            .unwrap_err();
        let detail = err.field_mismatch().unwrap();
        assert_eq!(detail.field, "system_id");
        assert_eq!(detail.a, SYS_A);
    }

    #[test]
    fn test_partner_reference() {
        let mut pair = converged();
        pair.b.snapshot.partner_id = String::new();

        let err = CrossPeerValidator::default()
            .validate(&pair, active_passive())
            .unwrap_err();
        let detail = err.field_mismatch().unwrap();
        assert_eq!(detail.field, "partner_id");
        assert_eq!(detail.b, SYS_A);
    }

    #[test]
    fn test_out_of_sync() {
        let mut pair = converged();
        pair.a.snapshot.sync.remote.in_sync = false;

        // A's view of B is stale, reported when checking B's actor state.
        let err = CrossPeerValidator::default()
            .validate(&pair, active_passive())
            .unwrap_err();
        assert_eq!(err.field_mismatch().unwrap().field, "remote_sync");
    }

    #[test]
    fn test_activity_follows_mode() {
        let pair = converged();
        let err = CrossPeerValidator::default()
            .validate(&pair, LinkModes::new(LacpMode::Passive, LacpMode::Passive))
            .unwrap_err();
        assert_eq!(err.field_mismatch().unwrap().field, "local_activity");
    }

    #[test]
    fn test_static_rejects_negotiated_values() {
        let mut pair = link_pair(
            "3",
            sample("sw1", SYS_A, static_end()),
            sample("sw2", SYS_B, static_end()),
        );
        pair.a.snapshot.system_id = SYS_A.to_string();

        let err = CrossPeerValidator::default()
            .validate(&pair, LinkModes::static_off())
            .unwrap_err();
        assert_eq!(err.field_mismatch().unwrap().field, "system_id");

        pair.a.snapshot.system_id.clear();
        pair.b.snapshot.partner_id = SYS_A.to_string();
        let err = CrossPeerValidator::default()
            .validate(&pair, LinkModes::static_off())
            .unwrap_err();
        assert_eq!(err.field_mismatch().unwrap().field, "partner_id");
    }

    #[test]
    fn test_static_sync_convention() {
        let mut pair = link_pair(
            "2",
            sample("sw1", SYS_A, static_end()),
            sample("sw2", SYS_B, static_end()),
        );
        pair.b.snapshot.sync.remote.static_sync = false;

        let err = CrossPeerValidator::default()
            .validate(&pair, LinkModes::static_off())
            .unwrap_err();
        assert_eq!(err.field_mismatch().unwrap().field, "remote_static");
    }

    #[test]
    fn test_mixed_modes_rejected() {
        let err = CrossPeerValidator::default()
            .validate(&converged(), LinkModes::new(LacpMode::Off, LacpMode::Active))
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidModePair { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validate_all_reports_first_failure() {
        let good = converged();
        let mut bad = converged();
        bad.port = "3".to_string();
        bad.a.snapshot.priority = "1".to_string();

        let err = CrossPeerValidator::default()
            .validate_all(&[good, bad], active_passive())
            .unwrap_err();
        assert_eq!(err.field_mismatch().unwrap().port, "3");
    }
}
