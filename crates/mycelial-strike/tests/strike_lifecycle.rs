//! End-to-end strike lifecycle against a real RocksDB store.

use mycelial_strike::{
    AbuseType, ActivityDelta, DeescalationReason, DefenseEngine, Error, Evidence, FixedTrust,
    GateOutcome, NewAlert, NewWhitelist, OverrideAction, Severity, Storage, StoredTrust,
    StrikeStatus, ThrottleActions, ThrottleLevel, WarlordAlert, WhitelistScope,
};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn engine_with_trust(trust: f64) -> (TempDir, DefenseEngine) {
    let dir = tempdir().unwrap();
    let storage = Arc::new(Storage::open(dir.path()).unwrap());
    (dir, DefenseEngine::new(storage, Arc::new(FixedTrust(trust))))
}

fn new_alert(target: &str, severity: i64, abuse_type: AbuseType) -> NewAlert {
    NewAlert {
        target_user_id: target.into(),
        severity,
        abuse_type,
        evidence: vec![Evidence::new("exchange-ratio", "received 18, gave 1 in 30 days", 0.88)],
        reporting_node_fingerprint: "node-a".into(),
        reporting_user_id: Some("reporter-1".into()),
        trusted_source: true,
    }
}

fn exchanges(given: u64, received: u64) -> ActivityDelta {
    ActivityDelta {
        exchanges_given: given,
        exchanges_received: received,
        ..ActivityDelta::default()
    }
}

#[test]
fn severity_boundaries() {
    let (_dir, engine) = engine_with_trust(0.9);
    let table = [
        (2, ThrottleLevel::Low),
        (3, ThrottleLevel::Medium),
        (4, ThrottleLevel::Medium),
        (5, ThrottleLevel::High),
        (7, ThrottleLevel::High),
        (8, ThrottleLevel::Critical),
        (10, ThrottleLevel::Critical),
    ];
    for (severity, level) in table {
        let alert = engine
            .create_warlord_alert(new_alert(&format!("user-{}", severity), severity, AbuseType::Spam))
            .unwrap();
        let outcome = engine.process_incoming_alert(alert, 0.9).unwrap();
        assert_eq!(outcome.strike().unwrap().throttle_level, level, "severity {}", severity);
    }
}

#[test]
fn create_alert_validation() {
    let (_dir, engine) = engine_with_trust(0.9);
    for bad in [0, 11] {
        assert!(matches!(
            engine.create_warlord_alert(new_alert("u1", bad, AbuseType::Spam)),
            Err(Error::Validation(_))
        ));
    }
    let mut empty = new_alert("u1", 5, AbuseType::Spam);
    empty.evidence.clear();
    assert!(matches!(engine.create_warlord_alert(empty), Err(Error::Validation(_))));

    let alert = engine.create_warlord_alert(new_alert("u1", 5, AbuseType::Spam)).unwrap();
    assert_eq!(alert.expires_at, alert.created_at + chrono::Duration::days(7));
}

#[test]
fn trust_gates_automatic_strikes() {
    let (_dir, engine) = engine_with_trust(0.9);
    let alert = engine
        .create_warlord_alert(new_alert("warlord", 6, AbuseType::ExtractionPattern))
        .unwrap();

    let held = engine.process_incoming_alert(alert.clone(), 0.3).unwrap();
    assert!(held.strike().is_none());
    assert!(engine.get_active_strikes("warlord").unwrap().is_empty());

    let enforced = engine.process_incoming_alert(alert.clone(), 0.9).unwrap();
    assert!(enforced.strike().is_some());

    let duplicate = engine.process_incoming_alert(alert, 0.9).unwrap();
    assert!(matches!(duplicate, GateOutcome::AlreadyHandled { .. }));
    assert_eq!(engine.get_active_strikes("warlord").unwrap().len(), 1);
}

#[test]
fn whitelisted_user_never_struck_automatically() {
    let (_dir, engine) = engine_with_trust(0.9);
    engine
        .whitelist_user(NewWhitelist {
            user_id: "organizer".into(),
            whitelisted_by: "steward-1".into(),
            reason: "holds batteries for the co-op".into(),
            scope: WhitelistScope::SpecificAbuseType(AbuseType::BatteryWarlord),
            is_permanent: false,
            duration_days: Some(90),
        })
        .unwrap();

    let alert = engine
        .create_warlord_alert(new_alert("organizer", 9, AbuseType::BatteryWarlord))
        .unwrap();
    assert_eq!(engine.ingest_alert(alert.clone()).unwrap(), GateOutcome::Whitelisted);
    assert!(engine.get_active_strikes("organizer").unwrap().is_empty());
    assert_eq!(engine.review_queue().unwrap()[0].id, alert.id);

    // A steward can still enforce by hand.
    let strike = engine.enforce_alert(&alert.id, "steward-2", "confirmed in person").unwrap();
    assert!(!strike.automatic);
    assert!(engine.review_queue().unwrap().is_empty());
}

#[test]
fn deescalation_walks_down_from_high() {
    let (_dir, engine) = engine_with_trust(0.9);
    let alert = engine
        .create_warlord_alert(new_alert("warlord", 6, AbuseType::ExtractionPattern))
        .unwrap();
    let strike = engine
        .activate_strike(&alert.id, "warlord", Severity::new(6).unwrap(), 3.0)
        .unwrap();
    assert_eq!(strike.throttle_level, ThrottleLevel::High);

    // Balanced exchanges: reciprocity 10, activity 0 -> score 7.0
    let first = engine.update_user_behavior("warlord", exchanges(2, 2)).unwrap();
    assert!((first.tracking.behavior_score - 7.0).abs() < 1e-9);
    assert_eq!(first.strikes[0].throttle_level, ThrottleLevel::Medium);

    let second = engine.update_user_behavior("warlord", exchanges(1, 1)).unwrap();
    assert_eq!(second.strikes[0].throttle_level, ThrottleLevel::Low);

    let third = engine.update_user_behavior("warlord", exchanges(1, 1)).unwrap();
    assert!(third.strikes[0].status == StrikeStatus::Deactivated);
    assert!(engine.get_active_strikes("warlord").unwrap().is_empty());

    let history = engine.deescalation_history(&strike.id).unwrap();
    let steps: Vec<_> = history.iter().map(|l| (l.previous_level, l.new_level)).collect();
    assert_eq!(
        steps,
        vec![
            (ThrottleLevel::High, Some(ThrottleLevel::Medium)),
            (ThrottleLevel::Medium, Some(ThrottleLevel::Low)),
            (ThrottleLevel::Low, None),
        ]
    );
    assert!(history.iter().all(|l| l.behavior_score_at_start == 3.0));

    // Further updates leave the ended strike alone.
    let after = engine.update_user_behavior("warlord", exchanges(1, 1)).unwrap();
    assert!(after.strikes.is_empty());
    assert_eq!(engine.deescalation_history(&strike.id).unwrap().len(), 3);
}

fn high_strike_with_baseline(engine: &DefenseEngine) -> String {
    let alert = engine
        .create_warlord_alert(new_alert("warlord", 6, AbuseType::ExtractionPattern))
        .unwrap();
    engine
        .activate_strike(&alert.id, "warlord", Severity::new(6).unwrap(), 3.0)
        .unwrap()
        .id
}

#[test]
fn concurrent_behavior_updates_match_serial_updates() {
    const UPDATES: usize = 3;

    let (_serial_dir, serial) = engine_with_trust(0.9);
    let serial_strike = high_strike_with_baseline(&serial);
    for _ in 0..UPDATES {
        serial.update_user_behavior("warlord", exchanges(2, 2)).unwrap();
    }

    let (_dir, engine) = engine_with_trust(0.9);
    let strike_id = high_strike_with_baseline(&engine);
    let handles: Vec<_> = (0..UPDATES)
        .map(|_| {
            let engine = engine.clone();
            std::thread::spawn(move || engine.update_user_behavior("warlord", exchanges(2, 2)).unwrap())
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let expected = serial.get_strike(&serial_strike).unwrap().unwrap();
    let actual = engine.get_strike(&strike_id).unwrap().unwrap();
    assert_eq!(expected.status, StrikeStatus::Deactivated);
    assert_eq!(actual.status, expected.status);
    assert_eq!(actual.throttle_level, expected.throttle_level);

    let expected_logs = serial.deescalation_history(&serial_strike).unwrap();
    let logs = engine.deescalation_history(&strike_id).unwrap();
    assert_eq!(logs.len(), UPDATES);
    assert_eq!(logs.len(), expected_logs.len());
    // Each step was taken from a fresh read: no level is stepped down twice.
    let mut from: Vec<_> = logs.iter().map(|l| l.previous_level).collect();
    from.sort();
    from.dedup();
    assert_eq!(from.len(), UPDATES);

    let tracking = engine.get_behavior("warlord").unwrap().unwrap();
    assert_eq!(tracking.exchanges_given, 2 * UPDATES as u64);
    assert_eq!(tracking.exchanges_received, 2 * UPDATES as u64);
}

#[test]
fn override_cancel_strike_logged_once() {
    let (_dir, engine) = engine_with_trust(0.9);
    let alert = engine
        .create_warlord_alert(new_alert("warlord", 8, AbuseType::Harassment))
        .unwrap();
    let strike = engine.ingest_alert(alert).unwrap().strike().cloned().unwrap();

    let result = engine
        .override_strike(&strike.id, "steward-1", OverrideAction::CancelStrike, "mistaken identity")
        .unwrap();
    assert_eq!(result.strike.status, StrikeStatus::Overridden);

    let retry = engine.override_strike(&strike.id, "steward-1", OverrideAction::CancelStrike, "again");
    assert!(matches!(retry, Err(Error::NotFound(_))));

    let logs = engine.override_history(&strike.id).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].overridden_by, "steward-1");
    assert_eq!(logs[0].reason, "mistaken identity");
    assert_eq!(logs[0].before_state.status, StrikeStatus::Active);
    assert_eq!(logs[0].after_state.status, StrikeStatus::Overridden);
}

#[test]
fn cancel_alert_deactivates_every_strike() {
    let (_dir, engine) = engine_with_trust(0.9);
    let alert = engine
        .create_warlord_alert(new_alert("warlord", 5, AbuseType::Exploitation))
        .unwrap();
    let sev = alert.severity;
    let a = engine.activate_strike(&alert.id, "warlord", sev, 4.0).unwrap();
    let b = engine.activate_strike(&alert.id, "warlord", sev, 4.0).unwrap();

    let outcome = engine.cancel_alert(&alert.id, "steward-1", "report withdrawn").unwrap();
    let mut deactivated = outcome.deactivated_strikes.clone();
    deactivated.sort();
    let mut expected = vec![a.id.clone(), b.id.clone()];
    expected.sort();
    assert_eq!(deactivated, expected);
    assert!(engine.get_active_strikes("warlord").unwrap().is_empty());
    for id in [&a.id, &b.id] {
        let logs = engine.deescalation_history(id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].trigger_reason, DeescalationReason::AlertCancelled);
    }

    let again = engine.cancel_alert(&alert.id, "steward-1", "report withdrawn").unwrap();
    assert!(again.already_cancelled);
    assert!(again.deactivated_strikes.is_empty());
    assert_eq!(engine.deescalation_history(&a.id).unwrap().len(), 1);
}

#[test]
fn create_activate_read_round_trip() {
    let (_dir, engine) = engine_with_trust(0.9);
    let alert = engine
        .create_warlord_alert(new_alert("warlord", 7, AbuseType::ExtractionPattern))
        .unwrap();
    engine.ingest_alert(alert.clone()).unwrap();

    let active = engine.get_active_strikes("warlord").unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].alert_id, alert.id);
    assert_eq!(active[0].throttle_actions, ThrottleActions::for_level(ThrottleLevel::High));

    let status = engine.get_strike_status("warlord").unwrap();
    assert!(status.under_strike);
    assert_eq!(status.alerts.len(), 1);
    assert!(!status.improvement_actions.is_empty());
    let json = serde_json::to_string(&status).unwrap();
    assert!(!json.contains("node-a"));
    assert!(!json.contains("reporter-1"));
}

#[test]
fn stale_and_cancelled_deliveries_are_no_ops() {
    let (_dir, engine) = engine_with_trust(0.9);
    let now = chrono::Utc::now();
    let old = now - chrono::Duration::days(10);
    let stale = WarlordAlert {
        id: "remote-1".into(),
        target_user_id: "warlord".into(),
        severity: Severity::new(9).unwrap(),
        abuse_type: AbuseType::Spam,
        evidence: vec![Evidence::new("listing-flood", "140 listings in one day", 0.7)],
        reporting_node_fingerprint: "node-z".into(),
        reporting_user_id: None,
        trusted_source: false,
        propagation_count: 4,
        created_at: old,
        expires_at: WarlordAlert::expiry_for(old),
        cancelled: false,
        cancelled_by: None,
        cancellation_reason: None,
        cancelled_at: None,
    };
    assert_eq!(engine.process_incoming_alert(stale, 0.95).unwrap(), GateOutcome::Expired);
    assert_eq!(engine.review_queue().unwrap().len(), 1);
    assert!(engine.get_alert("remote-1").unwrap().is_some());
    assert!(engine.strike_history("warlord").unwrap().is_empty());
}

#[test]
fn stored_trust_drives_ingestion() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(Storage::open(dir.path()).unwrap());
    storage.set_trust("node-trusted", 0.8).unwrap();
    let trust = StoredTrust::new(Arc::clone(&storage), 0.5);
    let engine = DefenseEngine::new(storage, Arc::new(trust));

    let mut unknown = new_alert("u1", 4, AbuseType::Spam);
    unknown.reporting_node_fingerprint = "node-unknown".into();
    let alert = engine.create_warlord_alert(unknown).unwrap();
    assert!(matches!(engine.ingest_alert(alert).unwrap(), GateOutcome::LowTrust { .. }));

    let mut trusted = new_alert("u1", 4, AbuseType::Spam);
    trusted.reporting_node_fingerprint = "node-trusted".into();
    let alert = engine.create_warlord_alert(trusted).unwrap();
    assert!(engine.ingest_alert(alert).unwrap().strike().is_some());
}
