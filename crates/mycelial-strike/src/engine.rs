//! Defense engine - the one entry point a node holds.
//!
//! Wires the components over a shared store and trust provider, and takes the
//! target user's lock around every operation that changes a user's strikes or
//! behavior record. Deliveries first take a lock on the alert id, then the
//! user lock; nothing takes them in the other order. Components never lock on
//! their own.

use crate::alerts::{AlertManager, CancelOutcome, NewAlert};
use crate::behavior::{BehaviorTracker, BehaviorUpdate};
use crate::deescalation::DeescalationController;
use crate::error::{Error, Result};
use crate::gate::{GateOutcome, PropagationGate};
use crate::locks::UserLocks;
use crate::models::{
    ActivityDelta, BehaviorTracking, LocalStrike, OverrideAction, Severity, StrikeDeescalationLog,
    StrikeOverrideLog, UserStrikeWhitelist, WarlordAlert,
};
use crate::oversight::{NewWhitelist, OverrideResult, Oversight};
use crate::status::StrikeStatusView;
use crate::storage::Storage;
use crate::strikes::StrikeEngine;
use crate::trust::TrustProvider;
use std::sync::Arc;

#[derive(Clone)]
pub struct DefenseEngine {
    storage: Arc<Storage>,
    trust: Arc<dyn TrustProvider>,
    locks: Arc<UserLocks>,
    alert_locks: Arc<UserLocks>,
    alerts: AlertManager,
    strikes: StrikeEngine,
    behavior: BehaviorTracker,
    deescalation: DeescalationController,
    oversight: Oversight,
    gate: PropagationGate,
}

impl DefenseEngine {
    pub fn new(storage: Arc<Storage>, trust: Arc<dyn TrustProvider>) -> Self {
        let alerts = AlertManager::new(Arc::clone(&storage));
        let strikes = StrikeEngine::new(Arc::clone(&storage));
        let deescalation = DeescalationController::new(Arc::clone(&storage));
        let behavior = BehaviorTracker::new(Arc::clone(&storage), deescalation.clone());
        let oversight = Oversight::new(Arc::clone(&storage), alerts.clone(), strikes.clone());
        let gate = PropagationGate::new(
            Arc::clone(&storage),
            alerts.clone(),
            strikes.clone(),
            behavior.clone(),
            oversight.clone(),
        );

        Self {
            storage,
            trust,
            locks: Arc::new(UserLocks::new()),
            alert_locks: Arc::new(UserLocks::new()),
            alerts,
            strikes,
            behavior,
            deescalation,
            oversight,
            gate,
        }
    }

    // --- Alerts ---

    pub fn create_warlord_alert(&self, new: NewAlert) -> Result<WarlordAlert> {
        self.alerts.create_alert(new)
    }

    pub fn cancel_alert(&self, alert_id: &str, cancelled_by: &str, reason: &str) -> Result<CancelOutcome> {
        let target = self.alert_target(alert_id)?;
        self.locks
            .with_user(&target, || self.alerts.cancel_alert(alert_id, cancelled_by, reason))
    }

    pub fn get_alert(&self, alert_id: &str) -> Result<Option<WarlordAlert>> {
        self.alerts.get_alert(alert_id)
    }

    pub fn review_queue(&self) -> Result<Vec<WarlordAlert>> {
        self.alerts.review_queue()
    }

    /// Run a delivered alert through the gate with a caller-supplied trust score.
    pub fn process_incoming_alert(&self, alert: WarlordAlert, local_trust_score: f64) -> Result<GateOutcome> {
        let alert_id = alert.id.clone();
        self.alert_locks.with_user(&alert_id, || {
            // A stored copy wins over whatever target the delivery claims.
            let target = match self.storage.get_alert(&alert.id)? {
                Some(stored) => stored.target_user_id,
                None => alert.target_user_id.clone(),
            };
            self.locks
                .with_user(&target, || self.gate.process_incoming_alert(alert, local_trust_score))
        })
    }

    /// Run a delivered alert through the gate, trusting its reporting node
    /// as far as the trust provider does.
    pub fn ingest_alert(&self, alert: WarlordAlert) -> Result<GateOutcome> {
        let trust = self.trust.trust_score(&alert.reporting_node_fingerprint);
        self.process_incoming_alert(alert, trust)
    }

    // --- Strikes ---

    /// Create a strike directly, bypassing the gate.
    pub fn activate_strike(
        &self,
        alert_id: &str,
        target_user_id: &str,
        severity: Severity,
        current_behavior_score: f64,
    ) -> Result<LocalStrike> {
        self.locks.with_user(target_user_id, || {
            self.strikes
                .activate_strike(alert_id, target_user_id, severity, current_behavior_score)
        })
    }

    pub fn get_strike(&self, strike_id: &str) -> Result<Option<LocalStrike>> {
        self.strikes.get_strike(strike_id)
    }

    pub fn get_active_strikes(&self, user_id: &str) -> Result<Vec<LocalStrike>> {
        self.strikes.get_active_strikes(user_id)
    }

    pub fn strike_history(&self, user_id: &str) -> Result<Vec<LocalStrike>> {
        self.strikes.strike_history(user_id)
    }

    pub fn get_strike_status(&self, user_id: &str) -> Result<StrikeStatusView> {
        self.strikes.get_strike_status(user_id)
    }

    // --- Behavior ---

    pub fn update_user_behavior(&self, user_id: &str, delta: ActivityDelta) -> Result<BehaviorUpdate> {
        self.locks
            .with_user(user_id, || self.behavior.update_behavior(user_id, delta))
    }

    pub fn get_behavior(&self, user_id: &str) -> Result<Option<BehaviorTracking>> {
        self.behavior.get_behavior(user_id)
    }

    // --- Oversight ---

    pub fn override_strike(
        &self,
        strike_id: &str,
        steward_user_id: &str,
        action: OverrideAction,
        reason: &str,
    ) -> Result<OverrideResult> {
        let target = self
            .strikes
            .get_strike(strike_id)?
            .map(|s| s.target_user_id)
            .ok_or_else(|| Error::NotFound(format!("strike {}", strike_id)))?;
        self.locks.with_user(&target, || {
            self.oversight
                .override_strike(strike_id, steward_user_id, action, reason)
        })
    }

    pub fn whitelist_user(&self, new: NewWhitelist) -> Result<UserStrikeWhitelist> {
        let user_id = new.user_id.clone();
        self.locks
            .with_user(&user_id, || self.oversight.whitelist_user(new))
    }

    pub fn whitelist_entries(&self, user_id: &str) -> Result<Vec<UserStrikeWhitelist>> {
        self.oversight.whitelist_entries(user_id)
    }

    pub fn enforce_alert(&self, alert_id: &str, steward_user_id: &str, reason: &str) -> Result<LocalStrike> {
        let target = self.alert_target(alert_id)?;
        self.locks.with_user(&target, || {
            self.oversight.enforce_alert(alert_id, steward_user_id, reason)
        })
    }

    pub fn override_history(&self, strike_id: &str) -> Result<Vec<StrikeOverrideLog>> {
        self.oversight.override_history(strike_id)
    }

    pub fn deescalation_history(&self, strike_id: &str) -> Result<Vec<StrikeDeescalationLog>> {
        self.oversight.deescalation_history(strike_id)
    }

    // --- Accessors ---

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn trust(&self) -> &Arc<dyn TrustProvider> {
        &self.trust
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn strikes(&self) -> &StrikeEngine {
        &self.strikes
    }

    pub fn behavior(&self) -> &BehaviorTracker {
        &self.behavior
    }

    pub fn deescalation(&self) -> &DeescalationController {
        &self.deescalation
    }

    pub fn oversight(&self) -> &Oversight {
        &self.oversight
    }

    pub fn gate(&self) -> &PropagationGate {
        &self.gate
    }

    fn alert_target(&self, alert_id: &str) -> Result<String> {
        self.storage
            .get_alert(alert_id)?
            .map(|a| a.target_user_id)
            .ok_or_else(|| Error::NotFound(format!("alert {}", alert_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AbuseType, Evidence};
    use crate::trust::FixedTrust;
    use std::thread;
    use tempfile::tempdir;

    fn engine(trust: f64) -> (tempfile::TempDir, DefenseEngine) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        (dir, DefenseEngine::new(storage, Arc::new(FixedTrust(trust))))
    }

    fn new_alert() -> NewAlert {
        NewAlert {
            target_user_id: "warlord".into(),
            severity: 6,
            abuse_type: AbuseType::ExtractionPattern,
            evidence: vec![Evidence::new("exchange-ratio", "received 20, gave 1", 0.9)],
            reporting_node_fingerprint: "node-a".into(),
            reporting_user_id: None,
            trusted_source: true,
        }
    }

    #[test]
    fn ingest_uses_provider_score() {
        let (_dir, low) = engine(0.3);
        let alert = low.create_warlord_alert(new_alert()).unwrap();
        assert!(matches!(low.ingest_alert(alert).unwrap(), GateOutcome::LowTrust { .. }));

        let (_dir, high) = engine(0.9);
        let alert = high.create_warlord_alert(new_alert()).unwrap();
        assert!(high.ingest_alert(alert).unwrap().strike().is_some());
    }

    #[test]
    fn concurrent_deliveries_activate_once() {
        let (_dir, engine) = engine(0.9);
        let alert = engine.create_warlord_alert(new_alert()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let alert = alert.clone();
                thread::spawn(move || engine.ingest_alert(alert).unwrap())
            })
            .collect();
        let activated = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| o.strike().is_some())
            .count();

        assert_eq!(activated, 1);
        assert_eq!(engine.strike_history("warlord").unwrap().len(), 1);
    }

    #[test]
    fn conflicting_first_deliveries_activate_once() {
        let (_dir, engine) = engine(0.9);
        let now = chrono::Utc::now();
        // Never stored locally, so every copy races as a first delivery.
        let alert = WarlordAlert {
            id: "remote-1".into(),
            target_user_id: "warlord".into(),
            severity: Severity::new(8).unwrap(),
            abuse_type: AbuseType::BatteryWarlord,
            evidence: vec![Evidence::new("battery-hold", "kept 9 shared batteries", 0.9)],
            reporting_node_fingerprint: "node-b".into(),
            reporting_user_id: None,
            trusted_source: true,
            propagation_count: 1,
            created_at: now,
            expires_at: WarlordAlert::expiry_for(now),
            cancelled: false,
            cancelled_by: None,
            cancellation_reason: None,
            cancelled_at: None,
        };

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                let mut copy = alert.clone();
                copy.target_user_id = format!("claimed-{}", i % 2);
                thread::spawn(move || engine.ingest_alert(copy).unwrap())
            })
            .collect();
        let activated = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| o.strike().is_some())
            .count();

        assert_eq!(activated, 1);
        let total = engine.strike_history("claimed-0").unwrap().len()
            + engine.strike_history("claimed-1").unwrap().len();
        assert_eq!(total, 1);
        assert_eq!(engine.storage().strikes_for_alert("remote-1").unwrap().len(), 1);
    }

    #[test]
    fn override_unknown_strike_is_not_found() {
        let (_dir, engine) = engine(0.9);
        assert!(matches!(
            engine.override_strike("missing", "steward", OverrideAction::CancelStrike, "n/a"),
            Err(Error::NotFound(_))
        ));
    }
}
