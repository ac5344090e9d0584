//! Steward oversight - overrides, whitelist and manual enforcement.
//!
//! Every successful override writes exactly one [`StrikeOverrideLog`] in the
//! same batch as the state change it records. Overrides only apply to active
//! strikes; a retry against a terminal strike is `NotFound` and writes nothing.

use crate::alerts::AlertManager;
use crate::error::{require_text, Error, Result};
use crate::models::{
    AbuseType, LocalStrike, OverrideAction, StrikeDeescalationLog, StrikeOverrideLog, StrikeStatus,
    ThrottleLevel, UserStrikeWhitelist, WhitelistScope, DEFAULT_WHITELIST_DAYS, NEUTRAL_SCORE,
};
use crate::storage::{Storage, StoreBatch};
use crate::strikes::StrikeEngine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Input for a whitelist grant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWhitelist {
    pub user_id: String,
    pub whitelisted_by: String,
    pub reason: String,
    pub scope: WhitelistScope,
    #[serde(default)]
    pub is_permanent: bool,
    /// Defaults to 30 days for non-permanent entries
    #[serde(default)]
    pub duration_days: Option<u32>,
}

/// Everything one override changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideResult {
    pub strike: LocalStrike,
    pub log: StrikeOverrideLog,
    /// Sibling strikes deactivated by an alert cancellation
    pub deactivated_strikes: Vec<String>,
    /// Entry granted by a `whitelist-user` override
    pub whitelist: Option<UserStrikeWhitelist>,
}

#[derive(Clone)]
pub struct Oversight {
    storage: Arc<Storage>,
    alerts: AlertManager,
    strikes: StrikeEngine,
}

impl Oversight {
    pub fn new(storage: Arc<Storage>, alerts: AlertManager, strikes: StrikeEngine) -> Self {
        Self {
            storage,
            alerts,
            strikes,
        }
    }

    /// Apply a steward action to an active strike.
    pub fn override_strike(
        &self,
        strike_id: &str,
        steward_user_id: &str,
        action: OverrideAction,
        reason: &str,
    ) -> Result<OverrideResult> {
        require_text("steward user id", steward_user_id)?;
        require_text("override reason", reason)?;

        let mut strike = self
            .storage
            .get_strike(strike_id)?
            .ok_or_else(|| Error::NotFound(format!("strike {}", strike_id)))?;
        if !strike.is_active() {
            return Err(Error::NotFound(format!("no active strike {}", strike_id)));
        }

        let now = Utc::now();
        let before = strike.snapshot();
        let mut batch = StoreBatch::new();
        let mut deactivated_strikes = Vec::new();
        let mut whitelist = None;

        match action {
            OverrideAction::CancelStrike => {
                strike.status = StrikeStatus::Overridden;
            }
            OverrideAction::CancelAlert => {
                let mut alert = self
                    .storage
                    .get_alert(&strike.alert_id)?
                    .ok_or_else(|| Error::NotFound(format!("alert {}", strike.alert_id)))?;
                deactivated_strikes = self.alerts.stage_cancel(
                    &mut batch,
                    &mut alert,
                    steward_user_id,
                    reason,
                    now,
                    Some(&strike.id),
                )?;
                strike.status = StrikeStatus::Overridden;
            }
            OverrideAction::AdjustSeverity { severity } => {
                strike.set_level(ThrottleLevel::from_severity(severity));
            }
            OverrideAction::WhitelistUser {
                is_permanent,
                duration_days,
            } => {
                let abuse_type = self
                    .storage
                    .get_alert(&strike.alert_id)?
                    .map(|a| a.abuse_type)
                    .ok_or_else(|| Error::NotFound(format!("alert {}", strike.alert_id)))?;
                let entry = Self::build_whitelist(
                    NewWhitelist {
                        user_id: strike.target_user_id.clone(),
                        whitelisted_by: steward_user_id.to_string(),
                        reason: reason.to_string(),
                        scope: WhitelistScope::SpecificAbuseType(abuse_type),
                        is_permanent,
                        duration_days,
                    },
                    now,
                )?;
                batch.put_whitelist(&entry)?;
                whitelist = Some(entry);
                strike.status = StrikeStatus::Overridden;
            }
        }
        strike.record_override(steward_user_id, reason, now);

        let log = StrikeOverrideLog {
            id: uuid::Uuid::new_v4().to_string(),
            strike_id: strike.id.clone(),
            alert_id: strike.alert_id.clone(),
            target_user_id: strike.target_user_id.clone(),
            action,
            overridden_by: steward_user_id.to_string(),
            reason: reason.to_string(),
            before_state: before,
            after_state: strike.snapshot(),
            created_at: now,
        };
        batch.put_strike(&strike)?;
        batch.put_override_log(&log)?;
        self.storage.commit(batch)?;

        info!(
            "Steward {} applied {} to strike {} ({:?} -> {:?})",
            steward_user_id,
            action.name(),
            strike.id,
            before.status,
            strike.status
        );
        Ok(OverrideResult {
            strike,
            log,
            deactivated_strikes,
            whitelist,
        })
    }

    /// Grant a user immunity from automatic strikes.
    pub fn whitelist_user(&self, new: NewWhitelist) -> Result<UserStrikeWhitelist> {
        let entry = Self::build_whitelist(new, Utc::now())?;
        self.storage.put_whitelist(&entry)?;
        info!(
            "User {} whitelisted ({:?}) by {}",
            entry.user_id, entry.scope, entry.whitelisted_by
        );
        Ok(entry)
    }

    fn build_whitelist(new: NewWhitelist, now: DateTime<Utc>) -> Result<UserStrikeWhitelist> {
        require_text("user id", &new.user_id)?;
        require_text("whitelisted by", &new.whitelisted_by)?;
        require_text("whitelist reason", &new.reason)?;

        let expires_at = if new.is_permanent {
            None
        } else {
            let days = new.duration_days.unwrap_or(DEFAULT_WHITELIST_DAYS);
            if days == 0 {
                return Err(Error::Validation("whitelist duration must be at least one day".into()));
            }
            Some(now + Duration::days(i64::from(days)))
        };

        Ok(UserStrikeWhitelist {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new.user_id,
            whitelisted_by: new.whitelisted_by,
            reason: new.reason,
            scope: new.scope,
            is_permanent: new.is_permanent,
            created_at: now,
            expires_at,
        })
    }

    pub fn whitelist_entries(&self, user_id: &str) -> Result<Vec<UserStrikeWhitelist>> {
        self.storage.whitelist_entries(user_id)
    }

    pub fn is_whitelisted(&self, user_id: &str, abuse_type: AbuseType) -> Result<bool> {
        self.is_whitelisted_at(user_id, abuse_type, Utc::now())
    }

    pub(crate) fn is_whitelisted_at(&self, user_id: &str, abuse_type: AbuseType, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .storage
            .whitelist_entries(user_id)?
            .iter()
            .any(|e| e.protects(abuse_type, now)))
    }

    /// Turn a held alert into a manual strike.
    ///
    /// Whitelist and trust do not apply; cancellation and the one-strike-per-
    /// alert rule do. Returns the existing strike if the alert already has one.
    pub fn enforce_alert(&self, alert_id: &str, steward_user_id: &str, reason: &str) -> Result<LocalStrike> {
        require_text("steward user id", steward_user_id)?;
        require_text("enforcement reason", reason)?;

        let alert = self
            .storage
            .get_alert(alert_id)?
            .ok_or_else(|| Error::NotFound(format!("alert {}", alert_id)))?;
        if alert.cancelled {
            return Err(Error::Validation(format!("alert {} is cancelled", alert_id)));
        }
        if let Some(existing) = self.strikes.strike_for_alert(alert_id)? {
            return Ok(existing);
        }

        let score = self
            .storage
            .get_behavior(&alert.target_user_id)?
            .map(|t| t.behavior_score)
            .unwrap_or(NEUTRAL_SCORE);
        let strike = self.strikes.activate(
            &alert.id,
            &alert.target_user_id,
            alert.severity,
            score,
            Some(steward_user_id),
        )?;
        info!(
            "Steward {} enforced alert {} manually: {}",
            steward_user_id, alert_id, reason
        );
        Ok(strike)
    }

    pub fn override_history(&self, strike_id: &str) -> Result<Vec<StrikeOverrideLog>> {
        self.storage.override_logs(strike_id)
    }

    pub fn deescalation_history(&self, strike_id: &str) -> Result<Vec<StrikeDeescalationLog>> {
        self.storage.deescalation_logs(strike_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::NewAlert;
    use crate::models::{DeescalationReason, Evidence, Severity, WarlordAlert};
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        storage: Arc<Storage>,
        alerts: AlertManager,
        strikes: StrikeEngine,
        oversight: Oversight,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let alerts = AlertManager::new(Arc::clone(&storage));
        let strikes = StrikeEngine::new(Arc::clone(&storage));
        let oversight = Oversight::new(Arc::clone(&storage), alerts.clone(), strikes.clone());
        Fixture {
            _dir: dir,
            storage,
            alerts,
            strikes,
            oversight,
        }
    }

    fn alert(f: &Fixture, severity: i64) -> WarlordAlert {
        f.alerts
            .create_alert(NewAlert {
                target_user_id: "warlord".into(),
                severity,
                abuse_type: AbuseType::BatteryWarlord,
                evidence: vec![Evidence::new("battery-hold", "kept 6 batteries", 0.8)],
                reporting_node_fingerprint: "node-a".into(),
                reporting_user_id: None,
                trusted_source: true,
            })
            .unwrap()
    }

    fn strike_for(f: &Fixture, alert: &WarlordAlert) -> LocalStrike {
        f.strikes
            .activate_strike(&alert.id, &alert.target_user_id, alert.severity, 4.0)
            .unwrap()
    }

    #[test]
    fn cancel_strike_is_logged_once() {
        let f = fixture();
        let a = alert(&f, 6);
        let strike = strike_for(&f, &a);

        let result = f
            .oversight
            .override_strike(&strike.id, "steward-1", OverrideAction::CancelStrike, "false positive")
            .unwrap();
        assert_eq!(result.strike.status, StrikeStatus::Overridden);
        assert_eq!(result.strike.overridden_by.as_deref(), Some("steward-1"));
        assert_eq!(result.log.before_state.status, StrikeStatus::Active);
        assert_eq!(result.log.after_state.status, StrikeStatus::Overridden);

        let retry = f
            .oversight
            .override_strike(&strike.id, "steward-1", OverrideAction::CancelStrike, "again");
        assert!(matches!(retry, Err(Error::NotFound(_))));
        assert_eq!(f.oversight.override_history(&strike.id).unwrap().len(), 1);
    }

    #[test]
    fn override_requires_reason() {
        let f = fixture();
        let a = alert(&f, 6);
        let strike = strike_for(&f, &a);
        assert!(matches!(
            f.oversight
                .override_strike(&strike.id, "steward-1", OverrideAction::CancelStrike, ""),
            Err(Error::Validation(_))
        ));
        assert!(f.storage.get_strike(&strike.id).unwrap().unwrap().is_active());
        assert!(f.oversight.override_history(&strike.id).unwrap().is_empty());
    }

    #[test]
    fn adjust_severity_keeps_strike_active() {
        let f = fixture();
        let a = alert(&f, 9);
        let strike = strike_for(&f, &a);
        let result = f
            .oversight
            .override_strike(
                &strike.id,
                "steward-1",
                OverrideAction::AdjustSeverity {
                    severity: Severity::new(3).unwrap(),
                },
                "overstated",
            )
            .unwrap();
        assert!(result.strike.is_active());
        assert_eq!(result.strike.throttle_level, ThrottleLevel::Medium);
        assert_eq!(result.log.before_state.throttle_level, ThrottleLevel::Critical);
        assert_eq!(result.log.after_state.throttle_level, ThrottleLevel::Medium);
    }

    #[test]
    fn cancel_alert_override_ends_siblings() {
        let f = fixture();
        let a = alert(&f, 6);
        let first = strike_for(&f, &a);
        let second = strike_for(&f, &a);

        let result = f
            .oversight
            .override_strike(&first.id, "steward-1", OverrideAction::CancelAlert, "resolved")
            .unwrap();
        assert_eq!(result.deactivated_strikes, vec![second.id.clone()]);
        assert!(f.storage.get_alert(&a.id).unwrap().unwrap().cancelled);
        assert_eq!(
            f.storage.get_strike(&first.id).unwrap().unwrap().status,
            StrikeStatus::Overridden
        );
        assert_eq!(
            f.storage.get_strike(&second.id).unwrap().unwrap().status,
            StrikeStatus::Deactivated
        );
        let logs = f.storage.deescalation_logs(&second.id).unwrap();
        assert_eq!(logs[0].trigger_reason, DeescalationReason::AlertCancelled);
    }

    #[test]
    fn whitelist_override_scopes_to_abuse_type() {
        let f = fixture();
        let a = alert(&f, 6);
        let strike = strike_for(&f, &a);
        let result = f
            .oversight
            .override_strike(
                &strike.id,
                "steward-1",
                OverrideAction::WhitelistUser {
                    is_permanent: false,
                    duration_days: None,
                },
                "known courier",
            )
            .unwrap();
        let entry = result.whitelist.unwrap();
        assert_eq!(entry.scope, WhitelistScope::SpecificAbuseType(AbuseType::BatteryWarlord));
        assert_eq!(entry.expires_at, Some(entry.created_at + Duration::days(30)));
        assert!(f.oversight.is_whitelisted("warlord", AbuseType::BatteryWarlord).unwrap());
        assert!(!f.oversight.is_whitelisted("warlord", AbuseType::Spam).unwrap());
    }

    #[test]
    fn zero_day_whitelist_rejected() {
        let f = fixture();
        let result = f.oversight.whitelist_user(NewWhitelist {
            user_id: "u1".into(),
            whitelisted_by: "steward-1".into(),
            reason: "trial".into(),
            scope: WhitelistScope::All,
            is_permanent: false,
            duration_days: Some(0),
        });
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(f.oversight.whitelist_entries("u1").unwrap().is_empty());
    }

    #[test]
    fn expired_whitelist_does_not_protect() {
        let f = fixture();
        let entry = f
            .oversight
            .whitelist_user(NewWhitelist {
                user_id: "u1".into(),
                whitelisted_by: "steward-1".into(),
                reason: "trial".into(),
                scope: WhitelistScope::All,
                is_permanent: false,
                duration_days: Some(1),
            })
            .unwrap();
        let later = entry.created_at + Duration::days(2);
        assert!(f.oversight.is_whitelisted_at("u1", AbuseType::Spam, entry.created_at).unwrap());
        assert!(!f.oversight.is_whitelisted_at("u1", AbuseType::Spam, later).unwrap());
    }

    #[test]
    fn enforce_alert_is_manual_and_idempotent() {
        let f = fixture();
        let a = alert(&f, 4);
        let strike = f.oversight.enforce_alert(&a.id, "steward-1", "confirmed").unwrap();
        assert!(!strike.automatic);
        assert_eq!(strike.activated_by.as_deref(), Some("steward-1"));
        assert_eq!(strike.behavior_score_at_start, NEUTRAL_SCORE);

        let again = f.oversight.enforce_alert(&a.id, "steward-2", "confirmed").unwrap();
        assert_eq!(again.id, strike.id);
        assert_eq!(f.strikes.strike_history("warlord").unwrap().len(), 1);
    }

    #[test]
    fn enforce_refuses_cancelled_alert() {
        let f = fixture();
        let a = alert(&f, 4);
        f.alerts.cancel_alert(&a.id, "steward-1", "withdrawn").unwrap();
        assert!(matches!(
            f.oversight.enforce_alert(&a.id, "steward-1", "confirmed"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            f.oversight.enforce_alert("missing", "steward-1", "confirmed"),
            Err(Error::NotFound(_))
        ));
    }
}
