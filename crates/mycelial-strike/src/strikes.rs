//! Strike engine - severity to throttle mapping and strike reads.

use crate::error::{require_text, Result};
use crate::models::{LocalStrike, Severity, WarlordAlert, NEUTRAL_SCORE};
use crate::status::{self, StrikeStatusView};
use crate::storage::Storage;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct StrikeEngine {
    storage: Arc<Storage>,
}

impl StrikeEngine {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Create an active, automatic strike for `alert_id`.
    ///
    /// This is the raw primitive: it always creates. Delivery handling goes
    /// through [`crate::gate::PropagationGate`], which makes activation
    /// at-most-once per alert id.
    pub fn activate_strike(
        &self,
        alert_id: &str,
        target_user_id: &str,
        severity: Severity,
        current_behavior_score: f64,
    ) -> Result<LocalStrike> {
        self.activate(alert_id, target_user_id, severity, current_behavior_score, None)
    }

    pub(crate) fn activate(
        &self,
        alert_id: &str,
        target_user_id: &str,
        severity: Severity,
        current_behavior_score: f64,
        steward: Option<&str>,
    ) -> Result<LocalStrike> {
        require_text("alert id", alert_id)?;
        require_text("target user id", target_user_id)?;

        let score = if current_behavior_score.is_finite() {
            current_behavior_score.clamp(0.0, 10.0)
        } else {
            NEUTRAL_SCORE
        };
        let mut strike = LocalStrike::activate(alert_id, target_user_id, severity, score, Utc::now());
        if let Some(steward) = steward {
            strike.automatic = false;
            strike.activated_by = Some(steward.to_string());
        }
        self.storage.put_strike(&strike)?;

        info!(
            "Strike {} activated at {} against {} (alert {}, score {:.2})",
            strike.id, strike.throttle_level, target_user_id, alert_id, score
        );
        Ok(strike)
    }

    pub fn get_strike(&self, id: &str) -> Result<Option<LocalStrike>> {
        self.storage.get_strike(id)
    }

    /// Strikes currently in force against a user.
    pub fn get_active_strikes(&self, user_id: &str) -> Result<Vec<LocalStrike>> {
        Ok(self
            .storage
            .strikes_for_user(user_id)?
            .into_iter()
            .filter(LocalStrike::is_active)
            .collect())
    }

    /// Every strike this node has held against a user, any status.
    pub fn strike_history(&self, user_id: &str) -> Result<Vec<LocalStrike>> {
        self.storage.strikes_for_user(user_id)
    }

    /// Any strike already created from `alert_id`.
    pub fn strike_for_alert(&self, alert_id: &str) -> Result<Option<LocalStrike>> {
        Ok(self.storage.strikes_for_alert(alert_id)?.into_iter().next())
    }

    /// Transparency view for the target user.
    pub fn get_strike_status(&self, user_id: &str) -> Result<StrikeStatusView> {
        let strikes = self.get_active_strikes(user_id)?;
        let mut alerts: Vec<WarlordAlert> = Vec::new();
        for strike in &strikes {
            if let Some(alert) = self.storage.get_alert(&strike.alert_id)? {
                if !alerts.iter().any(|a| a.id == alert.id) {
                    alerts.push(alert);
                }
            }
        }
        let behavior = self.storage.get_behavior(user_id)?;
        Ok(status::build_view(user_id, &strikes, &alerts, behavior.as_ref()))
    }
}
