//! Alert manager - creation, cancellation and the review queue.

use crate::error::{require_text, Error, Result};
use crate::models::{
    AbuseType, DeescalationReason, Evidence, Severity, StrikeDeescalationLog, WarlordAlert,
};
use crate::storage::{Storage, StoreBatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Input for a locally created alert.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub target_user_id: String,
    /// Validated into [`Severity`]; out-of-range values are rejected
    pub severity: i64,
    pub abuse_type: AbuseType,
    pub evidence: Vec<Evidence>,
    pub reporting_node_fingerprint: String,
    #[serde(default)]
    pub reporting_user_id: Option<String>,
    #[serde(default)]
    pub trusted_source: bool,
}

/// Result of a cancellation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub alert: WarlordAlert,
    /// Strikes moved to `deactivated` by this call
    pub deactivated_strikes: Vec<String>,
    /// True when the alert was already cancelled and nothing changed
    pub already_cancelled: bool,
}

#[derive(Clone)]
pub struct AlertManager {
    storage: Arc<Storage>,
}

impl AlertManager {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Validate and persist a new alert expiring seven days from now.
    pub fn create_alert(&self, new: NewAlert) -> Result<WarlordAlert> {
        let alert = Self::build(new, Utc::now())?;
        self.storage.put_alert(&alert)?;
        info!(
            "Created {} alert {} (severity {}) against {}",
            alert.abuse_type, alert.id, alert.severity, alert.target_user_id
        );
        Ok(alert)
    }

    pub(crate) fn build(new: NewAlert, now: DateTime<Utc>) -> Result<WarlordAlert> {
        let severity = Severity::new(new.severity)?;
        let alert = WarlordAlert {
            id: uuid::Uuid::new_v4().to_string(),
            target_user_id: new.target_user_id,
            severity,
            abuse_type: new.abuse_type,
            evidence: new.evidence,
            reporting_node_fingerprint: new.reporting_node_fingerprint,
            reporting_user_id: new.reporting_user_id,
            trusted_source: new.trusted_source,
            propagation_count: 0,
            created_at: now,
            expires_at: WarlordAlert::expiry_for(now),
            cancelled: false,
            cancelled_by: None,
            cancellation_reason: None,
            cancelled_at: None,
        };
        alert.validate()?;
        Ok(alert)
    }

    pub fn get_alert(&self, id: &str) -> Result<Option<WarlordAlert>> {
        self.storage.get_alert(id)
    }

    /// Cancel an alert and deactivate every active strike it produced.
    ///
    /// Cancelling twice is a no-op. Callers that share the store with other
    /// writers must hold the target user's lock (see [`crate::DefenseEngine`]).
    pub fn cancel_alert(&self, alert_id: &str, cancelled_by: &str, reason: &str) -> Result<CancelOutcome> {
        require_text("cancelled by", cancelled_by)?;
        require_text("cancellation reason", reason)?;

        let mut alert = self
            .storage
            .get_alert(alert_id)?
            .ok_or_else(|| Error::NotFound(format!("alert {}", alert_id)))?;

        if alert.cancelled {
            return Ok(CancelOutcome {
                alert,
                deactivated_strikes: Vec::new(),
                already_cancelled: true,
            });
        }

        let mut batch = StoreBatch::new();
        let deactivated = self.stage_cancel(&mut batch, &mut alert, cancelled_by, reason, Utc::now(), None)?;
        self.storage.commit(batch)?;

        info!(
            "Alert {} cancelled by {}; {} strike(s) deactivated",
            alert.id,
            cancelled_by,
            deactivated.len()
        );
        Ok(CancelOutcome {
            alert,
            deactivated_strikes: deactivated,
            already_cancelled: false,
        })
    }

    /// Stage the cancellation of `alert` and its cascade into `batch`.
    ///
    /// `except_strike` is left untouched so an override can record its own
    /// terminal state for it in the same batch.
    pub(crate) fn stage_cancel(
        &self,
        batch: &mut StoreBatch,
        alert: &mut WarlordAlert,
        cancelled_by: &str,
        reason: &str,
        now: DateTime<Utc>,
        except_strike: Option<&str>,
    ) -> Result<Vec<String>> {
        if !alert.cancel(cancelled_by, reason, now) {
            return Ok(Vec::new());
        }
        batch.put_alert(alert)?;

        let mut deactivated = Vec::new();
        for mut strike in self.storage.strikes_for_alert(&alert.id)? {
            if !strike.is_active() || except_strike == Some(strike.id.as_str()) {
                continue;
            }
            let previous = strike.throttle_level;
            strike.deactivate(now);
            batch.put_strike(&strike)?;
            batch.put_deescalation_log(&StrikeDeescalationLog::record(
                &strike,
                previous,
                DeescalationReason::AlertCancelled,
                now,
            ))?;
            deactivated.push(strike.id);
        }
        Ok(deactivated)
    }

    /// Uncancelled alerts that produced no strike on this node, oldest first.
    pub fn review_queue(&self) -> Result<Vec<WarlordAlert>> {
        let mut queue = Vec::new();
        for alert in self.storage.list_alerts()? {
            if !alert.cancelled && self.storage.strikes_for_alert(&alert.id)?.is_empty() {
                queue.push(alert);
            }
        }
        queue.sort_by_key(|a| a.created_at);
        Ok(queue)
    }
}
