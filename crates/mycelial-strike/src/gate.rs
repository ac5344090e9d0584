//! Propagation gate - admission control between received alerts and strikes.
//!
//! Every delivery is stored first, then evaluated in order:
//!
//! 1. carries a cancellation we lack -> applied if trusted (`Cancelled`)
//! 2. already has a strike here       -> `AlreadyHandled`
//! 3. cancelled                       -> `Cancelled`
//! 4. past `expires_at`               -> `Expired`
//! 5. target whitelisted              -> `Whitelisted`
//! 6. trust below [`TRUST_THRESHOLD`]  -> `LowTrust`
//! 7. otherwise                       -> strike at the target's current score
//!
//! Everything but a new strike is a successful no-op; the alert stays available in the
//! review queue.

use crate::alerts::AlertManager;
use crate::behavior::BehaviorTracker;
use crate::error::Result;
use crate::models::{LocalStrike, WarlordAlert};
use crate::oversight::Oversight;
use crate::storage::{Storage, StoreBatch};
use crate::strikes::StrikeEngine;
use crate::trust::{normalize, TRUST_THRESHOLD};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the gate did with one delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum GateOutcome {
    #[serde(rename_all = "camelCase")]
    StrikeActivated { strike: LocalStrike },
    #[serde(rename_all = "camelCase")]
    AlreadyHandled { strike_id: String },
    #[serde(rename_all = "camelCase")]
    Cancelled { deactivated_strikes: Vec<String> },
    Expired,
    Whitelisted,
    #[serde(rename_all = "camelCase")]
    LowTrust { trust_score: f64 },
}

impl GateOutcome {
    pub fn strike(&self) -> Option<&LocalStrike> {
        match self {
            GateOutcome::StrikeActivated { strike } => Some(strike),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct PropagationGate {
    storage: Arc<Storage>,
    alerts: AlertManager,
    strikes: StrikeEngine,
    behavior: BehaviorTracker,
    oversight: Oversight,
}

impl PropagationGate {
    pub fn new(
        storage: Arc<Storage>,
        alerts: AlertManager,
        strikes: StrikeEngine,
        behavior: BehaviorTracker,
        oversight: Oversight,
    ) -> Self {
        Self {
            storage,
            alerts,
            strikes,
            behavior,
            oversight,
        }
    }

    /// Decide whether a delivered alert becomes a local strike.
    ///
    /// Callers must hold the target user's lock so the duplicate check and
    /// the activation are atomic (see [`crate::DefenseEngine`]).
    pub fn process_incoming_alert(&self, alert: WarlordAlert, local_trust_score: f64) -> Result<GateOutcome> {
        self.process_at(alert, local_trust_score, Utc::now())
    }

    pub(crate) fn process_at(
        &self,
        incoming: WarlordAlert,
        local_trust_score: f64,
        now: DateTime<Utc>,
    ) -> Result<GateOutcome> {
        incoming.validate()?;
        let trust = normalize(local_trust_score);

        let mut local = match self.storage.get_alert(&incoming.id)? {
            Some(stored) => stored,
            None => {
                self.storage.put_alert(&incoming)?;
                debug!("Stored alert {} from {}", incoming.id, incoming.reporting_node_fingerprint);
                incoming.clone()
            }
        };

        if incoming.cancelled && !local.cancelled {
            if trust < TRUST_THRESHOLD {
                warn!(
                    "Ignoring cancellation of alert {} from low-trust source (trust {:.2})",
                    local.id, trust
                );
                return Ok(GateOutcome::LowTrust { trust_score: trust });
            }
            let cancelled_by = incoming
                .cancelled_by
                .clone()
                .unwrap_or_else(|| incoming.reporting_node_fingerprint.clone());
            let reason = incoming
                .cancellation_reason
                .clone()
                .unwrap_or_else(|| "cancelled by originating node".to_string());
            let mut batch = StoreBatch::new();
            let deactivated = self
                .alerts
                .stage_cancel(&mut batch, &mut local, &cancelled_by, &reason, now, None)?;
            self.storage.commit(batch)?;
            info!(
                "Applied remote cancellation of alert {}; {} strike(s) deactivated",
                local.id,
                deactivated.len()
            );
            return Ok(GateOutcome::Cancelled {
                deactivated_strikes: deactivated,
            });
        }

        if let Some(existing) = self.strikes.strike_for_alert(&local.id)? {
            debug!("Alert {} already handled by strike {}", local.id, existing.id);
            return Ok(GateOutcome::AlreadyHandled { strike_id: existing.id });
        }

        if local.cancelled {
            return Ok(GateOutcome::Cancelled {
                deactivated_strikes: Vec::new(),
            });
        }

        if local.is_expired_at(now) {
            debug!("Alert {} arrived after expiry", local.id);
            return Ok(GateOutcome::Expired);
        }

        if self
            .oversight
            .is_whitelisted_at(&local.target_user_id, local.abuse_type, now)?
        {
            debug!("Target of alert {} is whitelisted for {}", local.id, local.abuse_type);
            return Ok(GateOutcome::Whitelisted);
        }

        if trust < TRUST_THRESHOLD {
            debug!("Alert {} held for review (trust {:.2})", local.id, trust);
            return Ok(GateOutcome::LowTrust { trust_score: trust });
        }

        let score = self.behavior.current_score(&local.target_user_id)?;
        let strike = self
            .strikes
            .activate_strike(&local.id, &local.target_user_id, local.severity, score)?;
        Ok(GateOutcome::StrikeActivated { strike })
    }
}
