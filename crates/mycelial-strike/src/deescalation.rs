//! De-escalation controller.
//!
//! Improvement is always measured against `behavior_score_at_start`, which is
//! never reset when a strike steps down. Each check moves at most one notch,
//! so a sustained improvement walks the strike down one level per behavior
//! update until it deactivates.

use crate::error::{Error, Result};
use crate::models::{DeescalationReason, LocalStrike, StrikeDeescalationLog};
use crate::storage::{Storage, StoreBatch};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// Score gain over the strike's starting score that triggers one step down.
pub const IMPROVEMENT_STEP: f64 = 2.0;

/// Result of checking one strike against a new score.
#[derive(Debug, Clone, PartialEq)]
pub struct DeescalationCheck {
    /// The strike with its current score (and possibly level/status) updated
    pub strike: LocalStrike,
    /// Present when the strike stepped down or deactivated
    pub log: Option<StrikeDeescalationLog>,
}

impl DeescalationCheck {
    pub fn deescalated(&self) -> bool {
        self.log.is_some()
    }

    pub(crate) fn stage(&self, batch: &mut StoreBatch) -> Result<()> {
        batch.put_strike(&self.strike)?;
        if let Some(log) = &self.log {
            batch.put_deescalation_log(log)?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct DeescalationController {
    storage: Arc<Storage>,
}

impl DeescalationController {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Check a strike against the latest score and persist the result.
    pub fn check_deescalation(&self, strike: &LocalStrike, current_behavior_score: f64) -> Result<DeescalationCheck> {
        if !current_behavior_score.is_finite() {
            return Err(Error::Validation(format!(
                "behavior score must be finite, got {}",
                current_behavior_score
            )));
        }
        let check = self.evaluate(strike, current_behavior_score, Utc::now());
        if strike.is_active() {
            let mut batch = StoreBatch::new();
            check.stage(&mut batch)?;
            self.storage.commit(batch)?;
        }
        Ok(check)
    }

    /// Pure decision; terminal strikes and non-finite scores come back unchanged.
    pub fn evaluate(&self, strike: &LocalStrike, current_behavior_score: f64, now: DateTime<Utc>) -> DeescalationCheck {
        let mut updated = strike.clone();
        if !strike.is_active() || !current_behavior_score.is_finite() {
            return DeescalationCheck { strike: updated, log: None };
        }

        let current_behavior_score = current_behavior_score.clamp(0.0, 10.0);
        updated.current_behavior_score = current_behavior_score;
        let improvement = current_behavior_score - strike.behavior_score_at_start;
        if improvement < IMPROVEMENT_STEP {
            return DeescalationCheck { strike: updated, log: None };
        }

        let previous = strike.throttle_level;
        match previous.step_down() {
            Some(level) => updated.set_level(level),
            None => updated.deactivate(now),
        }
        let log = StrikeDeescalationLog::record(&updated, previous, DeescalationReason::BehaviorImproved, now);

        match log.new_level {
            Some(level) => info!(
                "Strike {} de-escalated {} -> {} (improvement {:.2})",
                strike.id, previous, level, improvement
            ),
            None => info!(
                "Strike {} deactivated from {} (improvement {:.2})",
                strike.id, previous, improvement
            ),
        }

        DeescalationCheck {
            strike: updated,
            log: Some(log),
        }
    }
}
