//! Behavior tracker - rolling activity counters and the behavior score.
//!
//! ```text
//! reciprocity = 10 × (1 − 2×|given/(given+received) − 0.5|)   (5.0 with no exchanges)
//! activity    = min(10, (offers + needs) / 5)
//! score       = clamp(0.7×reciprocity + 0.3×activity, 0, 10)
//! ```

use crate::deescalation::DeescalationController;
use crate::error::{require_text, Result};
use crate::models::{ActivityDelta, BehaviorTracking, LocalStrike, StrikeDeescalationLog, NEUTRAL_SCORE};
use crate::storage::{Storage, StoreBatch};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

const RECIPROCITY_WEIGHT: f64 = 0.7;
const ACTIVITY_WEIGHT: f64 = 0.3;

/// Balance between giving and receiving, in [0, 10]. Peaks at an even split.
pub fn reciprocity(given: u64, received: u64) -> f64 {
    let total = given.saturating_add(received);
    if total == 0 {
        return NEUTRAL_SCORE;
    }
    let ratio = given as f64 / total as f64;
    10.0 * (1.0 - 2.0 * (ratio - 0.5).abs())
}

/// Posting activity, in [0, 10].
pub fn activity(offers_posted: u64, needs_posted: u64) -> f64 {
    (offers_posted.saturating_add(needs_posted) as f64 / 5.0).min(10.0)
}

pub fn behavior_score(tracking: &BehaviorTracking) -> f64 {
    let score = RECIPROCITY_WEIGHT * reciprocity(tracking.exchanges_given, tracking.exchanges_received)
        + ACTIVITY_WEIGHT * activity(tracking.offers_posted, tracking.needs_posted);
    score.clamp(0.0, 10.0)
}

/// Everything one behavior update changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorUpdate {
    pub tracking: BehaviorTracking,
    /// Active strikes after their de-escalation check
    pub strikes: Vec<LocalStrike>,
    pub deescalations: Vec<StrikeDeescalationLog>,
}

#[derive(Clone)]
pub struct BehaviorTracker {
    storage: Arc<Storage>,
    deescalation: DeescalationController,
}

impl BehaviorTracker {
    pub fn new(storage: Arc<Storage>, deescalation: DeescalationController) -> Self {
        Self { storage, deescalation }
    }

    pub fn get_behavior(&self, user_id: &str) -> Result<Option<BehaviorTracking>> {
        self.storage.get_behavior(user_id)
    }

    /// Current score, neutral when nothing has been recorded.
    pub fn current_score(&self, user_id: &str) -> Result<f64> {
        Ok(self
            .storage
            .get_behavior(user_id)?
            .map(|t| t.behavior_score)
            .unwrap_or(NEUTRAL_SCORE))
    }

    /// Add activity, recompute the score and check every active strike.
    ///
    /// The record, the strikes and their logs are written in one batch.
    pub fn update_behavior(&self, user_id: &str, delta: ActivityDelta) -> Result<BehaviorUpdate> {
        self.update_behavior_at(user_id, delta, Utc::now())
    }

    pub(crate) fn update_behavior_at(
        &self,
        user_id: &str,
        delta: ActivityDelta,
        now: DateTime<Utc>,
    ) -> Result<BehaviorUpdate> {
        require_text("user id", user_id)?;

        let mut tracking = self
            .storage
            .get_behavior(user_id)?
            .unwrap_or_else(|| BehaviorTracking::new(user_id, now));
        if tracking.roll_window(now) {
            debug!("Behavior window for {} rolled over", user_id);
        }

        tracking.exchanges_given = tracking.exchanges_given.saturating_add(delta.exchanges_given);
        tracking.exchanges_received = tracking.exchanges_received.saturating_add(delta.exchanges_received);
        tracking.offers_posted = tracking.offers_posted.saturating_add(delta.offers_posted);
        tracking.needs_posted = tracking.needs_posted.saturating_add(delta.needs_posted);
        tracking.behavior_score = behavior_score(&tracking);
        tracking.last_updated = now;

        let mut batch = StoreBatch::new();
        batch.put_behavior(&tracking)?;

        let mut strikes = Vec::new();
        let mut deescalations = Vec::new();
        for strike in self.storage.strikes_for_user(user_id)? {
            if !strike.is_active() {
                continue;
            }
            let check = self.deescalation.evaluate(&strike, tracking.behavior_score, now);
            check.stage(&mut batch)?;
            if let Some(log) = check.log {
                deescalations.push(log);
            }
            strikes.push(check.strike);
        }
        self.storage.commit(batch)?;

        debug!(
            "Behavior score for {} is now {:.2} ({} active strike(s) checked)",
            user_id,
            tracking.behavior_score,
            strikes.len()
        );
        Ok(BehaviorUpdate {
            tracking,
            strikes,
            deescalations,
        })
    }
}
