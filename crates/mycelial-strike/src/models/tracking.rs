//! Behavior tracking model - one rolling activity window per user.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Length of the rolling activity window.
pub const BEHAVIOR_WINDOW_DAYS: i64 = 30;

/// Score given to users with no recorded activity.
pub const NEUTRAL_SCORE: f64 = 5.0;

/// Rolling activity counters and the score derived from them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorTracking {
    pub user_id: String,
    pub exchanges_given: u64,
    pub exchanges_received: u64,
    pub offers_posted: u64,
    pub needs_posted: u64,
    /// Always within [0, 10]
    pub behavior_score: f64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl BehaviorTracking {
    /// Fresh record with neutral defaults.
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            exchanges_given: 0,
            exchanges_received: 0,
            offers_posted: 0,
            needs_posted: 0,
            behavior_score: NEUTRAL_SCORE,
            period_start: now,
            period_end: now + Duration::days(BEHAVIOR_WINDOW_DAYS),
            last_updated: now,
        }
    }

    /// Start a new window if the current one has closed.
    pub fn roll_window(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.period_end {
            return false;
        }
        self.exchanges_given = 0;
        self.exchanges_received = 0;
        self.offers_posted = 0;
        self.needs_posted = 0;
        self.period_start = now;
        self.period_end = now + Duration::days(BEHAVIOR_WINDOW_DAYS);
        true
    }
}

/// Activity increments reported by the surrounding application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityDelta {
    pub exchanges_given: u64,
    pub exchanges_received: u64,
    pub offers_posted: u64,
    pub needs_posted: u64,
}
