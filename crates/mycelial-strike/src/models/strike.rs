//! Local strike model - a node-local throttle on one user.

use super::alert::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Throttle bundle applied to a user under strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThrottleLevel {
    /// Fixed severity table: 1-2 low, 3-4 medium, 5-7 high, 8-10 critical.
    pub fn from_severity(severity: Severity) -> Self {
        match severity.get() {
            0..=2 => ThrottleLevel::Low,
            3..=4 => ThrottleLevel::Medium,
            5..=7 => ThrottleLevel::High,
            _ => ThrottleLevel::Critical,
        }
    }

    /// One notch down. `None` means the strike deactivates.
    pub fn step_down(self) -> Option<Self> {
        match self {
            ThrottleLevel::Critical => Some(ThrottleLevel::High),
            ThrottleLevel::High => Some(ThrottleLevel::Medium),
            ThrottleLevel::Medium => Some(ThrottleLevel::Low),
            ThrottleLevel::Low => None,
        }
    }

    pub fn actions(self) -> ThrottleActions {
        ThrottleActions::for_level(self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThrottleLevel::Low => "low",
            ThrottleLevel::Medium => "medium",
            ThrottleLevel::High => "high",
            ThrottleLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for ThrottleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete restrictions enforced by the surrounding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ThrottleActions {
    pub deprioritize_matching: bool,
    pub show_warning_indicator: bool,
    /// Added latency on responses, in milliseconds
    pub response_delay_ms: u64,
    pub reduce_proposal_visibility: bool,
    pub block_high_value_exchanges: bool,
}

impl ThrottleActions {
    pub fn for_level(level: ThrottleLevel) -> Self {
        let base = Self {
            deprioritize_matching: true,
            show_warning_indicator: true,
            response_delay_ms: 0,
            reduce_proposal_visibility: false,
            block_high_value_exchanges: false,
        };
        match level {
            ThrottleLevel::Low => base,
            ThrottleLevel::Medium => Self {
                response_delay_ms: 5_000,
                ..base
            },
            ThrottleLevel::High => Self {
                response_delay_ms: 15_000,
                reduce_proposal_visibility: true,
                ..base
            },
            ThrottleLevel::Critical => Self {
                response_delay_ms: 30_000,
                reduce_proposal_visibility: true,
                block_high_value_exchanges: true,
                ..base
            },
        }
    }

    /// Plain-language list of the restrictions in effect.
    pub fn describe(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.deprioritize_matching {
            out.push("Your offers and needs are ranked lower in matching".to_string());
        }
        if self.show_warning_indicator {
            out.push("A warning indicator is shown on your profile".to_string());
        }
        if self.response_delay_ms > 0 {
            out.push(format!(
                "Responses to your requests are delayed by {} seconds",
                self.response_delay_ms / 1000
            ));
        }
        if self.reduce_proposal_visibility {
            out.push("Your proposals are shown to fewer members".to_string());
        }
        if self.block_high_value_exchanges {
            out.push("High-value exchanges are blocked".to_string());
        }
        out
    }
}

/// Strike lifecycle. `Active` is the only entry point; the others are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrikeStatus {
    Active,
    Deactivated,
    Overridden,
}

impl StrikeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StrikeStatus::Active)
    }
}

/// Status and level of a strike at one moment, kept in audit logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrikeSnapshot {
    pub status: StrikeStatus,
    pub throttle_level: ThrottleLevel,
}

/// A strike held by this node against one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalStrike {
    pub id: String,
    pub alert_id: String,
    pub target_user_id: String,
    pub throttle_level: ThrottleLevel,
    pub throttle_actions: ThrottleActions,
    pub status: StrikeStatus,
    pub automatic: bool,
    /// Steward who enforced the alert by hand
    #[serde(default)]
    pub activated_by: Option<String>,
    pub behavior_score_at_start: f64,
    pub current_behavior_score: f64,
    pub activated_at: DateTime<Utc>,
    #[serde(default)]
    pub deactivated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub overridden_by: Option<String>,
    #[serde(default)]
    pub override_reason: Option<String>,
    #[serde(default)]
    pub overridden_at: Option<DateTime<Utc>>,
}

impl LocalStrike {
    /// Build a fresh active strike for an alert.
    pub fn activate(
        alert_id: &str,
        target_user_id: &str,
        severity: Severity,
        behavior_score: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let level = ThrottleLevel::from_severity(severity);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            alert_id: alert_id.to_string(),
            target_user_id: target_user_id.to_string(),
            throttle_level: level,
            throttle_actions: level.actions(),
            status: StrikeStatus::Active,
            automatic: true,
            activated_by: None,
            behavior_score_at_start: behavior_score,
            current_behavior_score: behavior_score,
            activated_at: now,
            deactivated_at: None,
            overridden_by: None,
            override_reason: None,
            overridden_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == StrikeStatus::Active
    }

    pub fn snapshot(&self) -> StrikeSnapshot {
        StrikeSnapshot {
            status: self.status,
            throttle_level: self.throttle_level,
        }
    }

    /// Move to a new level and regenerate its actions.
    pub fn set_level(&mut self, level: ThrottleLevel) {
        self.throttle_level = level;
        self.throttle_actions = level.actions();
    }

    pub(crate) fn deactivate(&mut self, now: DateTime<Utc>) {
        self.status = StrikeStatus::Deactivated;
        self.deactivated_at = Some(now);
    }

    pub(crate) fn record_override(&mut self, steward: &str, reason: &str, now: DateTime<Utc>) {
        self.overridden_by = Some(steward.to_string());
        self.override_reason = Some(reason.to_string());
        self.overridden_at = Some(now);
    }
}
