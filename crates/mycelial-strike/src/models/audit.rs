//! Append-only audit records for strike changes.

use super::alert::Severity;
use super::strike::{LocalStrike, StrikeSnapshot, ThrottleLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a strike stepped down or ended without a steward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeescalationReason {
    BehaviorImproved,
    AlertCancelled,
}

/// One automatic step down (or deactivation) of a strike.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StrikeDeescalationLog {
    pub id: String,
    pub strike_id: String,
    pub previous_level: ThrottleLevel,
    /// `None` when the strike was deactivated
    pub new_level: Option<ThrottleLevel>,
    pub trigger_reason: DeescalationReason,
    pub behavior_score_at_start: f64,
    pub current_behavior_score: f64,
    pub created_at: DateTime<Utc>,
}

impl StrikeDeescalationLog {
    /// Record the step from `previous_level` to the strike's current state.
    pub fn record(
        strike: &LocalStrike,
        previous_level: ThrottleLevel,
        trigger_reason: DeescalationReason,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            strike_id: strike.id.clone(),
            previous_level,
            new_level: strike.is_active().then_some(strike.throttle_level),
            trigger_reason,
            behavior_score_at_start: strike.behavior_score_at_start,
            current_behavior_score: strike.current_behavior_score,
            created_at: now,
        }
    }
}

/// Steward action applied to an active strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum OverrideAction {
    /// End the strike
    CancelStrike,
    /// End the strike and cancel its alert (cascades to sibling strikes)
    CancelAlert,
    /// Keep the strike, re-derive its level from a new severity
    AdjustSeverity { severity: Severity },
    /// Grant immunity for the alert's abuse type, then end the strike
    #[serde(rename_all = "camelCase")]
    WhitelistUser {
        #[serde(default)]
        is_permanent: bool,
        #[serde(default)]
        duration_days: Option<u32>,
    },
}

impl OverrideAction {
    pub fn name(&self) -> &'static str {
        match self {
            OverrideAction::CancelStrike => "cancel-strike",
            OverrideAction::CancelAlert => "cancel-alert",
            OverrideAction::AdjustSeverity { .. } => "adjust-severity",
            OverrideAction::WhitelistUser { .. } => "whitelist-user",
        }
    }
}

/// Immutable record of one steward override.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StrikeOverrideLog {
    pub id: String,
    pub strike_id: String,
    pub alert_id: String,
    pub target_user_id: String,
    pub action: OverrideAction,
    pub overridden_by: String,
    pub reason: String,
    pub before_state: StrikeSnapshot,
    pub after_state: StrikeSnapshot,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_action_wire_format() {
        let json = serde_json::to_value(OverrideAction::CancelStrike).unwrap();
        assert_eq!(json, serde_json::json!({"action": "cancel-strike"}));

        let parsed: OverrideAction =
            serde_json::from_str(r#"{"action":"adjust-severity","severity":3}"#).unwrap();
        assert_eq!(
            parsed,
            OverrideAction::AdjustSeverity {
                severity: Severity::new(3).unwrap()
            }
        );

        let parsed: OverrideAction =
            serde_json::from_str(r#"{"action":"whitelist-user","durationDays":14}"#).unwrap();
        assert_eq!(
            parsed,
            OverrideAction::WhitelistUser {
                is_permanent: false,
                duration_days: Some(14)
            }
        );
    }

    #[test]
    fn adjust_severity_rejects_out_of_range() {
        let parsed: std::result::Result<OverrideAction, _> =
            serde_json::from_str(r#"{"action":"adjust-severity","severity":0}"#);
        assert!(parsed.is_err());
    }
}
