//! Transparency view shown to a user under strike.
//!
//! The view aggregates evidence but never names the reporting nodes or
//! users, and never exposes reliability scores.

use crate::models::{
    AbuseType, BehaviorTracking, LocalStrike, Severity, ThrottleLevel, WarlordAlert, NEUTRAL_SCORE,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrikeStatusView {
    pub user_id: String,
    pub under_strike: bool,
    pub active_strikes: Vec<ActiveStrikeSummary>,
    pub alerts: Vec<AlertSummary>,
    pub behavior: BehaviorSnapshot,
    pub improvement_actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveStrikeSummary {
    pub strike_id: String,
    pub throttle_level: ThrottleLevel,
    pub restrictions: Vec<String>,
    pub activated_at: DateTime<Utc>,
    pub current_behavior_score: f64,
    pub automatic: bool,
}

/// Alert as seen by its target: no ids, no reporters, no reliability.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub severity: Severity,
    pub abuse_type: AbuseType,
    pub evidence: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorSnapshot {
    /// False when no activity has been recorded yet
    pub recorded: bool,
    pub behavior_score: f64,
    pub exchanges_given: u64,
    pub exchanges_received: u64,
    pub offers_posted: u64,
    pub needs_posted: u64,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

impl BehaviorSnapshot {
    fn from_tracking(tracking: Option<&BehaviorTracking>) -> Self {
        match tracking {
            Some(t) => Self {
                recorded: true,
                behavior_score: t.behavior_score,
                exchanges_given: t.exchanges_given,
                exchanges_received: t.exchanges_received,
                offers_posted: t.offers_posted,
                needs_posted: t.needs_posted,
                period_start: Some(t.period_start),
                period_end: Some(t.period_end),
            },
            None => Self {
                recorded: false,
                behavior_score: NEUTRAL_SCORE,
                exchanges_given: 0,
                exchanges_received: 0,
                offers_posted: 0,
                needs_posted: 0,
                period_start: None,
                period_end: None,
            },
        }
    }
}

pub(crate) fn build_view(
    user_id: &str,
    strikes: &[LocalStrike],
    alerts: &[WarlordAlert],
    behavior: Option<&BehaviorTracking>,
) -> StrikeStatusView {
    let active_strikes = strikes
        .iter()
        .filter(|s| s.is_active())
        .map(|s| ActiveStrikeSummary {
            strike_id: s.id.clone(),
            throttle_level: s.throttle_level,
            restrictions: s.throttle_actions.describe(),
            activated_at: s.activated_at,
            current_behavior_score: s.current_behavior_score,
            automatic: s.automatic,
        })
        .collect::<Vec<_>>();

    let alerts = alerts
        .iter()
        .map(|a| AlertSummary {
            severity: a.severity,
            abuse_type: a.abuse_type,
            evidence: a.evidence.iter().map(|e| e.description()).collect(),
            created_at: a.created_at,
        })
        .collect::<Vec<_>>();

    let under_strike = !active_strikes.is_empty();
    let abuse_types: Vec<AbuseType> = alerts.iter().map(|a| a.abuse_type).collect();
    let improvement_actions = if under_strike {
        improvement_actions(behavior, &abuse_types)
    } else {
        Vec::new()
    };

    StrikeStatusView {
        user_id: user_id.to_string(),
        under_strike,
        active_strikes,
        alerts,
        behavior: BehaviorSnapshot::from_tracking(behavior),
        improvement_actions,
    }
}

/// Concrete steps that raise the behavior score or address the reported abuse.
pub fn improvement_actions(behavior: Option<&BehaviorTracking>, abuse_types: &[AbuseType]) -> Vec<String> {
    let mut actions: Vec<String> = Vec::new();
    let mut push = |text: &str| {
        if !actions.iter().any(|a| a == text) {
            actions.push(text.to_string());
        }
    };

    let (given, received, offers, needs) = behavior
        .map(|t| (t.exchanges_given, t.exchanges_received, t.offers_posted, t.needs_posted))
        .unwrap_or_default();

    if received > given || given + received == 0 {
        push("Complete exchanges where you give, not just receive");
    }
    if offers == 0 {
        push("Post at least one offer of something you can share");
    }
    if offers + needs < 10 {
        push("Stay active: post offers and needs regularly");
    }

    for abuse_type in abuse_types {
        match abuse_type {
            AbuseType::BatteryWarlord => {
                push("Return shared batteries and equipment on time");
            }
            AbuseType::ExtractionPattern => {
                push("Complete exchanges where you give, not just receive");
            }
            AbuseType::Harassment => {
                push("Keep interactions respectful and stop contacting people who decline");
            }
            AbuseType::Spam => {
                push("Post fewer, more relevant listings");
            }
            AbuseType::Exploitation => {
                push("Honor the terms agreed in each exchange");
            }
        }
    }

    push("Strikes step down automatically as your behavior score rises 2 points above where it started");
    actions
}
