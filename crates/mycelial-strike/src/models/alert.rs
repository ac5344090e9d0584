//! Warlord alert model - an evidence-backed claim against a user.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Alerts are advisory for this many days after creation.
pub const ALERT_TTL_DAYS: i64 = 7;

/// Alert severity, always within 1..=10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Severity(u8);

impl Severity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    /// Validate a raw severity value.
    pub fn new(value: i64) -> Result<Self> {
        if value < i64::from(Self::MIN) || value > i64::from(Self::MAX) {
            return Err(Error::Validation(format!(
                "severity must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )));
        }
        Ok(Self(value as u8))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Severity {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds of extractive behavior an alert can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbuseType {
    /// Hoarding shared power or equipment
    BatteryWarlord,
    /// Receiving far more than contributing
    ExtractionPattern,
    Harassment,
    Spam,
    Exploitation,
}

impl AbuseType {
    pub const ALL: [AbuseType; 5] = [
        AbuseType::BatteryWarlord,
        AbuseType::ExtractionPattern,
        AbuseType::Harassment,
        AbuseType::Spam,
        AbuseType::Exploitation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AbuseType::BatteryWarlord => "battery-warlord",
            AbuseType::ExtractionPattern => "extraction-pattern",
            AbuseType::Harassment => "harassment",
            AbuseType::Spam => "spam",
            AbuseType::Exploitation => "exploitation",
        }
    }
}

impl fmt::Display for AbuseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AbuseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AbuseType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown abuse type: {}", s)))
    }
}

/// One piece of evidence attached to an alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Evidence {
    /// Evidence category, e.g. "exchange-ratio"
    #[serde(rename = "type")]
    pub kind: String,

    /// Human-readable details
    pub details: String,

    /// Reporter's confidence in this item, within [0, 1]
    pub reliability_score: f64,
}

impl Evidence {
    pub fn new(kind: impl Into<String>, details: impl Into<String>, reliability_score: f64) -> Self {
        Self {
            kind: kind.into(),
            details: details.into(),
            reliability_score,
        }
    }

    /// Plain description shown to the target user (no reliability internals).
    pub fn description(&self) -> String {
        format!("{}: {}", self.kind, self.details)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.reliability_score) {
            return Err(Error::Validation(format!(
                "evidence reliability score must be within [0, 1], got {}",
                self.reliability_score
            )));
        }
        Ok(())
    }
}

/// A warlord alert, created locally or received from another node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WarlordAlert {
    pub id: String,
    pub target_user_id: String,
    pub severity: Severity,
    pub abuse_type: AbuseType,
    pub evidence: Vec<Evidence>,
    pub reporting_node_fingerprint: String,
    #[serde(default)]
    pub reporting_user_id: Option<String>,
    #[serde(default)]
    pub trusted_source: bool,
    /// Incremented by the transport on each forward
    #[serde(default)]
    pub propagation_count: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub cancelled_by: Option<String>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl WarlordAlert {
    /// Check structural invariants. Applied to local and received alerts alike.
    pub fn validate(&self) -> Result<()> {
        crate::error::require_text("alert id", &self.id)?;
        crate::error::require_text("target user id", &self.target_user_id)?;
        crate::error::require_text("reporting node fingerprint", &self.reporting_node_fingerprint)?;
        if self.evidence.is_empty() {
            return Err(Error::Validation("alert requires at least one piece of evidence".into()));
        }
        for item in &self.evidence {
            item.validate()?;
        }
        Ok(())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Set the cancellation fields. Returns false if already cancelled.
    pub fn cancel(&mut self, cancelled_by: &str, reason: &str, now: DateTime<Utc>) -> bool {
        if self.cancelled {
            return false;
        }
        self.cancelled = true;
        self.cancelled_by = Some(cancelled_by.to_string());
        self.cancellation_reason = Some(reason.to_string());
        self.cancelled_at = Some(now);
        true
    }

    /// Expiry for an alert created at `created_at`.
    pub fn expiry_for(created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + Duration::days(ALERT_TTL_DAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bounds() {
        assert!(Severity::new(0).is_err());
        assert!(Severity::new(11).is_err());
        assert!(Severity::new(-3).is_err());
        assert_eq!(Severity::new(1).unwrap().get(), 1);
        assert_eq!(Severity::new(10).unwrap().get(), 10);
    }

    #[test]
    fn severity_rejected_on_the_wire() {
        let parsed: std::result::Result<Severity, _> = serde_json::from_str("11");
        assert!(parsed.is_err());
        let parsed: Severity = serde_json::from_str("4").unwrap();
        assert_eq!(parsed.get(), 4);
    }

    #[test]
    fn abuse_type_names() {
        let json = serde_json::to_string(&AbuseType::BatteryWarlord).unwrap();
        assert_eq!(json, "\"battery-warlord\"");
        for t in AbuseType::ALL {
            assert_eq!(t.as_str().parse::<AbuseType>().unwrap(), t);
        }
        assert!("griefing".parse::<AbuseType>().is_err());
    }

    #[test]
    fn evidence_rejects_unknown_fields() {
        let json = r#"{"type":"exchange-ratio","details":"0 given","reliabilityScore":0.8,"reporter":"n1"}"#;
        let parsed: std::result::Result<Evidence, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn cancel_sets_fields_once() {
        let now = Utc::now();
        let mut alert = WarlordAlert {
            id: "a1".into(),
            target_user_id: "u1".into(),
            severity: Severity::new(5).unwrap(),
            abuse_type: AbuseType::Spam,
            evidence: vec![Evidence::new("post-rate", "40 posts/hour", 0.9)],
            reporting_node_fingerprint: "node".into(),
            reporting_user_id: None,
            trusted_source: false,
            propagation_count: 0,
            created_at: now,
            expires_at: WarlordAlert::expiry_for(now),
            cancelled: false,
            cancelled_by: None,
            cancellation_reason: None,
            cancelled_at: None,
        };

        assert!(alert.cancel("steward", "mistaken report", now));
        assert!(!alert.cancel("other", "again", now));
        assert_eq!(alert.cancelled_by.as_deref(), Some("steward"));
        assert_eq!(alert.cancellation_reason.as_deref(), Some("mistaken report"));
    }
}
