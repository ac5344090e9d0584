//! Steward-granted immunity from automatic strikes.

use super::alert::AbuseType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whitelist entries without an explicit duration last this long.
pub const DEFAULT_WHITELIST_DAYS: u32 = 30;

/// What a whitelist entry covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "abuseType", rename_all = "kebab-case")]
pub enum WhitelistScope {
    All,
    SpecificAbuseType(AbuseType),
}

impl WhitelistScope {
    pub fn covers(self, abuse_type: AbuseType) -> bool {
        match self {
            WhitelistScope::All => true,
            WhitelistScope::SpecificAbuseType(t) => t == abuse_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserStrikeWhitelist {
    pub id: String,
    pub user_id: String,
    pub whitelisted_by: String,
    pub reason: String,
    pub scope: WhitelistScope,
    pub is_permanent: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserStrikeWhitelist {
    /// Whether the entry is in force at `now`.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        if self.is_permanent {
            return true;
        }
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }

    /// Whether this entry blocks automatic strikes for `abuse_type` at `now`.
    pub fn protects(&self, abuse_type: AbuseType, now: DateTime<Utc>) -> bool {
        self.scope.covers(abuse_type) && self.is_current(now)
    }
}
