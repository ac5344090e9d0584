//! Records kept by the strike engine.
//!
//! # Core Types
//!
//! - [`WarlordAlert`] - Evidence-backed claim against a user
//! - [`LocalStrike`] - Node-local throttle derived from one alert
//! - [`BehaviorTracking`] - Rolling activity window and behavior score
//! - [`UserStrikeWhitelist`] - Steward-granted immunity
//!
//! # Audit
//!
//! - [`StrikeDeescalationLog`] - Automatic step-downs
//! - [`StrikeOverrideLog`] - Steward overrides with before/after snapshots

mod alert;
mod audit;
mod strike;
mod tracking;
mod whitelist;

pub use alert::{AbuseType, Evidence, Severity, WarlordAlert, ALERT_TTL_DAYS};
pub use audit::{DeescalationReason, OverrideAction, StrikeDeescalationLog, StrikeOverrideLog};
pub use strike::{LocalStrike, StrikeSnapshot, StrikeStatus, ThrottleActions, ThrottleLevel};
pub use tracking::{ActivityDelta, BehaviorTracking, BEHAVIOR_WINDOW_DAYS, NEUTRAL_SCORE};
pub use whitelist::{UserStrikeWhitelist, WhitelistScope, DEFAULT_WHITELIST_DAYS};
