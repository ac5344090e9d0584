//! Mycelial Strike - node-local defense against extractive users
//!
//! Each node in a mutual-aid mesh receives warlord alerts from its peers and
//! decides on its own whether to throttle the reported user. Enforcement is
//! gated on the reporting node's trust score, never leaves the node, and
//! steps down automatically as the user's behavior improves.
//!
//! # Architecture
//!
//! - **Models**: Alerts, strikes, behavior records, whitelist and audit logs
//! - **Storage**: RocksDB-backed persistent storage with atomic batches
//! - **AlertManager**: Alert creation, cancellation and the review queue
//! - **PropagationGate**: Trust-gated admission of delivered alerts
//! - **StrikeEngine**: Severity to throttle mapping and strike reads
//! - **BehaviorTracker / DeescalationController**: Score updates and step-downs
//! - **Oversight**: Steward overrides, whitelist and manual enforcement
//! - **DefenseEngine**: Facade taking per-user locks around every mutation
//!
//! # Example
//!
//! ```no_run
//! use mycelial_strike::{DefenseEngine, FixedTrust, Storage};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Arc::new(Storage::open("./strike-data")?);
//!     let engine = DefenseEngine::new(storage, Arc::new(FixedTrust(0.5)));
//!     println!("{:?}", engine.get_active_strikes("user-1")?);
//!     Ok(())
//! }
//! ```

pub mod alerts;
pub mod behavior;
pub mod deescalation;
pub mod engine;
pub mod error;
pub mod gate;
pub mod identity;
pub mod locks;
pub mod models;
pub mod oversight;
pub mod status;
pub mod storage;
pub mod strikes;
pub mod trust;

pub use alerts::{AlertManager, CancelOutcome, NewAlert};
pub use behavior::{BehaviorTracker, BehaviorUpdate};
pub use deescalation::{DeescalationCheck, DeescalationController, IMPROVEMENT_STEP};
pub use engine::DefenseEngine;
pub use error::{Error, Result};
pub use gate::{GateOutcome, PropagationGate};
pub use models::{
    AbuseType, ActivityDelta, BehaviorTracking, DeescalationReason, Evidence, LocalStrike,
    OverrideAction, Severity, StrikeDeescalationLog, StrikeOverrideLog, StrikeSnapshot,
    StrikeStatus, ThrottleActions, ThrottleLevel, UserStrikeWhitelist, WarlordAlert,
    WhitelistScope,
};
pub use oversight::{NewWhitelist, OverrideResult, Oversight};
pub use status::StrikeStatusView;
pub use storage::Storage;
pub use strikes::StrikeEngine;
pub use trust::{FixedTrust, StoredTrust, TrustProvider, TRUST_THRESHOLD};
