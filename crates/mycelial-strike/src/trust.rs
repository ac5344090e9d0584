//! Trust score providers.
//!
//! Scores come from the Web-of-Trust layer; the engine only reads them. A
//! provider is injected into [`crate::DefenseEngine`] at construction.

use crate::storage::Storage;
use std::sync::Arc;

/// Minimum trust a reporting node needs for its alerts to trigger automatic strikes.
pub const TRUST_THRESHOLD: f64 = 0.6;

/// Source of trust scores in [0, 1] for node fingerprints or user ids.
pub trait TrustProvider: Send + Sync {
    fn trust_score(&self, subject: &str) -> f64;
}

/// Same score for every subject.
#[derive(Debug, Clone, Copy)]
pub struct FixedTrust(pub f64);

impl TrustProvider for FixedTrust {
    fn trust_score(&self, _subject: &str) -> f64 {
        self.0
    }
}

/// Trust table kept in the node's store and edited by stewards.
pub struct StoredTrust {
    storage: Arc<Storage>,
    default_score: f64,
    self_fingerprint: Option<String>,
}

impl StoredTrust {
    pub fn new(storage: Arc<Storage>, default_score: f64) -> Self {
        Self {
            storage,
            default_score: normalize(default_score),
            self_fingerprint: None,
        }
    }

    /// Alerts created by this node are fully trusted.
    pub fn with_self_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.self_fingerprint = Some(fingerprint.into());
        self
    }
}

impl TrustProvider for StoredTrust {
    fn trust_score(&self, subject: &str) -> f64 {
        if self.self_fingerprint.as_deref() == Some(subject) {
            return 1.0;
        }
        match self.storage.get_trust(subject) {
            Ok(Some(score)) => normalize(score),
            Ok(None) => self.default_score,
            Err(e) => {
                // Fail closed: an unreadable score never enables enforcement.
                tracing::warn!("Trust lookup failed for {}: {}", subject, e);
                0.0
            }
        }
    }
}

/// Clamp into [0, 1]; non-finite scores count as untrusted.
pub fn normalize(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
