//! Persistent storage using RocksDB.
//!
//! Records are stored as JSON under `kind:id` keys. Strikes carry two index
//! families (`strike-user:` and `strike-alert:`) whose values are strike ids.
//! Multi-record changes go through [`StoreBatch`] so they land atomically.

use crate::error::{Error, Result};
use crate::models::{
    BehaviorTracking, LocalStrike, StrikeDeescalationLog, StrikeOverrideLog, UserStrikeWhitelist,
    WarlordAlert,
};
use ed25519_dalek::SigningKey;
use rocksdb::{Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Storage backend for strike engine records.
pub struct Storage {
    db: DB,
}

/// A set of writes committed together by [`Storage::commit`].
#[derive(Default)]
pub struct StoreBatch {
    inner: WriteBatch,
    writes: usize,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    fn put_json<T: Serialize>(&mut self, key: String, value: &T) -> Result<()> {
        let value = serde_json::to_vec(value)?;
        self.inner.put(key.as_bytes(), value);
        self.writes += 1;
        Ok(())
    }

    pub fn put_alert(&mut self, alert: &WarlordAlert) -> Result<()> {
        self.put_json(format!("alert:{}", alert.id), alert)
    }

    /// Store a strike together with its user and alert index entries.
    pub fn put_strike(&mut self, strike: &LocalStrike) -> Result<()> {
        self.put_json(format!("strike:{}", strike.id), strike)?;
        self.inner.put(
            format!("strike-user:{}:{}", strike.target_user_id, strike.id).as_bytes(),
            strike.id.as_bytes(),
        );
        self.inner.put(
            format!("strike-alert:{}:{}", strike.alert_id, strike.id).as_bytes(),
            strike.id.as_bytes(),
        );
        Ok(())
    }

    pub fn put_behavior(&mut self, tracking: &BehaviorTracking) -> Result<()> {
        self.put_json(format!("behavior:{}", tracking.user_id), tracking)
    }

    pub fn put_deescalation_log(&mut self, log: &StrikeDeescalationLog) -> Result<()> {
        self.put_json(format!("deescalation:{}:{}", log.strike_id, log.id), log)
    }

    pub fn put_override_log(&mut self, log: &StrikeOverrideLog) -> Result<()> {
        self.put_json(format!("override:{}:{}", log.strike_id, log.id), log)
    }

    pub fn put_whitelist(&mut self, entry: &UserStrikeWhitelist) -> Result<()> {
        self.put_json(format!("whitelist:{}:{}", entry.user_id, entry.id), entry)
    }

    pub fn is_empty(&self) -> bool {
        self.writes == 0
    }
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    /// Apply every write in the batch, or none of them.
    pub fn commit(&self, batch: StoreBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.db.write(batch.inner)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<Box<[u8]>>> {
        let prefix = prefix.as_bytes();
        let mut values = Vec::new();

        let iter = self.db.prefix_iterator(prefix);
        for item in iter {
            let (key, value) = item?;
            if key.starts_with(prefix) {
                values.push(value);
            } else {
                break;
            }
        }

        Ok(values)
    }

    fn scan_json<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        self.scan_prefix(prefix)?
            .iter()
            .map(|value| serde_json::from_slice(value).map_err(Error::from))
            .collect()
    }

    fn strikes_from_index(&self, prefix: &str) -> Result<Vec<LocalStrike>> {
        let mut strikes = Vec::new();
        for id in self.scan_prefix(prefix)? {
            let id = String::from_utf8_lossy(&id);
            if let Some(strike) = self.get_strike(&id)? {
                strikes.push(strike);
            }
        }
        Ok(strikes)
    }

    // --- Alerts ---

    /// Store an alert.
    pub fn put_alert(&self, alert: &WarlordAlert) -> Result<()> {
        let mut batch = StoreBatch::new();
        batch.put_alert(alert)?;
        self.commit(batch)
    }

    /// Get an alert by ID.
    pub fn get_alert(&self, id: &str) -> Result<Option<WarlordAlert>> {
        self.get_json(&format!("alert:{}", id))
    }

    /// List all stored alerts.
    pub fn list_alerts(&self) -> Result<Vec<WarlordAlert>> {
        self.scan_json("alert:")
    }

    // --- Strikes ---

    /// Store a strike and its indexes.
    pub fn put_strike(&self, strike: &LocalStrike) -> Result<()> {
        let mut batch = StoreBatch::new();
        batch.put_strike(strike)?;
        self.commit(batch)
    }

    /// Get a strike by ID.
    pub fn get_strike(&self, id: &str) -> Result<Option<LocalStrike>> {
        self.get_json(&format!("strike:{}", id))
    }

    /// Every strike ever held against a user, oldest first.
    pub fn strikes_for_user(&self, user_id: &str) -> Result<Vec<LocalStrike>> {
        let mut strikes: Vec<LocalStrike> = self
            .strikes_from_index(&format!("strike-user:{}:", user_id))?
            .into_iter()
            .filter(|s| s.target_user_id == user_id)
            .collect();
        strikes.sort_by_key(|s| s.activated_at);
        Ok(strikes)
    }

    /// Every strike created from an alert.
    pub fn strikes_for_alert(&self, alert_id: &str) -> Result<Vec<LocalStrike>> {
        Ok(self
            .strikes_from_index(&format!("strike-alert:{}:", alert_id))?
            .into_iter()
            .filter(|s| s.alert_id == alert_id)
            .collect())
    }

    // --- Behavior ---

    /// Get a user's behavior record.
    pub fn get_behavior(&self, user_id: &str) -> Result<Option<BehaviorTracking>> {
        self.get_json(&format!("behavior:{}", user_id))
    }

    // --- Audit logs ---

    /// De-escalation history of a strike, oldest first.
    pub fn deescalation_logs(&self, strike_id: &str) -> Result<Vec<StrikeDeescalationLog>> {
        let mut logs: Vec<StrikeDeescalationLog> =
            self.scan_json(&format!("deescalation:{}:", strike_id))?;
        logs.retain(|l| l.strike_id == strike_id);
        logs.sort_by_key(|l| l.created_at);
        Ok(logs)
    }

    /// Override history of a strike, oldest first.
    pub fn override_logs(&self, strike_id: &str) -> Result<Vec<StrikeOverrideLog>> {
        let mut logs: Vec<StrikeOverrideLog> = self.scan_json(&format!("override:{}:", strike_id))?;
        logs.retain(|l| l.strike_id == strike_id);
        logs.sort_by_key(|l| l.created_at);
        Ok(logs)
    }

    // --- Whitelist ---

    /// Store a whitelist entry.
    pub fn put_whitelist(&self, entry: &UserStrikeWhitelist) -> Result<()> {
        let mut batch = StoreBatch::new();
        batch.put_whitelist(entry)?;
        self.commit(batch)
    }

    /// All whitelist entries for a user, including expired ones.
    pub fn whitelist_entries(&self, user_id: &str) -> Result<Vec<UserStrikeWhitelist>> {
        let mut entries: Vec<UserStrikeWhitelist> =
            self.scan_json(&format!("whitelist:{}:", user_id))?;
        entries.retain(|e| e.user_id == user_id);
        Ok(entries)
    }

    // --- Trust table ---

    /// Get the steward-assigned trust score for a node fingerprint.
    pub fn get_trust(&self, fingerprint: &str) -> Result<Option<f64>> {
        self.get_json(&format!("trust:{}", fingerprint))
    }

    /// Set the trust score for a node fingerprint, clamped to [0, 1].
    pub fn set_trust(&self, fingerprint: &str, score: f64) -> Result<f64> {
        if !score.is_finite() {
            return Err(Error::Validation(format!("trust score must be finite, got {}", score)));
        }
        let score = score.clamp(0.0, 1.0);
        let key = format!("trust:{}", fingerprint);
        self.db.put(key.as_bytes(), serde_json::to_vec(&score)?)?;
        Ok(score)
    }

    // --- Node Identity ---

    /// Get or create the node's signing key (persistent identity).
    pub fn get_or_create_node_key(&self) -> Result<SigningKey> {
        let key = b"node:signing_key";

        if let Some(data) = self.db.get(key)? {
            let bytes: [u8; 32] = data
                .as_slice()
                .try_into()
                .map_err(|_| Error::Storage("Invalid stored key".into()))?;
            Ok(SigningKey::from_bytes(&bytes))
        } else {
            let mut rng = rand::thread_rng();
            let signing_key = SigningKey::generate(&mut rng);
            self.db.put(key, signing_key.as_bytes())?;
            Ok(signing_key)
        }
    }
}
