//! Unix socket server for steward commands.
//!
//! Provides a local IPC interface for overrides, whitelist grants, alert
//! cancellation and enforcement, and the trust table.

use crate::node::NodeState;
use mycelial_strike::{AbuseType, NewWhitelist, OverrideAction, Result, WhitelistScope};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Admin command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Apply an override action to an active strike
    Override {
        strike_id: String,
        steward: String,
        action: OverrideAction,
        reason: String,
    },
    /// Whitelist a user, for one abuse type or all of them
    Whitelist {
        user_id: String,
        steward: String,
        reason: String,
        #[serde(default)]
        abuse_type: Option<AbuseType>,
        #[serde(default)]
        permanent: bool,
        #[serde(default)]
        days: Option<u32>,
    },
    /// Cancel an alert and flood the cancellation
    CancelAlert {
        alert_id: String,
        steward: String,
        reason: String,
    },
    /// Turn a held alert into a manual strike
    EnforceAlert {
        alert_id: String,
        steward: String,
        reason: String,
    },
    /// Set the trust score of a reporting node
    SetTrust { fingerprint: String, score: f64 },
    /// List alerts awaiting review
    ReviewQueue,
    /// Strike status for a user
    Status { user_id: String },
    /// This node's fingerprint
    Fingerprint,
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    List { items: Vec<String> },
    Report { report: serde_json::Value },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    state: Arc<NodeState>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(state: Arc<NodeState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove a stale socket left by a previous run
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<NodeState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &state),
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

fn report<T: Serialize>(value: &T) -> AdminResponse {
    match serde_json::to_value(value) {
        Ok(report) => AdminResponse::Report { report },
        Err(e) => AdminResponse::Error { error: e.to_string() },
    }
}

/// Flood the stored copy of an alert; a failed read is logged, not fatal.
fn publish_alert(state: &NodeState, alert_id: &str) {
    match state.engine.get_alert(alert_id) {
        Ok(Some(alert)) => state.flood.publish(alert),
        Ok(None) => tracing::warn!("Alert {} vanished before it could be flooded", alert_id),
        Err(e) => tracing::warn!("Failed to read alert {} for flooding: {}", alert_id, e),
    }
}

pub fn execute_command(cmd: AdminCommand, state: &NodeState) -> AdminResponse {
    let engine = &state.engine;
    match cmd {
        AdminCommand::Override {
            strike_id,
            steward,
            action,
            reason,
        } => match engine.override_strike(&strike_id, &steward, action, &reason) {
            Ok(result) => {
                if matches!(action, OverrideAction::CancelAlert) {
                    publish_alert(state, &result.strike.alert_id);
                }
                AdminResponse::Ok {
                    message: format!(
                        "Applied {} to strike {} (now {:?} at {})",
                        action.name(),
                        strike_id,
                        result.strike.status,
                        result.strike.throttle_level
                    ),
                }
            }
            Err(e) => AdminResponse::Error { error: e.to_string() },
        },

        AdminCommand::Whitelist {
            user_id,
            steward,
            reason,
            abuse_type,
            permanent,
            days,
        } => {
            let scope = match abuse_type {
                Some(t) => WhitelistScope::SpecificAbuseType(t),
                None => WhitelistScope::All,
            };
            match engine.whitelist_user(NewWhitelist {
                user_id,
                whitelisted_by: steward,
                reason,
                scope,
                is_permanent: permanent,
                duration_days: days,
            }) {
                Ok(entry) => AdminResponse::Ok {
                    message: match entry.expires_at {
                        Some(at) => format!("Whitelisted {} until {}", entry.user_id, at.to_rfc3339()),
                        None => format!("Whitelisted {} permanently", entry.user_id),
                    },
                },
                Err(e) => AdminResponse::Error { error: e.to_string() },
            }
        }

        AdminCommand::CancelAlert {
            alert_id,
            steward,
            reason,
        } => match engine.cancel_alert(&alert_id, &steward, &reason) {
            Ok(outcome) if outcome.already_cancelled => AdminResponse::Ok {
                message: format!("Alert {} was already cancelled", alert_id),
            },
            Ok(outcome) => {
                let count = outcome.deactivated_strikes.len();
                state.flood.publish(outcome.alert);
                AdminResponse::Ok {
                    message: format!("Cancelled alert {}; {} strike(s) deactivated", alert_id, count),
                }
            }
            Err(e) => AdminResponse::Error { error: e.to_string() },
        },

        AdminCommand::EnforceAlert {
            alert_id,
            steward,
            reason,
        } => match engine.enforce_alert(&alert_id, &steward, &reason) {
            Ok(strike) => AdminResponse::Ok {
                message: format!("Strike {} active at {}", strike.id, strike.throttle_level),
            },
            Err(e) => AdminResponse::Error { error: e.to_string() },
        },

        AdminCommand::SetTrust { fingerprint, score } => {
            match engine.storage().set_trust(&fingerprint, score) {
                Ok(stored) => {
                    tracing::info!("Trust for {} set to {:.2}", fingerprint, stored);
                    AdminResponse::Ok {
                        message: format!("Trust for {} set to {:.2}", fingerprint, stored),
                    }
                }
                Err(e) => AdminResponse::Error { error: e.to_string() },
            }
        }

        AdminCommand::ReviewQueue => match engine.review_queue() {
            Ok(alerts) => AdminResponse::List {
                items: alerts
                    .iter()
                    .map(|a| {
                        format!(
                            "{}  {}  severity {}  target {}  from {}",
                            a.id, a.abuse_type, a.severity, a.target_user_id, a.reporting_node_fingerprint
                        )
                    })
                    .collect(),
            },
            Err(e) => AdminResponse::Error { error: e.to_string() },
        },

        AdminCommand::Status { user_id } => match engine.get_strike_status(&user_id) {
            Ok(view) => report(&view),
            Err(e) => AdminResponse::Error { error: e.to_string() },
        },

        AdminCommand::Fingerprint => AdminResponse::Ok {
            message: state.fingerprint.clone(),
        },

        AdminCommand::Ping => AdminResponse::Pong,
    }
}

/// Default socket path.
pub fn default_socket_path() -> PathBuf {
    let data_dir = std::env::var("STRIKE_DATA_DIR").unwrap_or_else(|_| "./strike-data".to_string());
    PathBuf::from(data_dir).join("admin.sock")
}
