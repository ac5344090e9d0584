//! Node configuration from `STRIKE_*` environment variables.

use mycelial_strike::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_DATA_DIR: &str = "./strike-data";
const DEFAULT_API_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_P2P_ADDR: &str = "0.0.0.0:9000";
const DEFAULT_TRUST: f64 = 0.5;

/// Configuration for a strike node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// P2P listen address (alert flooding)
    pub p2p_addr: SocketAddr,

    /// Bootstrap peers
    pub bootstrap_peers: Vec<String>,

    /// Admin socket path (for strike-admin CLI)
    pub admin_socket: PathBuf,

    /// Trust given to reporting nodes with no steward-assigned score
    pub default_trust: f64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        Self {
            admin_socket: data_dir.join("admin.sock"),
            data_dir,
            api_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            p2p_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            bootstrap_peers: Vec::new(),
            default_trust: DEFAULT_TRUST,
        }
    }
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Malformed values are validation errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = PathBuf::from(lookup("STRIKE_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));

        let api_addr = parse_addr("STRIKE_API_ADDR", lookup("STRIKE_API_ADDR"), DEFAULT_API_ADDR)?;
        let p2p_addr = parse_addr("STRIKE_P2P_ADDR", lookup("STRIKE_P2P_ADDR"), DEFAULT_P2P_ADDR)?;

        let bootstrap_peers = lookup("STRIKE_BOOTSTRAP_PEERS")
            .map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        let admin_socket = lookup("STRIKE_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("admin.sock"));

        let default_trust = match lookup("STRIKE_DEFAULT_TRUST") {
            Some(raw) => {
                let score: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| Error::Validation(format!("Invalid STRIKE_DEFAULT_TRUST: {}", raw)))?;
                if !(0.0..=1.0).contains(&score) {
                    return Err(Error::Validation(format!(
                        "STRIKE_DEFAULT_TRUST must be within [0, 1], got {}",
                        score
                    )));
                }
                score
            }
            None => DEFAULT_TRUST,
        };

        Ok(Self {
            data_dir,
            api_addr,
            p2p_addr,
            bootstrap_peers,
            admin_socket,
            default_trust,
        })
    }
}

fn parse_addr(key: &str, value: Option<String>, default: &str) -> Result<SocketAddr> {
    let raw = value.unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|_| Error::Validation(format!("Invalid {}: {}", key, raw)))
}
