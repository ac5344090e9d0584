//! Strike Node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with one shared RocksDB store and one engine
//! - HTTP API for the surrounding application
//! - TCP gossip for alert flooding between nodes
//! - Unix admin socket for steward ops (strike-admin CLI)

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::config::NodeConfig;
use crate::gossip::{Flood, GossipService};
use mycelial_strike::identity::fingerprint;
use mycelial_strike::{DefenseEngine, Result, Storage, StoredTrust};
use std::sync::Arc;

/// Alerts buffered per peer connection before a slow peer starts lagging.
const FLOOD_CAPACITY: usize = 1024;

/// Shared state for the node, handed to the API and admin socket.
pub struct NodeState {
    pub engine: DefenseEngine,
    pub flood: Flood,
    pub fingerprint: String,
    pub config: NodeConfig,
}

/// A strike node instance.
pub struct StrikeNode {
    state: Arc<NodeState>,
}

impl StrikeNode {
    /// Open storage, load the node identity and build the engine.
    pub fn new(config: NodeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let storage = Arc::new(Storage::open(&config.data_dir)?);

        let signing_key = storage.get_or_create_node_key()?;
        let fingerprint = fingerprint(&signing_key.verifying_key());
        tracing::info!("Node fingerprint: {}", fingerprint);

        let trust = StoredTrust::new(Arc::clone(&storage), config.default_trust)
            .with_self_fingerprint(fingerprint.clone());
        let engine = DefenseEngine::new(storage, Arc::new(trust));

        let state = Arc::new(NodeState {
            engine,
            flood: Flood::new(FLOOD_CAPACITY),
            fingerprint,
            config,
        });

        Ok(Self { state })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Run the node (starts HTTP server, admin socket, and alert gossip).
    pub async fn run(self) -> Result<()> {
        let config = &self.state.config;
        tracing::info!("Strike node starting");
        tracing::info!("  API: http://{}", config.api_addr);
        tracing::info!("  P2P: {}", config.p2p_addr);
        tracing::info!("  Admin: {:?}", config.admin_socket);
        tracing::info!("  Data: {:?}", config.data_dir);

        let admin_socket = AdminSocket::new(self.state(), config.admin_socket.clone());
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        let gossip = Arc::new(GossipService::new(
            config.p2p_addr,
            config.bootstrap_peers.clone(),
            self.state.engine.clone(),
            self.state.flood.clone(),
            self.state.fingerprint.clone(),
        ));
        tokio::spawn(async move {
            if let Err(e) = gossip.run().await {
                tracing::error!("Gossip service error: {}", e);
            }
        });

        let app = api::build_router(self.state());

        let listener = tokio::net::TcpListener::bind(config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", config.api_addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}
