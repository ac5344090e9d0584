//! Mycelial Node - reference host for the strike engine
//!
//! Runs one [`mycelial_strike::DefenseEngine`] per process and connects it
//! to the outside world.
//!
//! # Architecture
//!
//! - **Config**: Environment-driven node settings
//! - **Gossip**: TCP flood transport for warlord alerts
//! - **API**: HTTP endpoints for the surrounding application
//! - **Admin Socket**: Unix socket for steward commands (strike-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use mycelial_node::{NodeConfig, StrikeNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = StrikeNode::new(config)?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod config;
pub mod gossip;
pub mod node;

pub use config::NodeConfig;
pub use gossip::{Flood, Frame, GossipService};
pub use node::{NodeState, StrikeNode};
