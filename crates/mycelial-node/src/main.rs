//! Strike Node binary
//!
//! Hosts one strike engine and connects it to peers, clients and stewards.

use mycelial_node::{NodeConfig, StrikeNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strike_node=info,mycelial=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Strike Node");

    let config = NodeConfig::from_env()?;

    let node = StrikeNode::new(config)?;
    node.run().await?;

    Ok(())
}
