//! Compotastic node binary
//!
//! Runs one learning agent on a grid world and shares its experience with
//! the peers listed in `COMPOTASTIC_PEERS` over UDP.

use compotastic_learning::GridWorld;
use compotastic_node::{MeshNode, NodeConfig, NodeRunner, UdpConfig, UdpTransport};
use compotastic_wire::GridPosition;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compotastic=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = NodeConfig::from_env()?;
    tracing::info!("Starting Compotastic node {}", config.address);
    tracing::debug!("Config: {}", serde_json::to_string(&config)?);

    let world = grid_world(&config)?;
    let transport = UdpTransport::bind(UdpConfig {
        bind: config.bind,
        peers: config.peers.clone(),
        max_frame_size: config.max_frame_size,
        ..Default::default()
    })
    .await?;

    let node = MeshNode::new(config)?;
    let runner = NodeRunner::new(node, transport, world)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };
    runner.run(shutdown).await?;

    Ok(())
}

/// Grid with a charging tile near one corner and a hazard in the middle.
fn grid_world(config: &NodeConfig) -> compotastic_node::Result<GridWorld> {
    let (w, h) = (config.grid_width, config.grid_height);
    let start = GridPosition::new(w / 2, h / 2);
    let world = GridWorld::new(w, h, start)?
        .with_reward(GridPosition::new(w - 2, 1), 10)
        .with_reward(GridPosition::new(1, h - 2), 4)
        .with_reward(GridPosition::new(w / 2, h / 2 - 1), -5);
    Ok(world)
}
