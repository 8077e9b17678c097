//! grove-keeper: the automated harvest-and-route caller.
//!
//! Builds an in-memory deployment from the TOML configuration and, on
//! every tick, simulates lending-market interest, harvests and routes the
//! vault's yield, spends the cascade pool's balance and services the
//! competition pool. Runs a fixed number of rounds or until Ctrl-C.

mod config;
mod deployment;

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info};

use crate::config::KeeperConfig;
use crate::deployment::Deployment;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = KeeperConfig::load()?;

    // 2. Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("grove={}", config.keeper.log_level).parse()?),
        )
        .init();

    info!(
        tick_secs = config.keeper.tick_secs,
        rounds = config.keeper.rounds,
        "Grove keeper starting"
    );

    // 3. Wire the deployment
    let mut deployment = Deployment::build(&config, unix_now())?;
    let mut rng = match config.keeper.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    // 4. Run rounds until done or interrupted
    let mut interval = tokio::time::interval(Duration::from_secs(config.keeper.tick_secs.max(1)));
    let mut round: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                round += 1;
                match deployment.run_round(round, unix_now(), &mut rng) {
                    Ok(report) => {
                        info!(report = %serde_json::to_string(&report)?, "round complete")
                    }
                    Err(e) => error!(round, "round failed: {:#}", e),
                }
                for event in deployment.drain_events() {
                    debug!(event = %serde_json::to_string(&event)?, "protocol event");
                }
                info!(
                    metrics = %serde_json::to_string(&deployment.metrics())?,
                    total_routed = %deployment.total_routed(),
                    "vault metrics"
                );
                if config.keeper.rounds != 0 && round >= config.keeper.rounds {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    info!(rounds = round, "Keeper stopped");
    Ok(())
}

/// Current Unix time in seconds.
fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
