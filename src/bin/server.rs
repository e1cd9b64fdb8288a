//! realm-keeps-server binary
//!
//! Loads keeps from a JSON seed document and runs the keep driver.
//!
//! ## Configuration (env / CLI)
//!
//! | Key                    | Default       | Description                        |
//! |------------------------|---------------|------------------------------------|
//! | `KEEPS_CONFIG`         | *(none)*      | TOML file layered over defaults    |
//! | `KEEPS_DATA`           | `keeps.json`  | Seed data for the in-memory store  |
//! | `KEEPS_TICK_RATE_HZ`   | `1`           | Driver loop rate                   |
//!
//! Every `KeepConfig` field can also be set as `KEEPS_<FIELD>`.

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use realm_keeps::{
    bonus::RealmBonusTracker,
    config::KeepConfig,
    driver::{DriverConfig, KeepDriver},
    events::DeathWatch,
    guild::GuildRoster,
    objects::ObjectFactory,
    protocol::Outbox,
    registry::KeepRegistry,
    store::MemoryStore,
    timer::{IdAllocator, SystemClock},
    world::{Services, SimWorld},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "realm-keeps-server", about = "Realm-war keep and tower server", version)]
struct Args {
    /// TOML config file
    #[arg(long, env = "KEEPS_CONFIG")]
    config: Option<PathBuf>,

    /// JSON seed data for the keep store
    #[arg(long, env = "KEEPS_DATA", default_value = "keeps.json")]
    data: PathBuf,

    /// Driver tick rate (Hz)
    #[arg(long, env = "KEEPS_TICK_RATE_HZ", default_value_t = 1.0)]
    tick_rate_hz: f32,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("realm_keeps=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = KeepConfig::load(args.config.as_deref()).context("Failed to load keep config")?;
    log::info!(
        "Starting realm-keeps-server (data='{}', ruleset={:?}, frontier region={})",
        args.data.display(),
        config.ruleset,
        config.frontier_region,
    );

    let store = MemoryStore::from_path(&args.data)
        .with_context(|| format!("Failed to read seed data from {}", args.data.display()))?;
    let outbox = Arc::new(Outbox::new());
    let bonuses = Arc::new(RwLock::new(RealmBonusTracker::new(config.live_keep_bonuses)));

    let services = Arc::new(Services {
        config,
        store: Arc::new(store),
        notifier: outbox.clone(),
        world: Arc::new(SimWorld::new()),
        guilds: Arc::new(GuildRoster::new()),
        clock: Arc::new(SystemClock::new()),
        factory: ObjectFactory::standard(),
        deaths: DeathWatch::new(),
        ids: IdAllocator::starting_at(1),
    });

    let registry = Arc::new(KeepRegistry::new(services));
    let loaded = registry.load().context("Failed to load keeps")?;
    log::info!("{} keeps ready", loaded);

    let driver = KeepDriver::new(
        DriverConfig {
            tick_rate_hz: args.tick_rate_hz,
            ..Default::default()
        },
        registry,
        bonuses,
        outbox,
    );

    // Stand-in transport: log every outbound frame.
    let mut frames = driver.subscribe();
    tokio::spawn(async move {
        loop {
            match frames.recv().await {
                Ok(frame) => {
                    tracing::debug!(subject = frame.subject, bytes = frame.payload.len(), "outbound frame");
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Frame logger lagged; {} frames skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    driver.run().await
}
