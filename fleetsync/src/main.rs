use std::error::Error;

use tracing::{debug, info, instrument, trace};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod cli;
mod config;

use fleetsync_api as api;
use fleetsync_remote as remote;
use fleetsync_state as state;
use fleetsync_util as util;

use crate::config::DaemonConfig;
use crate::remote::HttpRemote;
use crate::state::Engine;
use crate::util::config as stored;
use crate::util::dirs::config_dir;
use crate::util::store::Store;

fn initialize_tracing() {
    // Use some log defaults. These can be overriden using RUST_LOG
    let defaults = || -> Result<EnvFilter, Box<dyn Error>> {
        Ok(EnvFilter::default()
            .add_directive("debug".parse()?)
            .add_directive("hyper=error".parse()?)
            .add_directive("reqwest=info".parse()?)
            .add_directive("tower_http=info".parse()?))
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| defaults())
        .unwrap_or_default();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .event_format(fmt::format().compact().with_target(false).without_time()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    initialize_tracing();

    let cli = cli::parse();

    // Create a new configuration store instance
    let config_store = Store::new(config_dir());

    let config = stored::get::<DaemonConfig>(&config_store)
        .await?
        .unwrap_or_default()
        .with_overrides(&cli);

    if !cli.no_store {
        stored::store(&config_store, &config).await?;
    }

    start_sync(config).await
}

#[instrument(name = "fleetsync", skip_all, err)]
async fn start_sync(config: DaemonConfig) -> Result<(), Box<dyn Error>> {
    trace!(config = ?config, "using config:");

    // Bind the local API first so a taken port fails before any
    // request is made to the backend
    let listener = if let Some(address) = &config.local_api_address {
        let listener = address.bind().await?;
        debug!("bound to local address {address}");
        Some(listener)
    } else {
        None
    };

    let remote = HttpRemote::new(config.remote.clone());
    let engine = Engine::new(remote, config.sync.clone());

    if let Some(listener) = listener {
        tokio::spawn(api::start(listener, engine.clone()));
    }

    tokio::spawn(watch_replica(engine.clone()));

    engine.load_preferences().await;
    engine.start_polling().await;
    info!(devices = engine.replica().len(), "sync started");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    engine.stop_polling();

    Ok(())
}

/// Log a summary every time the replica changes
async fn watch_replica(engine: Engine<HttpRemote>) {
    let mut replica_rx = engine.subscribe_replica();
    while replica_rx.changed().await.is_ok() {
        let replica = replica_rx.borrow_and_update();
        let online = replica.iter().filter(|device| device.online).count();
        debug!(devices = replica.len(), online, "replica updated");
    }
}
