//! Homewatch
//!
//! Runs the MQTT bridge and the HTTP/WebSocket server.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use homewatch::api::{self, AppState};
use homewatch::bridge::{self, CommandPublisher, ControlTopics, Dispatcher, MqttSession, Pipeline, TopicTable};
use homewatch::config::{self, Config, LoggingConfig, PersistenceConfig};
use homewatch::persistence::{DiscardStore, EventStore, PersistenceWorker, SqliteStore};
use homewatch::websocket::BroadcastHub;

/// How long shutdown waits for background tasks
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "homewatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relays home sensor events to live dashboards and drives the gas alarm")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bridge (default)
    Run,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Config { output } => write_default_config(output.as_deref()),
        Commands::Run => {
            let config = match cli.config {
                Some(path) => Config::load_with_env(&path)?,
                None => Config::load_default()?,
            };
            config.validate()?;
            init_tracing(&config.logging);
            run(config).await
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("homewatch={},tower_http=info", logging.level))
    });
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn write_default_config(output: Option<&Path>) -> anyhow::Result<()> {
    let content = config::generate_default_config();

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {:?}", parent))?;
            }
            std::fs::write(path, &content).with_context(|| format!("writing {:?}", path))?;
            println!("Config written to {:?}", path);
        }
        None => print!("{}", content),
    }

    Ok(())
}

/// Open the configured store, falling back to discarding records
fn open_store(config: &PersistenceConfig) -> Arc<dyn EventStore> {
    if !config.enabled {
        tracing::info!("Persistence disabled, events will not be stored");
        return Arc::new(DiscardStore);
    }

    match SqliteStore::open(&config.database) {
        Ok(store) => {
            tracing::info!(database = %config.database, "Event store opened");
            Arc::new(store)
        }
        Err(e) => {
            tracing::error!(
                database = %config.database,
                error = %e,
                "Failed to open event store, events will not be stored"
            );
            Arc::new(DiscardStore)
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting Homewatch v{}", env!("CARGO_PKG_VERSION"));

    let automation = config.automation.engine()?;
    tracing::info!(
        warning_above = automation.thresholds().warning_above(),
        danger_above = automation.thresholds().danger_above(),
        auto_off = config.automation.auto_off,
        "Gas automation configured"
    );

    let store = open_store(&config.persistence);
    let (persistence, persistence_task) =
        PersistenceWorker::spawn(store, config.persistence.worker_config());

    let (hub, hub_task) = BroadcastHub::spawn(config.hub.hub_config());

    let (client, eventloop) = bridge::connect(&config.mqtt);
    tracing::info!(
        host = %config.mqtt.host,
        port = config.mqtt.port,
        prefix = %config.mqtt.topic_prefix,
        "Connecting to MQTT broker"
    );

    let publisher = CommandPublisher::new(
        Arc::new(client.clone()),
        ControlTopics::from_prefix(&config.mqtt.topic_prefix),
    );

    let table = TopicTable::from_prefix(&config.mqtt.topic_prefix);
    let pipeline = Arc::new(Pipeline::new(
        hub.clone(),
        persistence.clone(),
        publisher.clone(),
        automation,
    ));
    let dispatcher = Dispatcher::spawn(&table, pipeline, config.mqtt.lane_capacity);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let session_task =
        tokio::spawn(MqttSession::new(client, eventloop, table, dispatcher).run(shutdown_rx));

    let state = AppState::new(
        hub.clone(),
        publisher,
        persistence,
        config.api.clone(),
        config.hub.read_deadline(),
    );
    let served = api::serve(state, api::shutdown_signal()).await;

    // Stop intake first, then the viewers
    let _ = shutdown_tx.send(true);
    hub.shutdown().await;

    for (name, task) in [("mqtt session", session_task), ("broadcast hub", hub_task)] {
        match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(task = name, error = %e, "Task failed"),
            Err(_) => tracing::warn!(task = name, "Task did not stop in time"),
        }
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, persistence_task).await.is_err() {
        tracing::warn!("Pending events were not all saved before shutdown");
    }

    served?;
    tracing::info!("Homewatch stopped");
    Ok(())
}
