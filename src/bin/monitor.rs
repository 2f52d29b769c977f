use std::sync::Arc;

use clap::Parser;
use fleetwatch::{
    config::{Config, StorageConfig, read_config_file},
    directory::HttpDeviceDirectory,
    plugin::CapabilityRegistry,
    probe::SystemPinger,
    service::{MonitorService, ServiceDeps},
    settings::MemorySettings,
    storage::{CheckStore, MemoryStore},
    util,
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleetwatch", LevelFilter::TRACE),
        ("monitor", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();

    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config_path = args.file.unwrap_or_else(util::get_config_path);
    let mut config = match read_config_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!("no usable config at {config_path} ({e}), using defaults");
            Config::default()
        }
    };

    if let Some(url) = util::get_directory_url() {
        config.directory_url = Some(url);
    }

    let directory_url = config
        .directory_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no device directory configured"))?;

    let store = build_store(&config).await?;

    let service = MonitorService::new(
        config.clone(),
        ServiceDeps {
            store,
            directory: Arc::new(HttpDeviceDirectory::new(directory_url)),
            settings: Arc::new(MemorySettings::new()),
            pinger: Arc::new(SystemPinger::new(config.probe.ping_workers)),
            plugins: Arc::new(CapabilityRegistry::new()),
        },
    );

    service.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    service.stop().await;

    Ok(())
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn CheckStore>> {
    let storage = config.storage.clone().unwrap_or_default();

    match storage {
        StorageConfig::None => {
            info!("using in-memory storage, history is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let path = util::get_database_path().map(Into::into).unwrap_or(path);
            info!("using sqlite storage at {}", path.display());
            Ok(Arc::new(fleetwatch::storage::SqliteStore::new(&path).await?))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("sqlite storage requested but the storage-sqlite feature is disabled")
        }
    }
}
