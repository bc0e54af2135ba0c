//! The neo3 node binary: configuration, logging and system startup.

use anyhow::Context;
use clap::Parser;
use neo3::NeoSystem;
use neo3_config::{NetworkType, ProtocolSettings};
use neo3_persistence::{MemoryStore, RocksDbStore, Store};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "neo3-node", about = "Neo N3 node", version)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network to join: mainnet, testnet or private.
    #[arg(short, long, default_value = "private")]
    network: String,

    /// Data directory for the block store.
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Keep the ledger in memory (testing only).
    #[arg(long)]
    in_memory: bool,
}

#[derive(Debug, Default, Deserialize)]
struct NodeConfig {
    network: Option<String>,
    data_dir: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<NodeConfig> {
    let Some(path) = path else {
        return Ok(NodeConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn settings_for(name: &str) -> anyhow::Result<ProtocolSettings> {
    let network = match name.to_ascii_lowercase().as_str() {
        "mainnet" => NetworkType::MainNet,
        "testnet" => NetworkType::TestNet,
        "private" => NetworkType::Private,
        other => anyhow::bail!("unknown network {other:?}"),
    };
    Ok(ProtocolSettings::for_network(network))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let file = load_config(cli.config.as_ref())?;
    let network = file.network.unwrap_or(cli.network);
    let data_dir = file.data_dir.unwrap_or(cli.data_dir);
    let settings = settings_for(&network)?;

    let store: Arc<dyn Store> = if cli.in_memory {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(RocksDbStore::open(&data_dir)?)
    };

    let system = NeoSystem::new(settings, store)?;
    info!(
        network = %network,
        height = ?system.height(),
        "node started"
    );

    tokio::signal::ctrl_c().await?;
    system.shutdown();
    info!("node stopped");
    Ok(())
}
