//! parleyd - hosts the matchmaking core with persistence, metrics and a
//! poll-driven matching cadence.

use parleyd::clock::SystemClock;
use parleyd::config::{
    Config, LogFormat, ResponderBackend, ResponderConfig, StorageBackend, StorageConfig,
};
use parleyd::ids::UuidIds;
use parleyd::responder::{CannedResponder, OpenAiResponder, Responder};
use parleyd::store::{MemoryStore, RedbStore, StateStore};
use parleyd::{Lobby, LobbySettings};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "parleyd.toml";

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Explicit path must exist; the default path is optional.
fn load_config() -> anyhow::Result<(Config, Option<String>)> {
    match std::env::args().nth(1) {
        Some(path) => Ok((Config::load(&path)?, Some(path))),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Ok((
            Config::load(DEFAULT_CONFIG_PATH)?,
            Some(DEFAULT_CONFIG_PATH.to_string()),
        )),
        None => Ok((Config::default(), None)),
    }
}

fn open_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn StateStore>> {
    Ok(match config.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Redb => {
            let store = RedbStore::open(&config.path)?;
            info!(path = %config.path, "Opened redb state store");
            Arc::new(store)
        }
    })
}

fn build_responder(config: &ResponderConfig) -> Arc<dyn Responder> {
    match config.backend {
        ResponderBackend::Canned => Arc::new(CannedResponder::new()),
        ResponderBackend::OpenAi => {
            let key = std::env::var(&config.api_key_env).unwrap_or_else(|_| {
                warn!(
                    env = %config.api_key_env,
                    "API key variable not set, automated turns will fall back"
                );
                String::new()
            });
            info!(url = %config.api_url, model = %config.model, "Using chat-completions responder");
            Arc::new(OpenAiResponder::new(config, key))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_path) = load_config()?;
    init_tracing(config.logging.format);

    if let Err(errors) = parleyd::config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "Refusing to start with {} configuration error(s)",
            errors.len()
        ));
    }
    info!(
        config = config_path.as_deref().unwrap_or("<defaults>"),
        storage = ?config.storage.backend,
        responder = ?config.responder.backend,
        "Starting parleyd"
    );

    parleyd::metrics::init();

    let settings = LobbySettings::from_config(&config)?;
    let lobby = Arc::new(
        Lobby::builder(settings)
            .store(open_store(&config.storage)?)
            .responder(build_responder(&config.responder))
            .clock(Arc::new(SystemClock))
            .ids(Arc::new(UuidIds))
            .open()
            .await?,
    );

    if config.server.metrics_port != 0 {
        let port = config.server.metrics_port;
        tokio::spawn(async move {
            parleyd::http::run_http_server(port).await;
        });
    }

    // Matching pass cadence
    {
        let lobby = Arc::clone(&lobby);
        let period = std::time::Duration::from_secs(config.server.match_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = lobby.run_matching().await {
                    warn!(error = %e, transient = e.is_transient(), "Matching pass failed");
                }
            }
        });
    }
    info!(
        every_secs = config.server.match_interval_secs,
        "Matching task started"
    );

    // Match-index eviction
    {
        let lobby = Arc::clone(&lobby);
        let period = std::time::Duration::from_secs(config.server.sweep_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = lobby.sweep_matches().await {
                    warn!(error = %e, "Failed to sweep match index");
                }
            }
        });
    }
    info!(
        every_secs = config.server.sweep_interval_secs,
        "Match-index sweep task started"
    );

    tokio::signal::ctrl_c().await?;
    let stats = lobby.stats().await;
    info!(
        waiting = stats.waiting,
        sessions = stats.active_sessions,
        matches = stats.match_index_size,
        "Shutting down"
    );
    Ok(())
}
