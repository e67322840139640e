mod auth;
mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use arbiter_common::config::{ServerConfig, StoreBackend};
use arbiter_common::redis::RedisVerdictStore;
use arbiter_common::store::{MemoryVerdictStore, VerdictStore};
use arbiter_engine::language::LanguageConfigManager;
use arbiter_engine::sandbox::docker::DockerRuntime;
use arbiter_engine::Judge;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct AppState {
    pub judge: Arc<Judge>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Arbiter API booting...");

    let config = ServerConfig::from_env().context("Invalid server configuration")?;

    let languages = LanguageConfigManager::load_or_builtin(&config.engine.languages_config)?;
    info!("Loaded language configurations for: {:?}", languages.list_languages());

    let store: Arc<dyn VerdictStore> = match &config.store {
        StoreBackend::Redis { url } => {
            let store = RedisVerdictStore::connect(url)
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", url))?;
            info!("Connected to Redis: {}", url);
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory verdict store; records are lost on restart");
            Arc::new(MemoryVerdictStore::new())
        }
    };

    let runtime = DockerRuntime::connect(config.engine.max_output_bytes).context("Failed to create Docker client")?;
    match runtime.ping().await {
        Ok(()) => info!("Docker daemon reachable"),
        Err(e) => warn!(error = %e, "Docker daemon not reachable; executions will fail until it is"),
    }

    info!(
        scratch_root = %config.engine.scratch_root.display(),
        max_concurrent_jobs = config.engine.max_concurrent_jobs,
        "Execution engine configured"
    );
    let judge = Judge::new(config.engine.clone(), languages, Arc::new(runtime), store)
        .context("Failed to initialise the judge")?;

    let state = Arc::new(AppState {
        judge: Arc::new(judge),
    });
    let app = routes::router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("HTTP server listening on {}", config.bind_addr);
    info!("Ready to accept submissions");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
