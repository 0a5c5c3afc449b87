// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use concord::catalog::ModelCatalog;
use concord::config::Config;
use concord::consensus::{ConsensusOrchestrator, ConsensusSettings};
use concord::message::MessageFormatter;
use concord::provider::Llm7Client;
use concord::router::{CompletionRouter, PrimarySettings};
use concord::server::{self, AppState};
use concord::store::ConversationStore;
use concord::title::TitleSynthesizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; deployments usually set the environment directly
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("Starting Concord chat server");

    // Create database pool
    // SQLite is single-writer, but can have multiple readers
    let pool = SqlitePoolOptions::new()
        .max_connections(config.sqlite_max_connections)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .max_lifetime(Duration::from_secs(1800))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.database_url)
        .await?;

    let store = Arc::new(ConversationStore::new(pool));
    store.run_migrations().await?;

    // The system provider funds the free tier; without a key the server
    // still runs, serving only callers who bring their own key.
    let system_provider = match &config.llm7_api_key {
        Some(key) => match Llm7Client::new(
            key.clone(),
            config.llm7_api_url.clone(),
            config.app_title.clone(),
        ) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("System provider disabled: {}", e);
                None
            }
        },
        None => {
            warn!("LLM7_API_KEY not set, free-tier models are unavailable");
            None
        }
    };

    let router = Arc::new(CompletionRouter::new(
        ModelCatalog::new(),
        PrimarySettings {
            base_url: config.openrouter_base_url.clone(),
            referer: config.app_referer.clone(),
            app_title: config.app_title.clone(),
        },
        system_provider,
    ));

    let titles = Arc::new(TitleSynthesizer::new(router.clone()));
    let consensus_settings = ConsensusSettings {
        timeout: config.consensus_timeout,
        slow_notice_after: config.slow_notice_after,
    };
    let orchestrator = Arc::new(ConsensusOrchestrator::new(titles.clone(), consensus_settings));

    let state = AppState {
        store,
        router,
        orchestrator,
        titles,
        formatter: MessageFormatter::new(),
        consensus_settings,
    };

    info!("Models in catalog: {}", state.router.catalog().models().len());
    info!(
        "System provider: {}",
        if state.router.has_system_provider() { "enabled" } else { "disabled" }
    );

    server::run(&config.bind_address(), state).await
}
