use std::sync::Arc;

use anyhow::{Context, Result};
use log;

use policyrag::config::{self, API_KEY_ENV_VAR};
use policyrag::domain::language_model::{ChatProvider, EmbeddingProvider};
use policyrag::domain::vector_repository::VectorRepository;
use policyrag::infrastructure::{Chunker, DocumentStore, OpenAiClient, VectorDb};
use policyrag::qdrant_client::Qdrant;
use policyrag::server::{router, AppState};
use policyrag::{IngestService, QueryOrchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
    log::info!("policyrag server starting.");

    let config = config::load_config()?;
    log::info!("Configuration loaded: {:?}", config);

    let api_key = std::env::var(API_KEY_ENV_VAR)
        .with_context(|| format!("{} must be set", API_KEY_ENV_VAR))?;
    let openai = Arc::new(OpenAiClient::new(&config.openai, api_key)?);
    let embedder: Arc<dyn EmbeddingProvider> = openai.clone();
    let chat: Arc<dyn ChatProvider> = openai;

    let qdrant = Qdrant::from_url(&config.qdrant.url)
        .build()
        .context("Failed to build Qdrant client")?;
    let vector_db: Arc<dyn VectorRepository> = Arc::new(VectorDb::new(
        Box::new(qdrant),
        config.qdrant.collection_name.clone(),
        config.qdrant.vector_size,
    )?);

    let store = DocumentStore::new(config.ingest.upload_dir.clone())?;
    let chunker = Chunker::new(config.ingest.chunk_size, config.ingest.chunk_overlap);
    let ingest = Arc::new(IngestService::new(
        store,
        chunker,
        embedder.clone(),
        vector_db.clone(),
    ));
    let query = Arc::new(QueryOrchestrator::new(
        embedder,
        vector_db.clone(),
        chat.clone(),
        config.query.clone(),
    ));

    let state = AppState::new(ingest, query, vector_db, chat);
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    log::info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
