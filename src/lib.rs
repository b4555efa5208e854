pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod server;

/// Re-export necessary items for main.rs and tests
pub use application::{IngestService, QueryError, QueryOrchestrator};
pub use config::{load_config, AppConfig};
pub use domain::document::{Chunk, ChunkToUpsert, PageText, RetrievedChunk, StoredDocument};
pub use domain::language_model::{ChatMessage, ChatProvider, EmbeddingProvider};
pub use domain::vector_repository::VectorRepository;
pub use infrastructure::vector_db::{qdrant_client, VectorDb};
pub use infrastructure::{Chunker, DocumentStore, OpenAiClient};
pub use server::{router, ApiError, AppState};
