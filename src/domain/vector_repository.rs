use anyhow::Result;
use async_trait::async_trait;

use crate::domain::document::{ChunkToUpsert, RetrievedChunk};

#[async_trait]
pub trait VectorRepository: Send + Sync {
    /// Drops the collection if it exists, then creates it empty.
    /// Ingestion calls this so the collection only ever holds chunks of the
    /// current document.
    async fn recreate_collection(&self) -> Result<()>;

    /// Whether the collection exists. Queries against a missing collection
    /// mean no document has been ingested yet.
    async fn collection_exists(&self) -> Result<bool>;

    /// Upserts chunk/vector pairs. `chunks` carry their own payload data
    /// (text, page label, source file).
    async fn upsert_chunks(&self, chunks: &[ChunkToUpsert]) -> Result<()>;

    /// Top-`limit` similarity search for `query_vector`.
    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Cheap liveness probe against the backing store.
    async fn probe(&self) -> Result<()>;
}
