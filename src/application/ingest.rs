use anyhow::{anyhow, Result};
use log::{error, info};
use std::sync::Arc;

use crate::domain::document::{Chunk, ChunkToUpsert, StoredDocument};
use crate::domain::language_model::EmbeddingProvider;
use crate::domain::vector_repository::VectorRepository;
use crate::infrastructure::chunker::Chunker;
use crate::infrastructure::file_system::DocumentStore;
use crate::infrastructure::pdf;

/// Chunk texts sent to the embedding provider per request.
const EMBEDDING_BATCH_SIZE: usize = 64;

/// Turns one uploaded PDF into searchable vector-collection state:
/// parse pages, window into chunks, embed, recreate the collection, upsert.
pub struct IngestService {
    store: DocumentStore,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    vector_db: Arc<dyn VectorRepository>,
}

impl IngestService {
    pub fn new(
        store: DocumentStore,
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_db: Arc<dyn VectorRepository>,
    ) -> Self {
        Self {
            store,
            chunker,
            embedder,
            vector_db,
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Ingests `bytes` as the new current document. Any previously stored
    /// file is removed first; the vector collection is recreated so it only
    /// ever holds chunks of this document.
    ///
    /// The caller is expected to hold the registry lock for the duration.
    pub async fn ingest(&self, display_name: &str, bytes: Vec<u8>) -> Result<StoredDocument> {
        info!("Ingesting '{}' ({} bytes)...", display_name, bytes.len());

        self.store.clear()?;
        let storage_key = self.store.save(&bytes)?;

        // PDF parsing is CPU-bound; keep it off the async worker.
        let pages = tokio::task::spawn_blocking(move || pdf::extract_pages(&bytes)).await??;
        info!("Parsed {} pages from '{}'", pages.len(), display_name);

        let chunks = self.chunker.chunk_pages(&pages);
        if chunks.is_empty() {
            return Err(anyhow!("Document produced no chunks"));
        }
        info!("Split '{}' into {} chunks", display_name, chunks.len());

        let vectors = self.embed_chunks(&chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(anyhow!(
                "Embedding count ({}) does not match chunk count ({})",
                vectors.len(),
                chunks.len()
            ));
        }

        let to_upsert: Vec<ChunkToUpsert> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkToUpsert {
                vector,
                text: chunk.text,
                page_label: chunk.page_label,
                source_file: display_name.to_string(),
            })
            .collect();

        // Drop-and-create keeps the "collection holds only the current
        // document" invariant across uploads.
        self.vector_db.recreate_collection().await?;
        if let Err(e) = self.vector_db.upsert_chunks(&to_upsert).await {
            error!("Upsert failed for '{}': {}", display_name, e);
            return Err(e);
        }
        info!(
            "Upserted {} chunks for '{}' into the vector collection",
            to_upsert.len(),
            display_name
        );

        Ok(StoredDocument {
            display_name: display_name.to_string(),
            storage_key,
        })
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            let batch_vectors = self.embedder.embed(batch).await?;
            vectors.extend(batch_vectors);
        }
        Ok(vectors)
    }
}
