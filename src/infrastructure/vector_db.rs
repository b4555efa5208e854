use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log;
use serde::{Deserialize, Serialize};

pub use qdrant_client;
use qdrant_client::qdrant::value::Kind as QdrantValueKind;
use qdrant_client::{
    qdrant::{
        CreateCollectionBuilder, Distance, PointId, PointStruct, SearchPoints, VectorParams,
        Vectors, UpsertPointsBuilder, WithPayloadSelector, WithVectorsSelector,
    },
    Payload, Qdrant,
};
use uuid::Uuid;

use crate::domain::document::{ChunkToUpsert, RetrievedChunk};
use crate::domain::vector_repository::VectorRepository;

/// Payload stored alongside each point in the collection.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct ChunkPayload {
    text: String,
    page_label: String,
    source_file: String,
}

pub struct VectorDb {
    client: Box<Qdrant>,
    collection_name: String,
    vector_size: u64,
}

impl VectorDb {
    pub fn new(client: Box<Qdrant>, collection_name: String, vector_size: u64) -> Result<Self> {
        if collection_name.is_empty() {
            return Err(anyhow!("Collection name cannot be empty"));
        }
        if vector_size == 0 {
            return Err(anyhow!("Vector size must be greater than zero"));
        }
        Ok(Self {
            client,
            collection_name,
            vector_size,
        })
    }

    async fn create_collection_internal(&self) -> Result<()> {
        log::info!(
            "Creating collection '{}' with size {} and distance Cosine...",
            self.collection_name,
            self.vector_size
        );

        let vector_params = VectorParams {
            size: self.vector_size,
            distance: Distance::Cosine.into(),
            hnsw_config: None,
            quantization_config: None,
            on_disk: None,
            multivector_config: None,
            datatype: None,
        };
        let create_builder =
            CreateCollectionBuilder::new(self.collection_name.clone()).vectors_config(vector_params);

        self.client
            .create_collection(create_builder)
            .await
            .map_err(|e| anyhow!("Failed to create collection '{}': {}", self.collection_name, e))?;
        log::info!("Successfully created collection '{}'.", self.collection_name);
        Ok(())
    }

    fn payload_field(
        payload: &std::collections::HashMap<String, qdrant_client::qdrant::Value>,
        key: &str,
    ) -> Option<String> {
        match payload.get(key)?.kind.as_ref()? {
            QdrantValueKind::StringValue(s) => Some(s.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl VectorRepository for VectorDb {
    async fn recreate_collection(&self) -> Result<()> {
        if self.collection_exists().await? {
            log::info!("Dropping existing collection '{}'...", self.collection_name);
            self.client
                .delete_collection(self.collection_name.clone())
                .await
                .map_err(|e| {
                    anyhow!("Failed to delete collection '{}': {}", self.collection_name, e)
                })?;
        }
        self.create_collection_internal().await
    }

    async fn collection_exists(&self) -> Result<bool> {
        self.client
            .collection_exists(self.collection_name.clone())
            .await
            .map_err(|e| anyhow!("Failed to check collection '{}': {}", self.collection_name, e))
    }

    async fn upsert_chunks(&self, chunks: &[ChunkToUpsert]) -> Result<()> {
        if chunks.is_empty() {
            log::info!("No chunks provided for upsert.");
            return Ok(());
        }

        log::info!(
            "Preparing to upsert {} chunks into collection '{}'...",
            chunks.len(),
            self.collection_name
        );

        let points: Vec<PointStruct> = chunks
            .iter()
            .filter_map(|chunk| {
                let payload_struct = ChunkPayload {
                    text: chunk.text.clone(),
                    page_label: chunk.page_label.clone(),
                    source_file: chunk.source_file.clone(),
                };
                let payload_value = match serde_json::to_value(payload_struct) {
                    Ok(v) => v,
                    Err(e) => {
                        log::error!(
                            "Failed to serialize chunk payload (page {}): {}",
                            chunk.page_label,
                            e
                        );
                        return None;
                    }
                };
                let payload: Payload = match Payload::try_from(payload_value) {
                    Ok(p) => p,
                    Err(e) => {
                        log::error!(
                            "Failed to convert payload for page {}: {}",
                            chunk.page_label,
                            e
                        );
                        return None;
                    }
                };

                let point_id: PointId = PointId::from(Uuid::new_v4().to_string());

                Some(PointStruct {
                    id: Some(point_id),
                    vectors: Some(Vectors::from(chunk.vector.clone())),
                    payload: payload.into(),
                })
            })
            .collect();

        if points.is_empty() {
            log::warn!(
                "No valid points could be prepared for upserting (input count: {}).",
                chunks.len()
            );
            return Ok(());
        }

        let points_count = points.len();
        let upsert_builder =
            UpsertPointsBuilder::new(self.collection_name.clone(), points).wait(true);

        self.client
            .upsert_points(upsert_builder)
            .await
            .map_err(|e| anyhow!("Qdrant upsert failed: {}", e))?;
        log::info!(
            "Successfully upserted {} points into collection '{}'.",
            points_count,
            self.collection_name
        );
        Ok(())
    }

    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RetrievedChunk>> {
        if query_vector.len() as u64 != self.vector_size {
            return Err(anyhow!(
                "Query vector dimension ({}) does not match collection dimension ({})",
                query_vector.len(),
                self.vector_size
            ));
        }

        log::info!(
            "Searching in collection '{}' with limit {}...",
            self.collection_name,
            limit
        );

        let search_request = SearchPoints {
            collection_name: self.collection_name.clone(),
            vector: query_vector,
            limit: limit as u64,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(
                    qdrant_client::qdrant::with_payload_selector::SelectorOptions::Enable(true),
                ),
            }),
            with_vectors: Some(WithVectorsSelector {
                selector_options: Some(
                    qdrant_client::qdrant::with_vectors_selector::SelectorOptions::Enable(false),
                ),
            }),
            score_threshold,
            ..Default::default()
        };

        let response = self
            .client
            .search_points(search_request)
            .await
            .map_err(|e| anyhow!("Qdrant search failed in '{}': {}", self.collection_name, e))?;

        let results: Vec<RetrievedChunk> = response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                let payload = scored_point.payload;
                if payload.is_empty() {
                    log::warn!(
                        "Search result point {:?} has no payload, skipping.",
                        scored_point.id
                    );
                    return None;
                }
                let text = Self::payload_field(&payload, "text")?;
                let page_label = Self::payload_field(&payload, "page_label")?;
                let source_file = Self::payload_field(&payload, "source_file")?;
                Some(RetrievedChunk {
                    text,
                    page_label,
                    source_file,
                    score: scored_point.score,
                })
            })
            .collect();

        log::info!("Search returned {} usable results.", results.len());
        Ok(results)
    }

    async fn probe(&self) -> Result<()> {
        self.client
            .health_check()
            .await
            .map_err(|e| anyhow!("Qdrant health check failed: {}", e))?;
        Ok(())
    }
}
