use serde::{Deserialize, Serialize};

/// Extracted text of a single PDF page, keyed by its page label.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page_label: String,
    pub text: String,
}

/// A bounded span of page text used as the retrieval unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub page_label: String,
}

/// A chunk paired with its embedding, ready for the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkToUpsert {
    pub vector: Vec<f32>,
    pub text: String,
    pub page_label: String,
    pub source_file: String,
}

/// A similarity-search hit returned from the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub page_label: String,
    pub source_file: String,
    pub score: f32,
}

/// The current uploaded document. The client-supplied filename is display
/// metadata only; disk paths derive from the server-generated storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub display_name: String,
    pub storage_key: String,
}
