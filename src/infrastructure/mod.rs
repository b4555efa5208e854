pub mod chunker;
pub mod file_system;
pub mod openai;
pub mod pdf;
pub mod vector_db;

// Re-export key types for easier access from the application layer
pub use chunker::Chunker;
pub use file_system::DocumentStore;
pub use openai::OpenAiClient;
pub use vector_db::VectorDb;
