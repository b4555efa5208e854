pub mod ingest;
pub mod query;

pub use ingest::IngestService;
pub use query::{QueryError, QueryOrchestrator};
