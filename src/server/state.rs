use std::sync::Arc;
use tokio::sync::Mutex;

use crate::application::{IngestService, QueryOrchestrator};
use crate::domain::document::StoredDocument;
use crate::domain::language_model::ChatProvider;
use crate::domain::vector_repository::VectorRepository;

/// Tracks the current uploaded document. At most one entry; a new upload
/// replaces, never accumulates. All access goes through the `AppState`
/// mutex, and upload handlers hold that lock for the whole ingestion so
/// concurrent uploads cannot interleave.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    current: Option<StoredDocument>,
}

impl DocumentRegistry {
    pub fn set_current(&mut self, document: StoredDocument) {
        self.current = Some(document);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Removes and returns the current document if its display name matches.
    pub fn take_by_name(&mut self, file_name: &str) -> Option<StoredDocument> {
        if self
            .current
            .as_ref()
            .is_some_and(|doc| doc.display_name == file_name)
        {
            self.current.take()
        } else {
            None
        }
    }

    pub fn file_names(&self) -> Vec<String> {
        self.current
            .as_ref()
            .map(|doc| vec![doc.display_name.clone()])
            .unwrap_or_default()
    }
}

/// Shared application state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Mutex<DocumentRegistry>>,
    pub ingest: Arc<IngestService>,
    pub query: Arc<QueryOrchestrator>,
    pub vector_db: Arc<dyn VectorRepository>,
    pub chat: Arc<dyn ChatProvider>,
}

impl AppState {
    pub fn new(
        ingest: Arc<IngestService>,
        query: Arc<QueryOrchestrator>,
        vector_db: Arc<dyn VectorRepository>,
        chat: Arc<dyn ChatProvider>,
    ) -> Self {
        Self {
            registry: Arc::new(Mutex::new(DocumentRegistry::default())),
            ingest,
            query,
            vector_db,
            chat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str) -> StoredDocument {
        StoredDocument {
            display_name: name.to_string(),
            storage_key: format!("key-{}", name),
        }
    }

    #[test]
    fn test_registry_holds_at_most_one_entry() {
        let mut registry = DocumentRegistry::default();
        assert!(registry.file_names().is_empty());

        registry.set_current(doc("a.pdf"));
        assert_eq!(registry.file_names(), vec!["a.pdf".to_string()]);

        registry.set_current(doc("b.pdf"));
        assert_eq!(registry.file_names(), vec!["b.pdf".to_string()]);
    }

    #[test]
    fn test_take_by_name_matches_display_name_only() {
        let mut registry = DocumentRegistry::default();
        registry.set_current(doc("a.pdf"));

        assert!(registry.take_by_name("other.pdf").is_none());
        assert_eq!(registry.file_names(), vec!["a.pdf".to_string()]);

        let taken = registry.take_by_name("a.pdf").unwrap();
        assert_eq!(taken.storage_key, "key-a.pdf");
        assert!(registry.file_names().is_empty());
    }
}
