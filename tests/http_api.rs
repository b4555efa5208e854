// End-to-end tests over the real router with in-memory provider mocks.
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use policyrag::config::QueryConfig;
use policyrag::domain::document::{ChunkToUpsert, RetrievedChunk};
use policyrag::domain::language_model::{ChatMessage, ChatProvider, EmbeddingProvider};
use policyrag::domain::vector_repository::VectorRepository;
use policyrag::infrastructure::{Chunker, DocumentStore};
use policyrag::server::{router, AppState};
use policyrag::{IngestService, QueryOrchestrator};

// --- Provider mocks --- //

struct MockEmbedder;

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
    }
}

/// In-memory stand-in for the Qdrant collection. `None` means the collection
/// has never been created.
#[derive(Default)]
struct InMemoryVectorStore {
    collection: Mutex<Option<Vec<ChunkToUpsert>>>,
    probe_failure: Mutex<Option<String>>,
}

impl InMemoryVectorStore {
    fn with_empty_collection() -> Self {
        Self {
            collection: Mutex::new(Some(Vec::new())),
            probe_failure: Mutex::new(None),
        }
    }

    fn fail_probe(&self, message: &str) {
        *self.probe_failure.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl VectorRepository for InMemoryVectorStore {
    async fn recreate_collection(&self) -> Result<()> {
        *self.collection.lock().unwrap() = Some(Vec::new());
        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool> {
        Ok(self.collection.lock().unwrap().is_some())
    }

    async fn upsert_chunks(&self, chunks: &[ChunkToUpsert]) -> Result<()> {
        let mut collection = self.collection.lock().unwrap();
        collection
            .as_mut()
            .ok_or_else(|| anyhow!("collection does not exist"))?
            .extend_from_slice(chunks);
        Ok(())
    }

    async fn search(
        &self,
        _query_vector: Vec<f32>,
        limit: usize,
        _score_threshold: Option<f32>,
    ) -> Result<Vec<RetrievedChunk>> {
        let collection = self.collection.lock().unwrap();
        let chunks = collection
            .as_ref()
            .ok_or_else(|| anyhow!("collection does not exist"))?;
        Ok(chunks
            .iter()
            .take(limit)
            .map(|c| RetrievedChunk {
                text: c.text.clone(),
                page_label: c.page_label.clone(),
                source_file: c.source_file.clone(),
                score: 0.9,
            })
            .collect())
    }

    async fn probe(&self) -> Result<()> {
        match self.probe_failure.lock().unwrap().as_ref() {
            Some(message) => Err(anyhow!("{}", message.clone())),
            None => Ok(()),
        }
    }
}

/// Rule-based chat mock keyed off the system prompt of each orchestrator
/// step. Optionally fails every call, for health-check tests.
struct RuleChat {
    failure: Mutex<Option<String>>,
}

impl RuleChat {
    fn new() -> Self {
        Self {
            failure: Mutex::new(None),
        }
    }

    fn fail(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl ChatProvider for RuleChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        if let Some(message) = self.failure.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", message.clone()));
        }
        let system = &messages[0].content;
        if system.contains("JSON array of strings") {
            Ok(r#"["coverage?", "waiting period?", "exclusions?", "network?"]"#.to_string())
        } else if system.contains("return a verdict") {
            Ok(r#"{"answer": "Yes", "justification": "Clause 4.2 covers it."}"#.to_string())
        } else if system.contains("Synthesize one final judgment") {
            Ok(
                r#"{"final_answer": {"answer": "Yes", "justification": "Covered per clause 4.2."}}"#
                    .to_string(),
            )
        } else {
            Ok("fallback answer".to_string())
        }
    }
}

// --- Harness --- //

struct TestHarness {
    app: Router,
    vector_store: Arc<InMemoryVectorStore>,
    chat: Arc<RuleChat>,
    upload_dir: tempfile::TempDir,
}

fn harness_with_store(vector_store: Arc<InMemoryVectorStore>) -> TestHarness {
    let upload_dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::new(upload_dir.path().to_path_buf()).unwrap();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbedder);
    let chat = Arc::new(RuleChat::new());
    let vector_db: Arc<dyn VectorRepository> = vector_store.clone();

    let ingest = Arc::new(IngestService::new(
        store,
        Chunker::new(1000, 500),
        embedder.clone(),
        vector_db.clone(),
    ));
    let query = Arc::new(QueryOrchestrator::new(
        embedder,
        vector_db.clone(),
        chat.clone(),
        QueryConfig::default(),
    ));
    let state = AppState::new(ingest, query, vector_db, chat.clone());

    TestHarness {
        app: router(state),
        vector_store,
        chat,
        upload_dir,
    }
}

fn harness() -> TestHarness {
    harness_with_store(Arc::new(InMemoryVectorStore::default()))
}

/// Minimal one-page-per-string PDF, enough for lopdf to extract text from.
fn build_pdf(page_texts: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in page_texts {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content encode"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("pdf save");
    buf
}

const BOUNDARY: &str = "policyrag-test-boundary";

fn multipart_upload_request(file_name: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload_pdf/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value =
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

// --- Tests --- //

#[tokio::test]
async fn test_query_before_upload_returns_400() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        json_request("POST", "/query/", serde_json::json!({ "query": "Is knee surgery covered?" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("No documents uploaded"));
}

#[tokio::test]
async fn test_upload_then_query_returns_answer() {
    let h = harness();

    let pdf = build_pdf(&["Arthroscopic knee surgery is covered under day care treatments."]);
    let (status, body) = send(&h.app, multipart_upload_request("policy.pdf", &pdf)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"], serde_json::json!(["policy.pdf"]));
    assert!(body["message"].as_str().unwrap().contains("policy.pdf"));

    let (status, body) = send(
        &h.app,
        json_request("POST", "/query/", serde_json::json!({ "query": "Is knee surgery covered?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let answer = body["response"].as_str().unwrap();
    assert!(!answer.is_empty());
    assert!(answer.contains("final_answer"));
}

#[tokio::test]
async fn test_query_with_no_matches_returns_400() {
    // Collection exists but holds nothing, so every search comes back empty.
    let h = harness_with_store(Arc::new(InMemoryVectorStore::with_empty_collection()));

    let (status, body) = send(
        &h.app,
        json_request("POST", "/query/", serde_json::json!({ "query": "anything" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("No relevant information found"));
}

#[tokio::test]
async fn test_upload_replaces_registry_entry() {
    let h = harness();

    let first = build_pdf(&["first policy document"]);
    let second = build_pdf(&["second policy document"]);
    send(&h.app, multipart_upload_request("a.pdf", &first)).await;
    let (status, body) = send(&h.app, multipart_upload_request("b.pdf", &second)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body_files) = send(&h.app, get_request("/get_uploaded_files/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body_files["files"], serde_json::json!(["b.pdf"]));
    assert_eq!(body["files"], serde_json::json!(["b.pdf"]));

    // Only one file remains on disk after the replacement.
    let on_disk = std::fs::read_dir(h.upload_dir.path()).unwrap().count();
    assert_eq!(on_disk, 1);
}

#[tokio::test]
async fn test_upload_without_file_part_returns_400() {
    let h = harness();
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\njust text\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let request = Request::builder()
        .method("POST")
        .uri("/upload_pdf/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("No file found"));
}

#[tokio::test]
async fn test_upload_of_unparseable_pdf_returns_500() {
    let h = harness();
    let (status, body) = send(&h.app, multipart_upload_request("junk.pdf", b"not a pdf")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body["detail"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_file_unknown_name_returns_400() {
    let h = harness();
    let (status, body) = send(&h.app, post_request("/remove_file/?file_name=missing.pdf")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], serde_json::json!("File not found"));
}

#[tokio::test]
async fn test_remove_file_deletes_disk_and_registry() {
    let h = harness();

    let pdf = build_pdf(&["policy text"]);
    send(&h.app, multipart_upload_request("a.pdf", &pdf)).await;
    assert_eq!(std::fs::read_dir(h.upload_dir.path()).unwrap().count(), 1);

    let (status, body) = send(&h.app, post_request("/remove_file/?file_name=a.pdf")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("a.pdf"));
    assert_eq!(body["files"], serde_json::json!([]));

    assert_eq!(std::fs::read_dir(h.upload_dir.path()).unwrap().count(), 0);

    let (_, body) = send(&h.app, get_request("/get_uploaded_files/")).await;
    assert_eq!(body["files"], serde_json::json!([]));
}

#[tokio::test]
async fn test_health_ok_when_both_dependencies_respond() {
    let h = harness();
    let (status, body) = send(&h.app, get_request("/health/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], serde_json::json!("healthy"));
}

#[tokio::test]
async fn test_health_fails_when_vector_db_is_down() {
    let h = harness();
    h.vector_store.fail_probe("connection refused");

    let (status, body) = send(&h.app, get_request("/health/")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("vector database unreachable"), "{}", detail);
}

#[tokio::test]
async fn test_health_fails_when_chat_provider_is_down() {
    let h = harness();
    h.chat.fail("quota exceeded");

    let (status, body) = send(&h.app, get_request("/health/")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("chat provider unreachable"), "{}", detail);
}
