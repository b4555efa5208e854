use anyhow::Context;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::domain::language_model::ChatMessage;
use crate::server::error::ApiError;
use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub files: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FileOperationResponse {
    pub message: String,
    pub files: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveFileParams {
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Builds the HTTP surface. CORS is wide open, matching the original
/// service, and the default body limit is lifted since uploads carry whole
/// PDFs and no size limit is enforced.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/", get(health_check))
        .route("/query/", post(process_query))
        .route("/upload_pdf/", post(upload_pdf))
        .route("/get_uploaded_files/", get(get_uploaded_files))
        .route("/remove_file/", post(remove_file))
        .layer(DefaultBodyLimit::disable())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Probes both collaborators: the vector database and the chat provider.
/// Healthy only if both respond.
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state
        .vector_db
        .probe()
        .await
        .context("Health check failed: vector database unreachable")?;

    state
        .chat
        .complete(&[ChatMessage::user("Test")])
        .await
        .context("Health check failed: chat provider unreachable")?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
    }))
}

async fn process_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let response = state.query.answer(&request.query).await?;
    Ok(Json(QueryResponse { response }))
}

/// Accepts one PDF via multipart form-data and makes it the current
/// document. The registry lock is held for the whole ingestion, so a
/// concurrent upload cannot leave registry, disk, and collection
/// disagreeing about which document is current.
async fn upload_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileOperationResponse>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Client(format!("Invalid multipart request: {}", e)))?
    {
        if let Some(file_name) = field.file_name().map(str::to_string) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::Client(format!("Failed to read upload: {}", e)))?;
            upload = Some((file_name, bytes.to_vec()));
            break;
        }
    }
    let Some((file_name, bytes)) = upload else {
        return Err(ApiError::Client(
            "No file found in multipart request".to_string(),
        ));
    };

    let mut registry = state.registry.lock().await;
    registry.clear();

    let stored = state.ingest.ingest(&file_name, bytes).await?;
    registry.set_current(stored);

    Ok(Json(FileOperationResponse {
        message: format!("PDF {} processed successfully", file_name),
        files: registry.file_names(),
    }))
}

async fn get_uploaded_files(State(state): State<AppState>) -> Json<FilesResponse> {
    let registry = state.registry.lock().await;
    Json(FilesResponse {
        files: registry.file_names(),
    })
}

async fn remove_file(
    State(state): State<AppState>,
    Query(params): Query<RemoveFileParams>,
) -> Result<Json<FileOperationResponse>, ApiError> {
    let mut registry = state.registry.lock().await;

    let Some(document) = registry.take_by_name(&params.file_name) else {
        return Err(ApiError::Client("File not found".to_string()));
    };

    state.ingest.store().delete(&document.storage_key)?;

    Ok(Json(FileOperationResponse {
        message: format!("File {} removed successfully", params.file_name),
        files: registry.file_names(),
    }))
}
