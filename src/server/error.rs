use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::application::query::QueryError;

/// Service-boundary error taxonomy: bad or missing input is a 400, every
/// provider/parsing/IO fault is a 500. The error message is surfaced to the
/// caller in a FastAPI-style `{"detail": ...}` body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Client(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NoDocument | QueryError::NoMatches => {
                ApiError::Client(err.to_string())
            }
            QueryError::Provider(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::Client(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(e) => {
                log::error!("Internal error: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_query_errors_map_to_client_or_internal() {
        assert!(matches!(
            ApiError::from(QueryError::NoDocument),
            ApiError::Client(_)
        ));
        assert!(matches!(
            ApiError::from(QueryError::NoMatches),
            ApiError::Client(_)
        ));
        assert!(matches!(
            ApiError::from(QueryError::Provider(anyhow!("boom"))),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn test_status_codes() {
        let response = ApiError::Client("bad input".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::Internal(anyhow!("provider down")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
