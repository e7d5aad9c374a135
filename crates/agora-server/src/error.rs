use agora_shared::ProtocolError;
use agora_store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::connection::TransportError;

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ServerError::Store(_) => {
                tracing::error!(error = %self, "Store failure while handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Failures inside a chat session, classified by how the agent reacts.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Terminal for the connection.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The frame is dropped; the connection stays open.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The message was neither delivered nor echoed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_401() {
        let response = ServerError::Unauthorized("no session".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn store_failures_map_to_500() {
        let response = ServerError::Store(StoreError::Poisoned).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
