//! # HTTP Error Handling
//!
//! Error type for the plain HTTP surface (health, metrics, the WebSocket
//! upgrade) and its conversion into JSON error responses.
//!
//! The streaming session has its own taxonomy and never reaches this type:
//! auth rejections become WebSocket close codes (`auth.rs`), engine
//! failures become `error` events on the channel (`session/`), and
//! transport failures end the loop directly (`websocket.rs`). That leaves
//! the upgrade handshake as the only fallible HTTP path.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// Malformed client input, including a failed upgrade handshake (400)
    BadRequest(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

pub type AppResult<T> = Result<T, AppError>;
