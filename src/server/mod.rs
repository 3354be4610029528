//! HTTP surface.
//!
//! | Route | Method | Body |
//! |-------|--------|------|
//! | `/upload` | POST | multipart `file` (+ `session_id`) |
//! | `/ask` | POST | `{question, length?, session_id?}` |
//! | `/generate_quiz` | POST | `{count?, topic?, difficulty?, type?, session_id?}` |
//! | `{public_prefix}/<file>` | GET | rendered page images |
//! | `/health` | GET | |

pub mod error;
pub mod handlers;

use crate::tutor::Tutor;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build the application router around a shared [`Tutor`].
pub fn router(tutor: Arc<Tutor>) -> Router {
    let config = tutor.config();
    let prefix = config.public_prefix.trim_end_matches('/').to_string();
    let images = ServeDir::new(&config.extracted_dir);
    let body_limit = config.max_upload_bytes;

    Router::new()
        .route("/upload", post(handlers::upload))
        .route("/ask", post(handlers::ask))
        .route("/generate_quiz", post(handlers::generate_quiz))
        .route("/health", get(handlers::health))
        .nest_service(&prefix, images)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(tutor)
}
