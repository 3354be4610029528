//! Axum handlers. Thin: parse the request, call [`Tutor`], shape the JSON.

use super::error::ApiError;
use crate::tutor::{AskRequest, Quiz, QuizRequest, Tutor};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub filename: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub image: Option<String>,
}

pub async fn upload(
    State(tutor): State<Arc<Tutor>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut session_id: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let bytes = field.bytes().await?;
                file = Some((filename, bytes.to_vec()));
            }
            "session_id" => {
                session_id = Some(field.text().await?);
            }
            other => debug!(field = other, "Ignoring multipart field"),
        }
    }

    let (filename, bytes) = file.ok_or_else(|| ApiError::bad_request("No file part"))?;
    let receipt = tutor
        .upload_document(session_id.as_deref(), &filename, &bytes)
        .await?;

    info!(session = %receipt.session_id, file = %receipt.filename, "File processed");
    Ok(Json(UploadResponse {
        message: "File processed",
        filename: receipt.filename,
        session_id: receipt.session_id,
    }))
}

pub async fn ask(
    State(tutor): State<Arc<Tutor>>,
    request: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(request) = request?;
    let answer = tutor.ask(request).await?;
    Ok(Json(AskResponse {
        answer: answer.answer,
        image: answer.image,
    }))
}

pub async fn generate_quiz(
    State(tutor): State<Arc<Tutor>>,
    request: Result<Json<QuizRequest>, JsonRejection>,
) -> Result<Json<Quiz>, ApiError> {
    let Json(request) = request?;
    Ok(Json(tutor.generate_quiz(request).await?))
}

pub async fn health() -> &'static str {
    "ok"
}
