//! Error types for the edgequake-tutor library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TutorError`]: **Fatal** for the operation at hand: no session exists,
//!   the upload is unusable, or the remote model refused the chat turn.
//!   Returned as `Err(TutorError)` from [`crate::tutor`] and
//!   [`crate::session`] entry points and surfaced to HTTP clients.
//!
//! * [`DegradeReason`]: **Non-fatal**: one step of the diagram pipeline
//!   (render, locate, crop) failed, but the answer itself is fine. Stored
//!   inside [`crate::pipeline::diagram::DiagramOutcome`] so callers can log
//!   the reason while still returning the text (and possibly a full-page
//!   image) to the user.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-tutor library.
#[derive(Debug, Error)]
pub enum TutorError {
    // ── Session errors ────────────────────────────────────────────────────
    /// No document has been uploaded for this session key.
    #[error("Please upload a file first.")]
    NoSession,

    /// The multipart upload was missing its file part or the file was empty.
    #[error("{0}")]
    InvalidUpload(String),

    /// The request body was well-formed JSON but semantically unusable.
    #[error("{0}")]
    InvalidRequest(String),

    // ── Remote model errors ───────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The remote model API returned an error.
    #[error("LLM API error: {message}")]
    ModelApi { message: String },

    /// The remote file store does not know the asset.
    #[error("Remote asset '{name}' not found")]
    AssetNotFound { name: String },

    /// The remote file store finished processing the asset in a non-active state.
    #[error("File {name} failed to process: {state}")]
    AssetProcessingFailed { name: String, state: String },

    /// The asset was still processing when the wait budget ran out.
    #[error("File {name} still processing after {attempts} polls ({elapsed_ms}ms)")]
    AssetWaitTimeout {
        name: String,
        attempts: u32,
        elapsed_ms: u64,
    },

    /// The caller cancelled the wait for asset activation.
    #[error("Waiting for file {name} was cancelled")]
    AssetWaitCancelled { name: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading or writing a local file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TutorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TutorError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by the caller rather than the server or the model.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TutorError::NoSession | TutorError::InvalidUpload(_) | TutorError::InvalidRequest(_)
        )
    }
}

/// A non-fatal failure inside the diagram pipeline.
///
/// Never shown to the user; the orchestrator logs it and falls back to the
/// uncropped page or to no image at all.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum DegradeReason {
    /// The answer cited a page the document does not have.
    #[error("page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: u32, total: u32 },

    /// pdfium could not open the document or rasterise the page.
    #[error("page {page}: rendering failed: {detail}")]
    RenderFailed { page: u32, detail: String },

    /// Uploading the page or asking for a bounding box failed.
    #[error("bounding-box lookup failed: {detail}")]
    LocateFailed { detail: String },

    /// Decoding, cropping or re-encoding the page image failed.
    #[error("cropping '{path}' failed: {detail}")]
    CropFailed { path: PathBuf, detail: String },
}
