//! Asset encoding: raw file bytes → base64 `ImageData`.
//!
//! Providers reached through `edgequake-llm` accept attachments as base64
//! blobs embedded in the JSON request body. Page renders are PNG and go out
//! with `detail: "high"` so small labels inside diagrams stay readable; PDFs
//! and photos are passed through with their own MIME type.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Wrap a file's bytes as an attachment for the given MIME type.
pub fn encode_asset(bytes: &[u8], mime_type: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!(mime_type, encoded_len = b64.len(), "Encoded asset");

    let data = ImageData::new(b64, mime_type);
    if mime_type.starts_with("image/") {
        data.with_detail("high")
    } else {
        data
    }
}
