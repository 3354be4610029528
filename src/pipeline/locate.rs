//! Diagram location: ask the vision model where the diagram on a page is.
//!
//! The page PNG is uploaded to the model's file store, the wait for
//! activation goes through [`crate::remote::wait_for_active`], and a single
//! turn with [`BOUNDING_BOX_PROMPT`] asks for `[ymin, xmin, ymax, xmax]` on a
//! 0–1000 scale. Anything other than exactly four numbers means "no diagram".

use super::postprocess::clean_json_reply;
use crate::config::PollPolicy;
use crate::error::TutorError;
use crate::prompts::BOUNDING_BOX_PROMPT;
use crate::remote::{wait_for_active, Turn, VisionModel};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Normalised rectangle on a 0–1000 scale relative to image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub ymin: f64,
    pub xmin: f64,
    pub ymax: f64,
    pub xmax: f64,
}

impl BoundingBox {
    /// `[ymin, xmin, ymax, xmax]`, the order the model uses.
    pub fn to_array(&self) -> [f64; 4] {
        [self.ymin, self.xmin, self.ymax, self.xmax]
    }
}

/// Parse a raw model reply into a bounding box.
///
/// Fences are stripped first. Returns `None` for invalid JSON, a non-array,
/// any length other than four, or non-numeric entries.
pub fn parse_bounding_box(raw: &str) -> Option<BoundingBox> {
    let cleaned = clean_json_reply(raw);
    let values: Vec<serde_json::Value> = match serde_json::from_str(&cleaned) {
        Ok(v) => v,
        Err(e) => {
            debug!("Bounding box reply is not a JSON array: {e}");
            return None;
        }
    };

    if values.len() != 4 {
        debug!("Bounding box has {} elements, expected 4", values.len());
        return None;
    }

    let nums: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
    match nums.as_slice() {
        [ymin, xmin, ymax, xmax] => Some(BoundingBox {
            ymin: *ymin,
            xmin: *xmin,
            ymax: *ymax,
            xmax: *xmax,
        }),
        _ => None,
    }
}

/// Ask the model for the bounding box of the main diagram in `image_path`.
///
/// `Ok(None)` means the model found no diagram (or answered something
/// unusable). `Err` is reserved for transport, file-store and wait failures;
/// the diagram pipeline downgrades those instead of failing the request.
pub async fn locate_diagram(
    model: &dyn VisionModel,
    image_path: &Path,
    poll: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<Option<BoundingBox>, TutorError> {
    let uploaded = model.upload_asset(image_path, "image/png").await?;
    let asset = wait_for_active(model, uploaded, poll, cancel).await?;

    let turns = [Turn::user_with_asset(asset, BOUNDING_BOX_PROMPT)];
    let reply = model.generate(None, &turns).await?;

    let bbox = parse_bounding_box(&reply);
    match &bbox {
        Some(b) => info!("Diagram located at {:?} in {}", b.to_array(), image_path.display()),
        None => info!("No diagram found in {}", image_path.display()),
    }
    Ok(bbox)
}
