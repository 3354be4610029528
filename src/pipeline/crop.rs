//! Cropping a page image down to the located diagram.
//!
//! Coordinates arrive normalised to 0–1000 (`[ymin, xmin, ymax, xmax]`).
//! They are scaled by the image height/width, widened by a fixed padding and
//! clamped to the image, so the resulting rectangle always lies inside
//! `[0, width] × [0, height]`.
//!
//! The crop replaces the file in place through a temporary sibling file and a
//! rename: a failure at any step leaves the original page untouched.

use super::locate::BoundingBox;
use crate::error::DegradeReason;
use image::ImageFormat;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Absolute pixel bounds, `right` and `bottom` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PixelRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Map a normalised box onto a `width × height` image with `padding` pixels
/// on every side.
///
/// Returns `None` when the clamped rectangle is empty (inverted box, box
/// entirely outside the image, or a zero-sized image).
pub fn pixel_rect(bbox: &BoundingBox, width: u32, height: u32, padding: u32) -> Option<PixelRect> {
    let (w, h, pad) = (width as f64, height as f64, padding as f64);

    let top = (bbox.ymin / 1000.0 * h - pad).floor().clamp(0.0, h);
    let left = (bbox.xmin / 1000.0 * w - pad).floor().clamp(0.0, w);
    let bottom = (bbox.ymax / 1000.0 * h + pad).ceil().clamp(0.0, h);
    let right = (bbox.xmax / 1000.0 * w + pad).ceil().clamp(0.0, w);

    if !(right > left && bottom > top) {
        return None;
    }

    Some(PixelRect {
        left: left as u32,
        top: top as u32,
        right: right as u32,
        bottom: bottom as u32,
    })
}

/// Crop the image at `path` to `bbox` (plus `padding`) and overwrite it.
pub fn crop_in_place(
    path: &Path,
    bbox: &BoundingBox,
    padding: u32,
) -> Result<PixelRect, DegradeReason> {
    let crop_err = |detail: String| {
        warn!("Error cropping image {}: {}", path.display(), detail);
        DegradeReason::CropFailed {
            path: path.to_path_buf(),
            detail,
        }
    };

    let img = image::open(path).map_err(|e| crop_err(e.to_string()))?;
    let (width, height) = (img.width(), img.height());

    let rect = pixel_rect(bbox, width, height, padding).ok_or_else(|| {
        crop_err(format!(
            "box {:?} is empty on a {}x{} image",
            bbox.to_array(),
            width,
            height
        ))
    })?;

    let cropped = img.crop_imm(rect.left, rect.top, rect.width(), rect.height());

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);

    let mut tmp = tempfile::Builder::new()
        .prefix(".crop-")
        .tempfile_in(dir)
        .map_err(|e| crop_err(format!("temp file: {e}")))?;
    {
        let mut writer = std::io::BufWriter::new(tmp.as_file_mut());
        cropped
            .write_to(&mut writer, format)
            .map_err(|e| crop_err(format!("encode: {e}")))?;
        writer
            .flush()
            .map_err(|e| crop_err(format!("flush: {e}")))?;
    }
    tmp.persist(path)
        .map_err(|e| crop_err(format!("replace: {}", e.error)))?;

    debug!(
        "Cropped {} from {}x{} to {:?}",
        path.display(),
        width,
        height,
        rect
    );
    Ok(rect)
}

/// Run [`crop_in_place`] on the blocking pool.
pub async fn crop_page(
    path: PathBuf,
    bbox: BoundingBox,
    padding: u32,
) -> Result<PixelRect, DegradeReason> {
    let fallback_path = path.clone();
    tokio::task::spawn_blocking(move || crop_in_place(&path, &bbox, padding))
        .await
        .map_err(|e| DegradeReason::CropFailed {
            path: fallback_path,
            detail: format!("crop task panicked: {e}"),
        })?
}
