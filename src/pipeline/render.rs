//! Page rasterisation: render one PDF page to a PNG file via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which uses thread-local
//! state internally and is CPU-heavy. [`render_page`] moves the work onto
//! tokio's blocking pool so request handlers keep running.
//!
//! ## Why a fixed scale?
//!
//! The rendered page is later cropped down to a single diagram. Rendering at
//! 3× the page's native size keeps the crop legible once it is shown on its
//! own.
//!
//! ## File naming
//!
//! Output files are named `page_<page>_<unixTimestamp>.png`. Two renders of
//! the same page within one second get a `_<k>` suffix; the name is reserved
//! with `create_new`, so concurrent renders never overwrite each other.

use crate::error::DegradeReason;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A rendered page image on disk.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PageImage {
    /// 1-based page number.
    pub page: u32,
    /// File name inside the extracted-images directory.
    pub filename: String,
    /// Full path of the PNG.
    pub path: PathBuf,
}

/// Something that can turn a document page into a PNG.
///
/// Implementations are blocking; use [`render_page`] from async code.
pub trait PageRenderer: Send + Sync {
    /// Render 1-based `page` of `document` into `out_dir`.
    fn render_page(
        &self,
        document: &Path,
        page: u32,
        out_dir: &Path,
    ) -> Result<PageImage, DegradeReason>;
}

/// Render a page on the blocking pool.
pub async fn render_page(
    renderer: Arc<dyn PageRenderer>,
    document: PathBuf,
    page: u32,
    out_dir: PathBuf,
) -> Result<PageImage, DegradeReason> {
    tokio::task::spawn_blocking(move || renderer.render_page(&document, page, &out_dir))
        .await
        .map_err(|e| DegradeReason::RenderFailed {
            page,
            detail: format!("render task panicked: {e}"),
        })?
}

/// Validate a 1-based page number against the page count.
///
/// Returns the 0-based pdfium page index.
pub fn page_index(page: u32, total: u32) -> Result<u16, DegradeReason> {
    if page < 1 || page > total {
        return Err(DegradeReason::PageOutOfRange { page, total });
    }
    u16::try_from(page - 1).map_err(|_| DegradeReason::PageOutOfRange { page, total })
}

/// Write `image` as `page_<page>_<ts>.png` (or a suffixed variant) in `out_dir`.
pub fn write_page_image(
    image: &DynamicImage,
    page: u32,
    out_dir: &Path,
) -> Result<PageImage, DegradeReason> {
    let render_err = |detail: String| DegradeReason::RenderFailed { page, detail };

    let timestamp = chrono::Utc::now().timestamp();
    let (filename, path, file) =
        reserve_output(out_dir, page, timestamp).map_err(|e| render_err(e.to_string()))?;

    let mut writer = BufWriter::new(file);
    let written = image
        .write_to(&mut writer, image::ImageFormat::Png)
        .map_err(|e| format!("PNG encoding failed: {e}"))
        .and_then(|_| writer.flush().map_err(|e| format!("flush failed: {e}")));
    if let Err(detail) = written {
        drop(writer);
        let _ = std::fs::remove_file(&path);
        return Err(render_err(detail));
    }

    debug!(
        "Saved page {} → {} ({}x{} px)",
        page,
        path.display(),
        image.width(),
        image.height()
    );
    Ok(PageImage {
        page,
        filename,
        path,
    })
}

/// Reserve a fresh output file name, adding `_<k>` until one is free.
fn reserve_output(
    out_dir: &Path,
    page: u32,
    timestamp: i64,
) -> std::io::Result<(String, PathBuf, File)> {
    let mut attempt: u32 = 0;
    loop {
        let filename = if attempt == 0 {
            format!("page_{page}_{timestamp}.png")
        } else {
            format!("page_{page}_{timestamp}_{attempt}.png")
        };
        let path = out_dir.join(&filename);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((filename, path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

// ── pdfium backend ───────────────────────────────────────────────────────

/// [`PageRenderer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    scale: f32,
}

impl PdfiumRenderer {
    pub fn new(scale: f32) -> Self {
        Self { scale }
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_page(
        &self,
        document: &Path,
        page: u32,
        out_dir: &Path,
    ) -> Result<PageImage, DegradeReason> {
        let render_err = |detail: String| DegradeReason::RenderFailed { page, detail };

        let pdfium = pdfium_auto::bind_pdfium_silent().map_err(|e| render_err(e.to_string()))?;
        let pdf = pdfium
            .load_pdf_from_file(document, None)
            .map_err(|e| render_err(format!("{:?}", e)))?;

        let pages = pdf.pages();
        let total = pages.len() as u32;
        let index = match page_index(page, total) {
            Ok(i) => i,
            Err(reason) => {
                warn!("Skipping page {} (out of range, total={})", page, total);
                return Err(reason);
            }
        };

        let pdf_page = pages
            .get(index)
            .map_err(|e| render_err(format!("{:?}", e)))?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(self.scale);
        let bitmap = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| render_err(format!("{:?}", e)))?;

        let image = bitmap.as_image();
        info!(
            "Rendered page {}/{} at {}x → {}x{} px",
            page,
            total,
            self.scale,
            image.width(),
            image.height()
        );

        write_page_image(&image, page, out_dir)
    }
}
