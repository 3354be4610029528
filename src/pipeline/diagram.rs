//! The page → box → crop chain, with every failure downgraded.
//!
//! [`extract_diagram`] never fails. It reports what it managed to produce
//! through [`DiagramOutcome`]:
//!
//! | Outcome | Image | Meaning |
//! |---------|-------|---------|
//! | `Found` | cropped | box located and crop applied |
//! | `NotFound` | full page | the model saw no diagram |
//! | `Degraded { image: Some(_) }` | full page | locate or crop failed |
//! | `Degraded { image: None }` | none | page could not be rendered |

use super::crop::crop_page;
use super::locate::locate_diagram;
use super::render::{render_page, PageImage, PageRenderer};
use crate::config::TutorConfig;
use crate::error::DegradeReason;
use crate::remote::VisionModel;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of a best-effort diagram extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagramOutcome {
    /// The page image was cropped to the located diagram.
    Found(PageImage),
    /// The model reported no diagram; the full page is kept.
    NotFound(PageImage),
    /// A pipeline step failed. `image` is the uncropped page if rendering worked.
    Degraded {
        image: Option<PageImage>,
        reason: DegradeReason,
    },
}

impl DiagramOutcome {
    /// The image to show, cropped or not.
    pub fn image(&self) -> Option<&PageImage> {
        match self {
            DiagramOutcome::Found(img) | DiagramOutcome::NotFound(img) => Some(img),
            DiagramOutcome::Degraded { image, .. } => image.as_ref(),
        }
    }
}

/// Everything the extraction needs besides the page number.
pub struct DiagramContext<'a> {
    pub model: &'a dyn VisionModel,
    pub renderer: Arc<dyn PageRenderer>,
    pub config: &'a TutorConfig,
    pub cancel: &'a CancellationToken,
}

/// Render `page` of `document`, locate its diagram and crop to it.
pub async fn extract_diagram(ctx: &DiagramContext<'_>, document: &Path, page: u32) -> DiagramOutcome {
    let image = match render_page(
        Arc::clone(&ctx.renderer),
        document.to_path_buf(),
        page,
        ctx.config.extracted_dir.clone(),
    )
    .await
    {
        Ok(img) => img,
        Err(reason) => {
            warn!(page, %reason, "No page image available");
            return DiagramOutcome::Degraded {
                image: None,
                reason,
            };
        }
    };

    let bbox = match locate_diagram(ctx.model, &image.path, &ctx.config.poll, ctx.cancel).await {
        Ok(Some(bbox)) => bbox,
        Ok(None) => return DiagramOutcome::NotFound(image),
        Err(e) => {
            warn!(page, error = %e, "Failed to find bounding box");
            return DiagramOutcome::Degraded {
                image: Some(image),
                reason: DegradeReason::LocateFailed {
                    detail: e.to_string(),
                },
            };
        }
    };

    match crop_page(image.path.clone(), bbox, ctx.config.crop_padding).await {
        Ok(rect) => {
            info!(page, file = %image.filename, "Cropped diagram to {:?}", rect);
            DiagramOutcome::Found(image)
        }
        Err(reason) => DiagramOutcome::Degraded {
            image: Some(image),
            reason,
        },
    }
}
