//! Pipeline stages for turning a cited page into a diagram image.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the rendering backend can be swapped without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! answer ──▶ reference ──▶ render ──▶ locate ──▶ crop
//! (text)     (page no.)    (pdfium)   (VLM box)  (in place)
//! ```
//!
//! 1. [`reference`]: find and strip the `[[PAGE_REF: n]]` marker
//! 2. [`render`]: rasterise that page to a PNG; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`locate`]: upload the page and ask the model for a bounding box
//! 4. [`crop`]: cut the page down to the box plus padding
//!
//! [`diagram`] chains steps 2–4 and turns every failure into a
//! [`diagram::DiagramOutcome`] instead of an error. [`postprocess`] holds the
//! JSON cleanup shared by the locator and the quiz.

pub mod crop;
pub mod diagram;
pub mod locate;
pub mod postprocess;
pub mod reference;
pub mod render;
