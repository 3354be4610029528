//! # edgequake-tutor
//!
//! Chat with a PDF (or a single scanned page) through a Vision Language
//! Model, get answers with the relevant diagram cut out of the document, and
//! generate quizzes about it.
//!
//! ## How a diagram ends up next to the answer
//!
//! ```text
//! upload ──▶ session (document seeded into the conversation)
//!
//! ask
//!  │
//!  ├─ 1. Chat       question + length hint, diagram questions ask for a page cite
//!  ├─ 2. Reference  strip `[[PAGE_REF: n]]` from the answer
//!  ├─ 3. Render     rasterise page n via pdfium (spawn_blocking)
//!  ├─ 4. Locate     VLM returns [ymin, xmin, ymax, xmax] on a 0–1000 scale
//!  └─ 5. Crop       pad, clamp, overwrite the page PNG in place
//! ```
//!
//! Steps 3–5 never fail the request: a missing box keeps the full page, a
//! render failure drops the image.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_tutor::{router, PdfiumRenderer, ProviderModel, Tutor, TutorConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = Arc::new(TutorConfig::default());
//!     config.ensure_dirs()?;
//!     let model = Arc::new(ProviderModel::from_config(&config)?);
//!     let renderer = Arc::new(PdfiumRenderer::new(config.render_scale));
//!     let tutor = Arc::new(Tutor::new(model, renderer, config));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await?;
//!     axum::serve(listener, router(tutor)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tutor-server` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod remote;
pub mod server;
pub mod session;
pub mod tutor;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{MediaKind, PollPolicy, TutorConfig, TutorConfigBuilder};
pub use error::{DegradeReason, TutorError};
pub use pipeline::diagram::DiagramOutcome;
pub use pipeline::render::{PageImage, PageRenderer, PdfiumRenderer};
pub use remote::{ProviderModel, VisionModel};
pub use server::router;
pub use session::{SessionStore, DEFAULT_SESSION};
pub use tutor::{Answer, AskRequest, Quiz, QuizRequest, Tutor};
