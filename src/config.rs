//! Configuration types for the tutor service.
//!
//! All behaviour is controlled through [`TutorConfig`], built via its
//! [`TutorConfigBuilder`]. The HTTP layer, the diagram pipeline and the
//! session layer all read the same struct, so one `Arc<TutorConfig>` is shared
//! across request handlers.

use crate::error::TutorError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default vision model, used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default provider paired with [`DEFAULT_MODEL`].
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Configuration for the tutor service.
///
/// # Example
/// ```rust
/// use edgequake_tutor::TutorConfig;
///
/// let config = TutorConfig::builder()
///     .render_scale(2.0)
///     .crop_padding(16)
///     .model("gemini-2.5-flash")
///     .build()
///     .unwrap();
/// assert_eq!(config.crop_padding, 16);
/// ```
#[derive(Clone)]
pub struct TutorConfig {
    /// Upscaling factor applied when rasterising a page. Range: 1.0–6.0. Default: 3.0.
    ///
    /// Diagrams are cropped out of the rendered page afterwards, so the page
    /// is rendered larger than screen size to keep the crop legible.
    pub render_scale: f32,

    /// Pixels added on every side of the located diagram before cropping. Default: 30.
    pub crop_padding: u32,

    /// Polling behaviour while the remote file store processes an upload.
    pub poll: PollPolicy,

    /// Directory that receives uploaded documents. Default: `uploads`.
    pub upload_dir: PathBuf,

    /// Web-servable directory for rendered page images. Default: `static/extracted`.
    pub extracted_dir: PathBuf,

    /// URL prefix under which `extracted_dir` is served. Default: `/static/extracted`.
    pub public_prefix: String,

    /// Maximum accepted upload size in bytes. Default: 16 MiB.
    pub max_upload_bytes: usize,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`] or `EDGEQUAKE_MODEL`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for chat turns. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate per reply. Default: 4096.
    pub max_tokens: usize,

    /// Custom tutor system instruction. If None, uses the built-in default.
    pub system_prompt: Option<String>,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            render_scale: 3.0,
            crop_padding: 30,
            poll: PollPolicy::default(),
            upload_dir: PathBuf::from("uploads"),
            extracted_dir: PathBuf::from("static").join("extracted"),
            public_prefix: "/static/extracted".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 4096,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for TutorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TutorConfig")
            .field("render_scale", &self.render_scale)
            .field("crop_padding", &self.crop_padding)
            .field("poll", &self.poll)
            .field("upload_dir", &self.upload_dir)
            .field("extracted_dir", &self.extracted_dir)
            .field("public_prefix", &self.public_prefix)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl TutorConfig {
    /// Create a new builder for `TutorConfig`.
    pub fn builder() -> TutorConfigBuilder {
        TutorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Public URL of a file inside `extracted_dir`.
    pub fn public_url(&self, filename: &str) -> String {
        format!("{}/{}", self.public_prefix.trim_end_matches('/'), filename)
    }

    /// Create the upload and extracted-image directories if missing.
    pub fn ensure_dirs(&self) -> Result<(), TutorError> {
        for dir in [&self.upload_dir, &self.extracted_dir] {
            std::fs::create_dir_all(dir).map_err(|e| TutorError::io(dir.as_path(), e))?;
        }
        Ok(())
    }
}

/// Builder for [`TutorConfig`].
#[derive(Debug)]
pub struct TutorConfigBuilder {
    config: TutorConfig,
}

impl TutorConfigBuilder {
    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(1.0, 6.0);
        self
    }

    pub fn crop_padding(mut self, px: u32) -> Self {
        self.config.crop_padding = px;
        self
    }

    pub fn poll(mut self, policy: PollPolicy) -> Self {
        self.config.poll = policy;
        self
    }

    pub fn upload_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.upload_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn extracted_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.extracted_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.public_prefix = prefix.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TutorConfig, TutorError> {
        let c = &self.config;
        if !(1.0..=6.0).contains(&c.render_scale) {
            return Err(TutorError::InvalidConfig(format!(
                "render scale must be 1.0–6.0, got {}",
                c.render_scale
            )));
        }
        if c.max_upload_bytes == 0 {
            return Err(TutorError::InvalidConfig(
                "max upload size must be > 0".into(),
            ));
        }
        let prefix = c.public_prefix.trim_end_matches('/');
        if !prefix.starts_with('/') || prefix.len() < 2 {
            return Err(TutorError::InvalidConfig(format!(
                "public prefix must be an absolute path below '/', got '{}'",
                c.public_prefix
            )));
        }
        c.poll.validate()?;
        Ok(self.config)
    }
}

// ── Poll policy ──────────────────────────────────────────────────────────

/// How long to wait for the remote file store to finish processing an upload.
///
/// The interval starts at `initial_interval` and is multiplied by
/// `backoff_factor` after every poll, capped at `max_interval`. The wait
/// stops after `max_attempts` polls or once `timeout` has elapsed, whichever
/// comes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_factor: f64,
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(10),
            backoff_factor: 1.5,
            max_attempts: 60,
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollPolicy {
    /// Delay to sleep before poll number `attempt` (0-based, after the first check).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(attempt as i32);
        let delay = self.initial_interval.mul_f64(factor);
        delay.min(self.max_interval)
    }

    fn validate(&self) -> Result<(), TutorError> {
        if self.max_attempts == 0 {
            return Err(TutorError::InvalidConfig(
                "poll max_attempts must be ≥ 1".into(),
            ));
        }
        if self.backoff_factor < 1.0 || !self.backoff_factor.is_finite() {
            return Err(TutorError::InvalidConfig(format!(
                "poll backoff factor must be ≥ 1.0, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }
}

// ── Media kinds ──────────────────────────────────────────────────────────

/// Type of an uploaded document, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Pdf,
    Png,
    Jpeg,
}

impl MediaKind {
    /// Classify a filename. Unknown extensions are treated as PDF.
    pub fn from_filename(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".png") {
            MediaKind::Png
        } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            MediaKind::Jpeg
        } else {
            MediaKind::Pdf
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            MediaKind::Pdf => "application/pdf",
            MediaKind::Png => "image/png",
            MediaKind::Jpeg => "image/jpeg",
        }
    }

    pub fn is_pdf(self) -> bool {
        self == MediaKind::Pdf
    }
}
