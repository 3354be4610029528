//! [`VisionModel`] backed by an `edgequake-llm` provider.
//!
//! Providers behind `edgequake-llm` take attachments inline, so the "file
//! store" here is an in-process table: uploads are read from disk, encoded
//! once, and kept under a generated `files/<uuid>` name. They are `Active` as
//! soon as the upload returns. Every `generate` call re-attaches the assets
//! referenced by the history.

use super::encode::encode_asset;
use super::{AssetState, Part, RemoteAsset, Role, Turn, VisionModel};
use crate::config::{TutorConfig, DEFAULT_MODEL, DEFAULT_PROVIDER};
use crate::error::TutorError;
use async_trait::async_trait;
use dashmap::DashMap;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

struct StoredAsset {
    asset: RemoteAsset,
    data: ImageData,
}

/// Hosted model reached through an `edgequake-llm` provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    assets: DashMap<String, StoredAsset>,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &TutorConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            assets: DashMap::new(),
        }
    }

    /// Resolve the provider from the config / environment and wrap it.
    pub fn from_config(config: &TutorConfig) -> Result<Self, TutorError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    fn to_messages(&self, system: Option<&str>, turns: &[Turn]) -> Result<Vec<ChatMessage>, TutorError> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }

        for turn in turns {
            let text = turn.text();
            match turn.role {
                Role::Model => messages.push(ChatMessage::assistant(text)),
                Role::User => {
                    let mut images = Vec::new();
                    for part in &turn.parts {
                        if let Part::Asset(asset) = part {
                            let stored = self.assets.get(&asset.name).ok_or_else(|| {
                                TutorError::AssetNotFound {
                                    name: asset.name.clone(),
                                }
                            })?;
                            images.push(stored.data.clone());
                        }
                    }
                    if images.is_empty() {
                        messages.push(ChatMessage::user(text));
                    } else {
                        messages.push(ChatMessage::user_with_images(text, images));
                    }
                }
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl VisionModel for ProviderModel {
    async fn upload_asset(&self, path: &Path, mime_type: &str) -> Result<RemoteAsset, TutorError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TutorError::io(path, e))?;

        let asset = RemoteAsset {
            name: format!("files/{}", Uuid::new_v4()),
            mime_type: mime_type.to_string(),
            state: AssetState::Active,
        };
        let data = encode_asset(&bytes, mime_type);
        debug!(
            name = %asset.name,
            path = %path.display(),
            bytes = bytes.len(),
            "Stored asset"
        );

        self.assets.insert(
            asset.name.clone(),
            StoredAsset {
                asset: asset.clone(),
                data,
            },
        );
        Ok(asset)
    }

    async fn get_asset(&self, name: &str) -> Result<RemoteAsset, TutorError> {
        self.assets
            .get(name)
            .map(|stored| stored.asset.clone())
            .ok_or_else(|| TutorError::AssetNotFound {
                name: name.to_string(),
            })
    }

    async fn generate(&self, system: Option<&str>, turns: &[Turn]) -> Result<String, TutorError> {
        let start = Instant::now();
        let messages = self.to_messages(system, turns)?;

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| TutorError::ModelApi {
                message: e.to_string(),
            })?;

        debug!(
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the tutor config.
fn build_options(config: &TutorConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, TutorError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TutorError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Gemini key present** (`GEMINI_API_KEY` / `GOOGLE_API_KEY`) → the
///    default Gemini model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &TutorConfig) -> Result<Arc<dyn LLMProvider>, TutorError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    let has_gemini_key = ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
        .iter()
        .any(|k| std::env::var(k).map(|v| !v.is_empty()).unwrap_or(false));
    if has_gemini_key {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        info!(model, "Using Gemini provider");
        return create_vision_provider(DEFAULT_PROVIDER, model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TutorError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
