//! The seam between the tutor and the hosted vision model.
//!
//! The pipeline never talks to a provider SDK directly. It talks to
//! [`VisionModel`], which exposes the three things the tutor needs from a
//! hosted model: a file store (upload + status), and content generation over
//! a turn history that may reference uploaded files.
//!
//! [`provider::ProviderModel`] implements the trait on top of
//! `edgequake-llm`; tests plug in scripted fakes.

pub mod encode;
pub mod provider;
pub mod wait;

use crate::error::TutorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use provider::{resolve_provider, ProviderModel};
pub use wait::wait_for_active;

/// Processing state of an uploaded asset, as reported by the file store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetState {
    Processing,
    Active,
    Failed(String),
}

/// A file uploaded to the remote model's file store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAsset {
    /// Store-assigned identifier, e.g. `files/3f1c…`.
    pub name: String,
    pub mime_type: String,
    pub state: AssetState,
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Model,
}

/// One piece of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Part {
    Text(String),
    Asset(RemoteAsset),
}

/// One entry of a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn user_with_asset(asset: RemoteAsset, text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Asset(asset), Part::Text(text.into())],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts, assets skipped.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Asset(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A hosted multimodal model with a file store.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Upload a local file. The returned asset may still be `Processing`.
    async fn upload_asset(&self, path: &Path, mime_type: &str) -> Result<RemoteAsset, TutorError>;

    /// Fetch the current state of a previously uploaded asset.
    async fn get_asset(&self, name: &str) -> Result<RemoteAsset, TutorError>;

    /// Generate one reply for the given history.
    async fn generate(&self, system: Option<&str>, turns: &[Turn]) -> Result<String, TutorError>;
}
