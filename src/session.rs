//! Document conversations and the store that keys them.
//!
//! A [`ConversationSession`] is seeded once with the uploaded document and
//! then grows one user/model exchange per question. [`SessionStore`] maps a
//! session key to the live [`DocumentSession`]; requests without a key share
//! [`DEFAULT_SESSION`].

use crate::config::{MediaKind, PollPolicy};
use crate::error::TutorError;
use crate::prompts::{SEED_MODEL_REPLY, SEED_USER_MESSAGE};
use crate::remote::{wait_for_active, RemoteAsset, Turn, VisionModel};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Key used when a request does not name a session.
pub const DEFAULT_SESSION: &str = "default";

/// The uploaded file a session talks about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    /// Sanitised file name as saved.
    pub filename: String,
    /// Local path of the saved upload.
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// A multi-turn exchange with the remote model about one document.
pub struct ConversationSession {
    model: Arc<dyn VisionModel>,
    system: String,
    history: Vec<Turn>,
}

impl ConversationSession {
    /// Upload `document`, wait until the model can read it, and seed the history.
    pub async fn start(
        model: Arc<dyn VisionModel>,
        document: &DocumentRef,
        system: impl Into<String>,
        poll: &PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<Self, TutorError> {
        let uploaded = model
            .upload_asset(&document.path, document.kind.mime_type())
            .await?;
        info!(name = %uploaded.name, file = %document.filename, "Uploaded document");

        let asset = wait_for_active(model.as_ref(), uploaded, poll, cancel).await?;
        Ok(Self::seeded(model, asset, system))
    }

    /// Build a session around an already active asset.
    pub fn seeded(model: Arc<dyn VisionModel>, asset: RemoteAsset, system: impl Into<String>) -> Self {
        Self {
            model,
            system: system.into(),
            history: vec![
                Turn::user_with_asset(asset, SEED_USER_MESSAGE),
                Turn::model(SEED_MODEL_REPLY),
            ],
        }
    }

    /// Send one user message and return the model's reply.
    ///
    /// The exchange is committed to the history only when the model answers;
    /// a failed call leaves the history as it was.
    pub async fn send_message(&mut self, text: &str) -> Result<String, TutorError> {
        self.history.push(Turn::user(text));
        match self.model.generate(Some(&self.system), &self.history).await {
            Ok(reply) => {
                self.history.push(Turn::model(reply.clone()));
                debug!(turns = self.history.len(), "Conversation advanced");
                Ok(reply)
            }
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn system_instruction(&self) -> &str {
        &self.system
    }
}

/// One uploaded document and its conversation.
pub struct DocumentSession {
    pub id: String,
    pub document: DocumentRef,
    pub conversation: Mutex<ConversationSession>,
}

impl DocumentSession {
    pub fn new(id: impl Into<String>, document: DocumentRef, conversation: ConversationSession) -> Self {
        Self {
            id: id.into(),
            document,
            conversation: Mutex::new(conversation),
        }
    }
}

/// Live sessions by key.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<DocumentSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalise an optional request key; blank means [`DEFAULT_SESSION`].
    pub fn key(session_id: Option<&str>) -> String {
        match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => DEFAULT_SESSION.to_string(),
        }
    }

    pub fn get(&self, session_id: Option<&str>) -> Option<Arc<DocumentSession>> {
        self.sessions
            .get(&Self::key(session_id))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Store `session`, replacing any previous session under the same key.
    pub fn insert(&self, session: DocumentSession) -> Arc<DocumentSession> {
        let session = Arc::new(session);
        if self
            .sessions
            .insert(session.id.clone(), Arc::clone(&session))
            .is_some()
        {
            info!(session = %session.id, "Replaced existing session");
        }
        session
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
