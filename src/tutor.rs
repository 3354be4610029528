//! Top-level tutor operations: upload, ask, quiz.
//!
//! [`Tutor`] owns everything a request needs (the vision model, the page
//! renderer, the config and the session store) and is shared by the HTTP
//! handlers behind an `Arc`.
//!
//! ## Data flow of `ask`
//!
//! ```text
//! question ──► prompt ──► session.send_message ──► answer text
//!                                                     │
//!                                     extract_page_reference
//!                                                     │
//!                          page cited and document is a PDF?
//!                                                     │ yes
//!                       render ──► locate ──► crop ──► image URL
//! ```
//!
//! Only the chat call can fail the request. Everything after it degrades to
//! "no image" or "uncropped image".

use crate::config::{MediaKind, TutorConfig};
use crate::error::TutorError;
use crate::pipeline::diagram::{extract_diagram, DiagramContext, DiagramOutcome};
use crate::pipeline::postprocess::clean_json_reply;
use crate::pipeline::reference::extract_page_reference;
use crate::pipeline::render::PageRenderer;
use crate::prompts::{question_prompt, quiz_prompt, TUTOR_SYSTEM_PROMPT};
use crate::remote::VisionModel;
use crate::session::{ConversationSession, DocumentRef, DocumentSession, SessionStore, DEFAULT_SESSION};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Answer length used when the request does not pick one.
pub const DEFAULT_LENGTH: &str = "medium";

/// Returned by [`Tutor::upload_document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub filename: String,
    pub session_id: String,
    #[serde(skip)]
    pub kind: MediaKind,
}

/// A question about the current document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub length: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// The tutor's answer, with the diagram pipeline's outcome if one ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Reply text with the page marker removed.
    pub answer: String,
    /// Public URL of the page image, cropped or not.
    pub image: Option<String>,
    /// Page cited by the model.
    pub page: Option<u32>,
    pub diagram: Option<DiagramOutcome>,
}

fn default_count() -> u32 {
    5
}

fn default_topic() -> String {
    "the entire document".to_string()
}

fn default_difficulty() -> String {
    "Medium".to_string()
}

fn default_quiz_type() -> String {
    "multiple_choice".to_string()
}

/// Quiz parameters; every field has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct QuizRequest {
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(rename = "type", default = "default_quiz_type")]
    pub quiz_type: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl Default for QuizRequest {
    fn default() -> Self {
        Self {
            count: default_count(),
            topic: default_topic(),
            difficulty: default_difficulty(),
            quiz_type: default_quiz_type(),
            session_id: None,
        }
    }
}

/// Generated quiz. `quiz_data` is the model's JSON text, fences removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quiz {
    pub quiz_data: String,
    #[serde(rename = "type")]
    pub quiz_type: String,
}

/// Shared service state.
pub struct Tutor {
    model: Arc<dyn VisionModel>,
    renderer: Arc<dyn PageRenderer>,
    config: Arc<TutorConfig>,
    sessions: SessionStore,
    shutdown: CancellationToken,
}

impl Tutor {
    pub fn new(
        model: Arc<dyn VisionModel>,
        renderer: Arc<dyn PageRenderer>,
        config: Arc<TutorConfig>,
    ) -> Self {
        Self {
            model,
            renderer,
            config,
            sessions: SessionStore::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Cancelled on shutdown; aborts pending asset waits.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Save an uploaded file and start a conversation about it.
    ///
    /// The session is only registered once the model has accepted the
    /// document, so a failed upload never replaces a working session.
    pub async fn upload_document(
        &self,
        session_id: Option<&str>,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<UploadReceipt, TutorError> {
        if original_name.trim().is_empty() {
            return Err(TutorError::InvalidUpload("No selected file".into()));
        }
        let filename = sanitize_filename(original_name);
        if filename.is_empty() {
            return Err(TutorError::InvalidUpload(format!(
                "Unusable file name '{original_name}'"
            )));
        }
        if bytes.is_empty() {
            return Err(TutorError::InvalidUpload("Uploaded file is empty".into()));
        }

        let key = SessionStore::key(session_id);
        let dir = session_upload_dir(&self.config.upload_dir, &key);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| TutorError::io(&dir, e))?;

        // Staged under a temp name; the final name is only taken once the
        // model accepted the document, so a failed re-upload never changes
        // the file a live session renders from.
        let mut staged = tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(&dir)
            .map_err(|e| TutorError::io(&dir, e))?;
        staged
            .as_file_mut()
            .write_all(bytes)
            .and_then(|_| staged.as_file_mut().flush())
            .map_err(|e| TutorError::io(staged.path(), e))?;

        let kind = MediaKind::from_filename(&filename);
        let staged_doc = DocumentRef {
            filename: filename.clone(),
            path: staged.path().to_path_buf(),
            kind,
        };
        info!(
            session = %key,
            file = %filename,
            bytes = bytes.len(),
            mime = kind.mime_type(),
            "Staged upload"
        );

        let system = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(TUTOR_SYSTEM_PROMPT);
        let conversation = ConversationSession::start(
            Arc::clone(&self.model),
            &staged_doc,
            system,
            &self.config.poll,
            &self.shutdown,
        )
        .await?;

        let path = dir.join(&filename);
        staged
            .persist(&path)
            .map_err(|e| TutorError::io(&path, e.error))?;
        let document = DocumentRef {
            path,
            ..staged_doc
        };

        self.sessions
            .insert(DocumentSession::new(key.clone(), document, conversation));

        Ok(UploadReceipt {
            filename,
            session_id: key,
            kind,
        })
    }

    /// Answer a question and, when the answer cites a page, attach its diagram.
    pub async fn ask(&self, request: AskRequest) -> Result<Answer, TutorError> {
        let session = self
            .sessions
            .get(request.session_id.as_deref())
            .ok_or(TutorError::NoSession)?;

        let question = request
            .question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| TutorError::InvalidRequest("Missing question".into()))?;
        let length = request
            .length
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(DEFAULT_LENGTH);

        let prompt = question_prompt(question, length);
        let reply = {
            let mut conversation = session.conversation.lock().await;
            conversation.send_message(&prompt).await?
        };

        let reference = extract_page_reference(&reply);
        let Some(page) = reference.page else {
            return Ok(Answer {
                answer: reference.text,
                image: None,
                page: None,
                diagram: None,
            });
        };

        if !session.document.kind.is_pdf() {
            info!(page, file = %session.document.filename, "Page cited for a non-PDF upload, no image");
            return Ok(Answer {
                answer: reference.text,
                image: None,
                page: Some(page),
                diagram: None,
            });
        }

        let ctx = DiagramContext {
            model: self.model.as_ref(),
            renderer: Arc::clone(&self.renderer),
            config: &self.config,
            cancel: &self.shutdown,
        };
        let outcome = extract_diagram(&ctx, &session.document.path, page).await;
        if let DiagramOutcome::Degraded { reason, .. } = &outcome {
            warn!(page, %reason, "Diagram extraction degraded");
        }
        let image = outcome
            .image()
            .map(|img| self.config.public_url(&img.filename));

        Ok(Answer {
            answer: reference.text,
            image,
            page: Some(page),
            diagram: Some(outcome),
        })
    }

    /// Ask the session's model for a quiz about its document.
    pub async fn generate_quiz(&self, request: QuizRequest) -> Result<Quiz, TutorError> {
        let session = self
            .sessions
            .get(request.session_id.as_deref())
            .ok_or_else(|| TutorError::InvalidRequest("No file.".into()))?;

        let prompt = quiz_prompt(
            request.count,
            &request.topic,
            &request.difficulty,
            &request.quiz_type,
        );
        let reply = {
            let mut conversation = session.conversation.lock().await;
            conversation.send_message(&prompt).await?
        };

        info!(
            count = request.count,
            quiz_type = %request.quiz_type,
            "Generated quiz"
        );
        Ok(Quiz {
            quiz_data: clean_json_reply(&reply),
            quiz_type: request.quiz_type,
        })
    }
}

/// Directory holding a session's uploads.
///
/// The default session uses `upload_dir` itself. Named sessions get a
/// subdirectory derived from a name-based UUID of the key, so two distinct
/// keys never share a directory even when they look alike.
pub fn session_upload_dir(upload_dir: &Path, key: &str) -> PathBuf {
    if key == DEFAULT_SESSION {
        upload_dir.to_path_buf()
    } else {
        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes());
        upload_dir.join(format!("session-{}", id.simple()))
    }
}

static RE_UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());

/// Reduce an uploaded file name to a safe single path component.
///
/// Directory parts are dropped, whitespace becomes `_`, anything other than
/// ASCII letters, digits, `.`, `-` and `_` is replaced by `_`, and leading
/// dots are removed. May return an empty string.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let replaced = RE_UNSAFE_CHARS.replace_all(base.trim(), "_");
    replaced.trim_start_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\notes.pdf"), "notes.pdf");
    }

    #[test]
    fn sanitize_replaces_unsafe_chars() {
        assert_eq!(sanitize_filename("my notes (v2).pdf"), "my_notes__v2_.pdf");
        assert_eq!(sanitize_filename("résumé.png"), "r_sum_.png");
    }

    #[test]
    fn sanitize_strips_leading_dots() {
        assert_eq!(sanitize_filename(".hidden.pdf"), "hidden.pdf");
        assert_eq!(sanitize_filename(".."), "");
        assert_eq!(sanitize_filename("dir/"), "");
    }

    #[test]
    fn default_session_uploads_into_base_dir() {
        let base = Path::new("uploads");
        assert_eq!(session_upload_dir(base, DEFAULT_SESSION), base);
    }

    #[test]
    fn lookalike_session_keys_get_distinct_dirs() {
        let base = Path::new("uploads");
        let dirs: Vec<PathBuf> = ["a b", "a_b", "x/alice", "alice", "../alice"]
            .iter()
            .map(|k| session_upload_dir(base, k))
            .collect();
        for (i, a) in dirs.iter().enumerate() {
            assert_eq!(a.parent(), Some(base), "{a:?} escapes the upload dir");
            for b in &dirs[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(session_upload_dir(base, "alice"), dirs[3]);
    }

    #[test]
    fn quiz_request_defaults() {
        let req: QuizRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.count, 5);
        assert_eq!(req.topic, "the entire document");
        assert_eq!(req.difficulty, "Medium");
        assert_eq!(req.quiz_type, "multiple_choice");
        assert!(req.session_id.is_none());
    }

    #[test]
    fn quiz_request_reads_type_field() {
        let req: QuizRequest =
            serde_json::from_str(r#"{"count": 2, "type": "true_false"}"#).unwrap();
        assert_eq!(req.count, 2);
        assert_eq!(req.quiz_type, "true_false");
    }

    #[test]
    fn quiz_serialises_type_field() {
        let quiz = Quiz {
            quiz_data: "[]".into(),
            quiz_type: "short_answer".into(),
        };
        assert_eq!(
            serde_json::to_value(&quiz).unwrap(),
            serde_json::json!({"quiz_data": "[]", "type": "short_answer"})
        );
    }
}
