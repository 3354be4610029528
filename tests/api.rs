//! HTTP-level tests for edgequake-tutor.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`. The
//! vision model and the page renderer are scripted fakes, so these tests
//! need neither an API key nor a pdfium library.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use async_trait::async_trait;
use edgequake_tutor::pipeline::render::{page_index, write_page_image};
use edgequake_tutor::prompts::{BOUNDING_BOX_PROMPT, PAGE_REF_INSTRUCTION};
use edgequake_tutor::remote::{AssetState, RemoteAsset, Turn};
use edgequake_tutor::{
    router, AskRequest, DegradeReason, DiagramOutcome, PageImage, PageRenderer, Tutor,
    TutorConfig, TutorError, VisionModel,
};
use image::DynamicImage;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Scripted model: chat replies come from a queue, bounding-box requests get
/// `box_reply`, and the next upload can be refused.
struct FakeModel {
    chat_replies: Mutex<VecDeque<Result<String, String>>>,
    box_reply: Mutex<Result<String, String>>,
    refuse_next_upload: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
    uploads: Mutex<Vec<String>>,
    next_id: AtomicU32,
}

impl FakeModel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            chat_replies: Mutex::new(VecDeque::new()),
            box_reply: Mutex::new(Ok("[]".into())),
            refuse_next_upload: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
        })
    }

    fn reply(&self, text: &str) {
        self.chat_replies.lock().unwrap().push_back(Ok(text.into()));
    }

    fn fail(&self, message: &str) {
        self.chat_replies
            .lock()
            .unwrap()
            .push_back(Err(message.into()));
    }

    fn set_box(&self, raw: &str) {
        *self.box_reply.lock().unwrap() = Ok(raw.into());
    }

    fn fail_box(&self, message: &str) {
        *self.box_reply.lock().unwrap() = Err(message.into());
    }

    fn refuse_next_upload(&self, message: &str) {
        *self.refuse_next_upload.lock().unwrap() = Some(message.into());
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl VisionModel for FakeModel {
    async fn upload_asset(&self, _path: &Path, mime_type: &str) -> Result<RemoteAsset, TutorError> {
        if let Some(message) = self.refuse_next_upload.lock().unwrap().take() {
            return Err(TutorError::ModelApi { message });
        }
        self.uploads.lock().unwrap().push(mime_type.to_string());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(RemoteAsset {
            name: format!("files/{id}"),
            mime_type: mime_type.to_string(),
            state: AssetState::Active,
        })
    }

    async fn get_asset(&self, name: &str) -> Result<RemoteAsset, TutorError> {
        Err(TutorError::AssetNotFound { name: name.into() })
    }

    async fn generate(&self, system: Option<&str>, turns: &[Turn]) -> Result<String, TutorError> {
        let last = turns.last().map(Turn::text).unwrap_or_default();
        if system.is_none() && last == BOUNDING_BOX_PROMPT {
            return self
                .box_reply
                .lock()
                .unwrap()
                .clone()
                .map_err(|message| TutorError::ModelApi { message });
        }
        self.prompts.lock().unwrap().push(last);
        self.chat_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("Ready.".into()))
            .map_err(|message| TutorError::ModelApi { message })
    }
}

/// Renders every page as a blank 200×100 PNG.
struct FakeRenderer {
    pages: u32,
    calls: AtomicU32,
}

impl PageRenderer for FakeRenderer {
    fn render_page(
        &self,
        _document: &Path,
        page: u32,
        out_dir: &Path,
    ) -> Result<PageImage, DegradeReason> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        page_index(page, self.pages)?;
        write_page_image(&DynamicImage::new_rgba8(200, 100), page, out_dir)
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    app: Router,
    tutor: Arc<Tutor>,
    model: Arc<FakeModel>,
    renderer: Arc<FakeRenderer>,
    dir: TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = TutorConfig::builder()
        .upload_dir(dir.path().join("uploads"))
        .extracted_dir(dir.path().join("extracted"))
        .build()
        .unwrap();
    config.ensure_dirs().unwrap();

    let model = FakeModel::new();
    let renderer = Arc::new(FakeRenderer {
        pages: 5,
        calls: AtomicU32::new(0),
    });
    let tutor = Arc::new(Tutor::new(
        model.clone(),
        renderer.clone(),
        Arc::new(config),
    ));
    Harness {
        app: router(tutor.clone()),
        tutor,
        model,
        renderer,
        dir,
    }
}

const BOUNDARY: &str = "tutor-test-boundary";

fn multipart_upload(filename: &str, bytes: &[u8], session_id: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(id) = session_id {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\n{id}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_post(uri: &str, value: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn upload_pdf(h: &Harness) {
    let (status, body) = send(&h.app, multipart_upload("notes.pdf", b"%PDF-1.4 test", None)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

fn extracted_image(h: &Harness, url: &str) -> DynamicImage {
    let filename = url.rsplit('/').next().unwrap();
    image::open(h.dir.path().join("extracted").join(filename)).unwrap()
}

// ── Upload ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_creates_default_session() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        multipart_upload("../My Notes.pdf", b"%PDF-1.4 test", None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"message": "File processed", "filename": "My_Notes.pdf", "session_id": "default"})
    );
    assert!(h.dir.path().join("uploads").join("My_Notes.pdf").exists());
    assert_eq!(*h.model.uploads.lock().unwrap(), vec!["application/pdf"]);
    assert_eq!(h.tutor.sessions().len(), 1);
}

#[tokio::test]
async fn upload_without_file_part_is_400() {
    let h = harness();
    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\nx\r\n--{BOUNDARY}--\r\n"
        )))
        .unwrap();

    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file part");
    assert!(h.tutor.sessions().is_empty());
}

#[tokio::test]
async fn upload_with_empty_filename_is_400() {
    let h = harness();
    let (status, body) = send(&h.app, multipart_upload("", b"data", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No selected file");
}

// ── Ask ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ask_before_upload_is_400() {
    let h = harness();
    let (status, body) = send(&h.app, json_post("/ask", json!({"question": "Hi"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please upload a file first.");
    assert!(h.tutor.sessions().is_empty());
}

#[tokio::test]
async fn ask_without_question_is_400() {
    let h = harness();
    upload_pdf(&h).await;
    let (status, _) = send(&h.app, json_post("/ask", json!({"length": "short"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn plain_answer_has_no_image() {
    let h = harness();
    upload_pdf(&h).await;
    h.model.reply("Osmosis is the diffusion of water.");

    let (status, body) = send(&h.app, json_post("/ask", json!({"question": "What is osmosis?"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"answer": "Osmosis is the diffusion of water.", "image": null})
    );
    assert_eq!(h.model.last_prompt(), "What is osmosis? (Length: medium)");
    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn diagram_answer_returns_cropped_page() {
    let h = harness();
    upload_pdf(&h).await;
    h.model.reply("The cycle is shown here. [[PAGE_REF: 3]]");
    h.model.set_box("```json\n[100, 100, 500, 500]\n```");

    let (status, body) = send(
        &h.app,
        json_post("/ask", json!({"question": "Explain the diagram", "length": "short"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["answer"], "The cycle is shown here. ");
    let url = body["image"].as_str().unwrap();
    assert!(url.starts_with("/static/extracted/page_3_"), "{url}");
    assert!(h
        .model
        .last_prompt()
        .ends_with(&format!("(Length: short){PAGE_REF_INSTRUCTION}")));

    // 200x100 page, box 10%..50%, 30px padding clamped at the top-left corner
    let img = extracted_image(&h, url);
    assert_eq!((img.width(), img.height()), (130, 80));

    // page image + the model saw it as a PNG upload
    assert_eq!(
        *h.model.uploads.lock().unwrap(),
        vec!["application/pdf", "image/png"]
    );

    let resp = h
        .app
        .clone()
        .oneshot(Request::builder().uri(url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn unusable_box_keeps_full_page() {
    let h = harness();
    upload_pdf(&h).await;
    h.model.reply("See figure. [[PAGE_REF: 2]]");
    h.model.set_box("[1, 2, 3]");

    let (status, body) = send(&h.app, json_post("/ask", json!({"question": "Show the figure"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "See figure. ");
    let url = body["image"].as_str().unwrap();
    let img = extracted_image(&h, url);
    assert_eq!((img.width(), img.height()), (200, 100));
}

#[tokio::test]
async fn out_of_range_page_has_no_image() {
    let h = harness();
    upload_pdf(&h).await;
    h.model.reply("It is on page nine. [[PAGE_REF: 9]]");

    let (status, body) = send(&h.app, json_post("/ask", json!({"question": "Where is the image?"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"answer": "It is on page nine. ", "image": null}));
    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_pdf_strips_marker_without_rendering() {
    let h = harness();
    let (status, _) = send(&h.app, multipart_upload("scan.png", b"\x89PNG fake", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(*h.model.uploads.lock().unwrap(), vec!["image/png"]);

    h.model.reply("This flowchart shows the steps. [[PAGE_REF: 1]]");
    let (status, body) = send(&h.app, json_post("/ask", json!({"question": "Explain the flowchart"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"answer": "This flowchart shows the steps. ", "image": null})
    );
    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn chat_failure_is_500() {
    let h = harness();
    upload_pdf(&h).await;
    h.model.fail("quota exceeded");

    let (status, body) = send(&h.app, json_post("/ask", json!({"question": "Hi"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("quota exceeded"));
}

#[tokio::test]
async fn sessions_are_isolated_by_id() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        multipart_upload("alice.pdf", b"%PDF-1.4", Some("alice")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "alice");
    let alice = h.tutor.sessions().get(Some("alice")).unwrap();
    assert_eq!(alice.document.path.file_name().unwrap(), "alice.pdf");
    assert_ne!(alice.document.path.parent(), Some(h.dir.path().join("uploads").as_path()));
    assert_eq!(std::fs::read(&alice.document.path).unwrap(), b"%PDF-1.4");

    let (status, _) = send(&h.app, json_post("/ask", json!({"question": "Hi"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    h.model.reply("Hello Alice.");
    let (status, body) = send(
        &h.app,
        json_post("/ask", json!({"question": "Hi", "session_id": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Hello Alice.");
}

#[tokio::test]
async fn lookalike_session_ids_keep_their_own_files() {
    let h = harness();
    for (id, content) in [("a b", b"%PDF first".as_slice()), ("a_b", b"%PDF second".as_slice())] {
        let (status, _) = send(&h.app, multipart_upload("notes.pdf", content, Some(id))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let first = h.tutor.sessions().get(Some("a b")).unwrap();
    let second = h.tutor.sessions().get(Some("a_b")).unwrap();
    assert_ne!(first.document.path, second.document.path);
    assert_eq!(std::fs::read(&first.document.path).unwrap(), b"%PDF first");
    assert_eq!(std::fs::read(&second.document.path).unwrap(), b"%PDF second");
}

#[tokio::test]
async fn failed_reupload_keeps_live_document() {
    let h = harness();
    let (status, _) = send(&h.app, multipart_upload("notes.pdf", b"ORIGINAL", None)).await;
    assert_eq!(status, StatusCode::OK);

    h.model.refuse_next_upload("upload refused");
    let (status, body) = send(&h.app, multipart_upload("notes.pdf", b"REPLACEMENT", None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("upload refused"));

    let live = h.tutor.sessions().get(None).unwrap();
    assert_eq!(std::fs::read(&live.document.path).unwrap(), b"ORIGINAL");

    // the staged copy of the refused upload is gone
    let names: Vec<String> = std::fs::read_dir(h.dir.path().join("uploads"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["notes.pdf"]);
}

#[tokio::test]
async fn successful_reupload_replaces_document() {
    let h = harness();
    send(&h.app, multipart_upload("notes.pdf", b"ORIGINAL", None)).await;
    let (status, _) = send(&h.app, multipart_upload("notes.pdf", b"REPLACEMENT", None)).await;
    assert_eq!(status, StatusCode::OK);

    let live = h.tutor.sessions().get(None).unwrap();
    assert_eq!(std::fs::read(&live.document.path).unwrap(), b"REPLACEMENT");
    assert_eq!(h.tutor.sessions().len(), 1);
}

// ── Diagram degradation ──────────────────────────────────────────────────────

#[tokio::test]
async fn locate_error_keeps_full_page() {
    let h = harness();
    upload_pdf(&h).await;
    h.model.reply("The loop is drawn here. [[PAGE_REF: 4]]");
    h.model.fail_box("503 Service Unavailable");

    let (status, body) = send(&h.app, json_post("/ask", json!({"question": "Show the diagram"}))).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["answer"], "The loop is drawn here. ");
    let url = body["image"].as_str().unwrap();
    let img = extracted_image(&h, url);
    assert_eq!((img.width(), img.height()), (200, 100));
}

#[tokio::test]
async fn locate_error_is_reported_as_degraded() {
    let h = harness();
    upload_pdf(&h).await;
    h.model.reply("See the figure. [[PAGE_REF: 1]]");
    h.model.fail_box("connection reset");

    let answer = h
        .tutor
        .ask(AskRequest {
            question: Some("Which figure?".into()),
            ..AskRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(answer.page, Some(1));
    assert!(answer.image.is_some());
    match answer.diagram {
        Some(DiagramOutcome::Degraded {
            image: Some(_),
            reason: DegradeReason::LocateFailed { detail },
        }) => assert!(detail.contains("connection reset"), "{detail}"),
        other => panic!("expected a locate degradation, got {other:?}"),
    }
}

#[tokio::test]
async fn page_upload_error_keeps_full_page() {
    let h = harness();
    upload_pdf(&h).await;
    h.model.reply("Here it is. [[PAGE_REF: 2]]");
    h.model.refuse_next_upload("file store unavailable");

    let (status, body) = send(&h.app, json_post("/ask", json!({"question": "Draw the image"}))).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["answer"], "Here it is. ");
    let img = extracted_image(&h, body["image"].as_str().unwrap());
    assert_eq!((img.width(), img.height()), (200, 100));
}

#[tokio::test]
async fn empty_box_keeps_full_page() {
    let h = harness();
    upload_pdf(&h).await;
    h.model.reply("No drawing, just text. [[PAGE_REF: 5]]");
    h.model.set_box("[]");

    let (status, body) = send(&h.app, json_post("/ask", json!({"question": "Any diagram?"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "No drawing, just text. ");
    let img = extracted_image(&h, body["image"].as_str().unwrap());
    assert_eq!((img.width(), img.height()), (200, 100));
}

// ── Malformed requests ───────────────────────────────────────────────────────

#[tokio::test]
async fn ask_without_content_type_is_json_400() {
    let h = harness();
    let req = Request::builder()
        .method("POST")
        .uri("/ask")
        .body(Body::from(r#"{"question": "Hi"}"#))
        .unwrap();

    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");
}

#[tokio::test]
async fn malformed_json_is_json_400() {
    let h = harness();
    let req = Request::builder()
        .method("POST")
        .uri("/ask")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"question\": "))
        .unwrap();

    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");

    let req = Request::builder()
        .method("POST")
        .uri("/generate_quiz")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("[1, 2]"))
        .unwrap();
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");
}

#[tokio::test]
async fn upload_without_multipart_is_json_400() {
    let h = harness();
    let (status, body) = send(&h.app, json_post("/upload", json!({"file": "notes.pdf"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");
    assert!(h.tutor.sessions().is_empty());
}

// ── Quiz ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn quiz_before_upload_is_400() {
    let h = harness();
    let (status, body) = send(&h.app, json_post("/generate_quiz", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file.");
}

#[tokio::test]
async fn quiz_strips_fences_and_echoes_type() {
    let h = harness();
    upload_pdf(&h).await;
    h.model
        .reply("```json\n[{\"question\": \"What is ATP?\", \"answer\": \"Energy currency\"}]\n```");

    let (status, body) = send(
        &h.app,
        json_post(
            "/generate_quiz",
            json!({"count": 1, "topic": "cells", "type": "short_answer"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "short_answer");
    assert_eq!(
        body["quiz_data"],
        "[{\"question\": \"What is ATP?\", \"answer\": \"Energy currency\"}]"
    );
    let prompt = h.model.last_prompt();
    assert!(prompt.contains("Generate 1 Medium questions about 'cells'"), "{prompt}");
    assert!(prompt.contains("Question Type: short_answer."));
}

#[tokio::test]
async fn quiz_defaults_to_multiple_choice() {
    let h = harness();
    upload_pdf(&h).await;
    h.model.reply("[]");

    let (status, body) = send(&h.app, json_post("/generate_quiz", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"quiz_data": "[]", "type": "multiple_choice"}));
    assert!(h
        .model
        .last_prompt()
        .contains("Generate 5 Medium questions about 'the entire document'"));
}

// ── Misc ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_is_ok() {
    let h = harness();
    let resp = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}
