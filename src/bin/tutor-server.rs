//! HTTP server binary for edgequake-tutor.
//!
//! A thin shim over the library crate that maps CLI flags to `TutorConfig`,
//! makes sure pdfium is available, and serves the router.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_tutor::{router, PdfiumRenderer, ProviderModel, Tutor, TutorConfig};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default port with Gemini (GEMINI_API_KEY set)
  tutor-server

  # Another provider and model
  tutor-server --provider openai --model gpt-4.1

  # Bind to all interfaces
  tutor-server --host 0.0.0.0 --port 8080

ENDPOINTS:
  POST /upload          multipart: file, session_id (optional)
  POST /ask             {"question", "length", "session_id"}
  POST /generate_quiz   {"count", "topic", "difficulty", "type", "session_id"}
  GET  /static/extracted/<file>
  GET  /health

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium, skips auto-download
  RUST_LOG                Log filter, e.g. edgequake_tutor=debug
"#;

/// Chat with PDFs through a Vision LLM, with diagram cropping and quizzes.
#[derive(Parser, Debug)]
#[command(
    name = "tutor-server",
    version,
    about = "Chat with PDFs through a Vision LLM, with diagram cropping and quizzes",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "TUTOR_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "TUTOR_PORT", default_value_t = 5000)]
    port: u16,

    /// LLM model ID (default: gemini-2.5-flash).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Directory for uploaded documents.
    #[arg(long, env = "TUTOR_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory for rendered page images (served under /static/extracted).
    #[arg(long, env = "TUTOR_EXTRACTED_DIR", default_value = "static/extracted")]
    extracted_dir: PathBuf,

    /// Page render scale factor (1–6).
    #[arg(long, env = "TUTOR_RENDER_SCALE", default_value_t = 3.0)]
    render_scale: f32,

    /// Padding in pixels around a located diagram.
    #[arg(long, env = "TUTOR_CROP_PADDING", default_value_t = 30)]
    crop_padding: u32,

    /// Maximum upload size in MiB.
    #[arg(long, env = "TUTOR_MAX_UPLOAD_MB", default_value_t = 16)]
    max_upload_mb: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "TUTOR_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max LLM output tokens per reply.
    #[arg(long, env = "TUTOR_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Path to a text file containing a custom tutor system prompt.
    #[arg(long, env = "TUTOR_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TUTOR_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // First run downloads pdfium (~30 MB) into the user cache; later runs
    // only check the path.
    if !pdfium_auto::is_pdfium_cached() {
        tracing::info!("Downloading PDFium engine");
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
    }

    let config = Arc::new(build_config(&cli).await?);
    config
        .ensure_dirs()
        .context("Failed to create upload/image directories")?;

    let model = Arc::new(ProviderModel::from_config(&config).context("No usable LLM provider")?);
    let renderer = Arc::new(PdfiumRenderer::new(config.render_scale));
    let tutor = Arc::new(Tutor::new(model, renderer, Arc::clone(&config)));
    let shutdown = tutor.shutdown_token().clone();

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cli.host, cli.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(
        addr = %addr,
        uploads = %config.upload_dir.display(),
        images = %config.extracted_dir.display(),
        "Tutor server listening"
    );

    axum::serve(listener, router(tutor))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    Ok(())
}

/// Map CLI args to `TutorConfig`.
async fn build_config(cli: &Cli) -> Result<TutorConfig> {
    let mut builder = TutorConfig::builder()
        .upload_dir(&cli.upload_dir)
        .extracted_dir(&cli.extracted_dir)
        .render_scale(cli.render_scale)
        .crop_padding(cli.crop_padding)
        .max_upload_bytes(cli.max_upload_mb.saturating_mul(1024 * 1024))
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }

    builder.build().context("Invalid configuration")
}
