mod web;
mod worker;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use lammy_core::{
    ApiKey, AppConfig, ChunkingConfig, ConfigError, EssayDocument, EssayRequest, FeedbackPipeline,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use worker::PipelineHandle;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "lammy", version, about = "Feedback, upgraded: actionable insights on your essay")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Args)]
struct Settings {
    /// API key used for both embeddings and completions.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, global = true, env = "OPENAI_API_BASE", default_value = lammy_core::config::DEFAULT_API_BASE)]
    api_base: String,

    #[arg(long, global = true, env = "LAMMY_EMBEDDING_MODEL", default_value = lammy_core::config::DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    #[arg(long, global = true, env = "LAMMY_COMPLETION_MODEL", default_value = lammy_core::config::DEFAULT_COMPLETION_MODEL)]
    completion_model: String,

    /// Maximum characters per essay chunk.
    #[arg(long, global = true, env = "LAMMY_CHUNK_SIZE", default_value_t = 500)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, global = true, env = "LAMMY_CHUNK_OVERLAP", default_value_t = 100)]
    chunk_overlap: usize,

    /// Essay passages retrieved for the prompt.
    #[arg(long, global = true, env = "LAMMY_TOP_K", default_value_t = 4)]
    top_k: usize,

    #[arg(long, global = true, env = "LAMMY_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: u32,

    #[arg(long, global = true, env = "LAMMY_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    #[arg(long, global = true, env = "LAMMY_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    request_timeout_secs: u64,

    /// Retries for timeouts, rate limits and unavailable providers.
    #[arg(long, global = true, env = "LAMMY_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Use local hashed embeddings and echo the prompt instead of calling a model.
    #[arg(long, global = true, default_value_t = false)]
    offline: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the submission form over HTTP.
    Serve {
        #[arg(long, env = "LAMMY_BIND", default_value = "127.0.0.1:8501")]
        bind: SocketAddr,

        /// Largest accepted upload, in bytes.
        #[arg(long, env = "LAMMY_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
        max_upload_bytes: usize,
    },
    /// Analyse one essay from the terminal.
    Analyze {
        /// Path to the essay PDF.
        #[arg(long)]
        essay: PathBuf,
        /// Grade received, e.g. 68/100.
        #[arg(long)]
        grade: String,
        /// Examiner feedback, verbatim.
        #[arg(long)]
        feedback: String,
    },
}

impl Settings {
    fn app_config(&self) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            api_key: self.api_key.clone().and_then(ApiKey::new),
            embedding_model: self.embedding_model.clone(),
            completion_model: self.completion_model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            chunking: ChunkingConfig {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
                ..ChunkingConfig::default()
            },
            retrieval_top_k: self.top_k,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            offline: self.offline,
            ..defaults
        }
        .with_api_base(&self.api_base)?;

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.settings.app_config().context("invalid configuration")?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        offline = config.offline,
        embedding_model = %config.embedding_model,
        completion_model = %config.completion_model,
        "lammy boot"
    );

    let pipeline = FeedbackPipeline::from_config(config).context("failed to build pipeline")?;
    let handle = PipelineHandle::spawn(pipeline, 16);

    match cli.command {
        Command::Serve {
            bind,
            max_upload_bytes,
        } => {
            web::serve(bind, handle, max_upload_bytes)
                .await
                .with_context(|| format!("server on {bind} failed"))?;
        }
        Command::Analyze {
            essay,
            grade,
            feedback,
        } => {
            let analysis = analyze_file(&handle, &essay, &grade, &feedback).await?;
            println!("#### Analysis:\n\n{analysis}");
        }
    }

    Ok(())
}

async fn analyze_file(
    handle: &PipelineHandle,
    path: &Path,
    grade: &str,
    feedback: &str,
) -> anyhow::Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("could not read essay at {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    let request = EssayRequest::new(Some(EssayDocument::new(file_name, bytes)), grade, feedback);
    match handle.submit(request).await {
        Ok(result) => Ok(result.analysis),
        Err(error) => anyhow::bail!(error.user_message()),
    }
}
