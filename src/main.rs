use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use medilens::credentials::CredentialStore;
use medilens::provider::{GeminiFactory, DEFAULT_API_BASE, DEFAULT_MODEL};
use medilens::web::{self, AppState};

#[derive(Parser)]
#[command(
    name = "medilens",
    about = "Medilens — medical image analysis web service",
    version
)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "MEDILENS_HOST")]
    host: String,

    /// Port for the HTTP server
    #[arg(long, default_value = "8000", env = "MEDILENS_PORT")]
    port: u16,

    /// Scratch directory for normalized uploads
    #[arg(long, default_value = "uploads", env = "MEDILENS_UPLOAD_DIR")]
    upload_dir: PathBuf,

    /// Remote model identifier
    #[arg(long, default_value = DEFAULT_MODEL, env = "MEDILENS_MODEL")]
    model: String,

    /// Base URL of the model API
    #[arg(long, default_value = DEFAULT_API_BASE, env = "MEDILENS_API_BASE")]
    api_base_url: String,

    /// Disable the web-search tool capability
    #[arg(long)]
    no_web_search: bool,

    /// Enable verbose/debug logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "medilens=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    std::fs::create_dir_all(&cli.upload_dir).with_context(|| {
        format!("failed to create upload directory {}", cli.upload_dir.display())
    })?;

    let state = Arc::new(AppState {
        credentials: CredentialStore::new(),
        factory: Arc::new(GeminiFactory::new(
            cli.api_base_url,
            cli.model,
            !cli.no_web_search,
        )),
        upload_dir: cli.upload_dir,
    });

    let app = web::router(state);
    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("medilens listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
