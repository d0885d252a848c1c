use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use transcribe_service::config::Config;
use transcribe_service::http::{build_app, AppState};
use transcribe_service::transcribe::HttpTranscriber;

const EXTERNAL_TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    tokio::fs::create_dir_all(&config.temp_dir)
        .await
        .context("failed to create temp directory")?;
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .context("failed to create output directory")?;

    let config = Arc::new(config);

    let transcriber = Arc::new(
        HttpTranscriber::new(&config, EXTERNAL_TRANSCRIPTION_URL)
            .context("failed to build transcription client")?,
    );

    transcribe_service::cleanup::spawn_sweeper(
        config.temp_dir.clone(),
        config.output_dir.clone(),
        Duration::from_secs(config.temp_file_max_age_hours * 3600),
        SWEEP_INTERVAL,
    );

    let state = AppState::new(Arc::clone(&config), transcriber);
    let app = build_app(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %config.bind_addr, "transcription service listening");
    axum::serve(listener, app)
        .await
        .context("server error")?;

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
