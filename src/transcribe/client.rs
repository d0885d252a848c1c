use crate::audio::AudioChunk;
use crate::config::Config;
use crate::error::{Result, ServiceError};
use crate::transcribe::{AttemptOutcome, ChunkResult, JobCache, TranscriptionResponse, Transcriber};
use rand::Rng;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use unicode_normalization::UnicodeNormalization;

const EXTERNAL_MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;
const MIN_WARN_FILE_SIZE: u64 = 1024;
const TRANSCRIPTION_MODEL: &str = "whisper-1";
const HALLUCINATION_RUN_LENGTH: usize = 3;
const HALLUCINATION_MIN_TEXT_LEN: usize = 5;
const SHORT_TEXT_LEN: usize = 10;
const SHORT_DURATION_RATIO: f64 = 0.10;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Raw, single-attempt HTTP transport against the external transcription
/// service. Implements only the wire call; retry, cache, and silent-failure
/// policy live in `TranscriberClient` so that policy can be exercised
/// against any `Transcriber`, real or a test double, exactly as the
/// teacher's orchestrator is generic over its provider trait.
pub struct HttpTranscriber {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpTranscriber {
    pub fn new(config: &Config, api_url: impl Into<String>) -> Result<Self> {
        let api_key = config
            .transcription_api_key
            .clone()
            .ok_or_else(|| ServiceError::Config("TRANSCRIPTION_API_KEY not set".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(ServiceError::Http)?;

        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe_chunk(&self, chunk: &AudioChunk) -> Result<TranscriptionResponse> {
        let bytes = tokio::fs::read(&chunk.path).await?;
        let form = build_form(bytes)?;

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(ServiceError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api(format!("status {status}: {body}")));
        }

        response.json().await.map_err(ServiceError::Http)
    }
}

/// Applies the cache-check, retry, and silent-failure policy for a single
/// chunk around any `Transcriber` implementation.
pub struct TranscriberClient {
    inner: Arc<dyn Transcriber>,
    max_attempts: u32,
    initial_delay: Duration,
}

impl TranscriberClient {
    pub fn new(inner: Arc<dyn Transcriber>, config: &Config) -> Self {
        Self {
            inner,
            max_attempts: config.max_retries + 1,
            initial_delay: config.initial_retry_delay(),
        }
    }

    /// Runs a chunk through the full cache-check + retry schedule.
    pub async fn transcribe(&self, chunk: &AudioChunk, cache: &JobCache) -> Result<ChunkResult> {
        if let Some(cached) = cache.get(chunk.index, chunk.duration).await? {
            tracing::debug!(chunk_index = chunk.index, "cache hit");
            return Ok(ChunkResult::success(chunk, cached, 0));
        }

        if let Err(e) = preflight(&chunk.path).await {
            return Ok(ChunkResult::failure(chunk, e.to_string(), 0));
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt_once(chunk).await {
                AttemptOutcome::Success(response) => {
                    cache.put(chunk.index, &response).await?;
                    return Ok(ChunkResult::success(chunk, response, attempt - 1));
                }
                AttemptOutcome::Fatal(err) => {
                    return Ok(ChunkResult::failure(chunk, err, attempt - 1));
                }
                AttemptOutcome::Retryable(err) => {
                    if attempt >= self.max_attempts {
                        return Ok(ChunkResult::failure(chunk, err, attempt - 1));
                    }
                    let delay = backoff_delay(self.initial_delay, attempt);
                    tracing::warn!(
                        chunk_index = chunk.index,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "transcription attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt_once(&self, chunk: &AudioChunk) -> AttemptOutcome {
        match self.inner.transcribe_chunk(chunk).await {
            Ok(parsed) => match detect_silent_failure(&parsed, chunk.duration) {
                Some(reason) => AttemptOutcome::Retryable(reason),
                None => AttemptOutcome::Success(parsed),
            },
            Err(ServiceError::BadRequest(msg)) => AttemptOutcome::Fatal(msg),
            Err(ServiceError::FileTooLarge(size, max)) => {
                AttemptOutcome::Fatal(format!("file too large: {size} bytes (max {max})"))
            }
            Err(ServiceError::Api(msg)) if msg.starts_with("status 400") || msg.starts_with("status 413") => {
                AttemptOutcome::Fatal(msg)
            }
            Err(e) => AttemptOutcome::Retryable(e.to_string()),
        }
    }
}

async fn preflight(path: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(path).await?;
    let size = metadata.len();
    if size == 0 {
        return Err(ServiceError::BadRequest("chunk file is empty".to_string()));
    }
    if size > EXTERNAL_MAX_FILE_SIZE {
        return Err(ServiceError::FileTooLarge(size, EXTERNAL_MAX_FILE_SIZE));
    }
    if size < MIN_WARN_FILE_SIZE {
        tracing::warn!(size, "chunk file unusually small");
    }
    Ok(())
}

fn build_form(bytes: Vec<u8>) -> Result<Form> {
    let part = Part::bytes(bytes)
        .file_name("chunk.wav")
        .mime_str("audio/wav")
        .map_err(ServiceError::Http)?;
    Ok(Form::new()
        .part("file", part)
        .text("model", TRANSCRIPTION_MODEL)
        .text("response_format", "verbose_json")
        .text("timestamp_granularities[]", "segment"))
}

fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    let exp = initial.as_millis() as u64 * 2u64.pow(attempt.saturating_sub(1));
    let capped = exp.min(MAX_BACKOFF.as_millis() as u64);
    let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
    Duration::from_millis(jittered)
}

fn normalize_for_comparison(text: &str) -> String {
    let nfkd: String = text.nfkd().collect();
    nfkd.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Detects the silent-failure conditions listed for C3: an empty segment
/// list, an implausibly short transcript relative to chunk duration, or a
/// run of identical segments that suggests model hallucination/looping.
fn detect_silent_failure(
    response: &TranscriptionResponse,
    chunk_duration: Duration,
) -> Option<String> {
    if response.segments.is_empty() {
        return Some("empty segment list".to_string());
    }

    let short_duration_threshold = chunk_duration.as_secs_f64() * SHORT_DURATION_RATIO;
    if response.text.trim().len() < SHORT_TEXT_LEN && response.duration < short_duration_threshold {
        return Some(format!(
            "text too short ({} chars) for reported duration {:.1}s",
            response.text.trim().len(),
            response.duration
        ));
    }

    let normalized: Vec<String> = response
        .segments
        .iter()
        .map(|s| normalize_for_comparison(&s.text))
        .collect();

    let mut run_start = 0usize;
    for i in 1..normalized.len() {
        if normalized[i] == normalized[run_start] && normalized[i].len() >= HALLUCINATION_MIN_TEXT_LEN
        {
            if i - run_start + 1 >= HALLUCINATION_RUN_LENGTH {
                return Some(format!(
                    "hallucination guard tripped: \"{}\" repeated {} times",
                    response.segments[run_start].text,
                    i - run_start + 1
                ));
            }
        } else {
            run_start = i;
        }
    }

    None
}
