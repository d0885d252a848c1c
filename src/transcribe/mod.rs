pub mod batch;
pub mod cache;
pub mod client;

pub use batch::transcribe_all;
pub use cache::JobCache;
pub use client::{HttpTranscriber, TranscriberClient};

use crate::audio::AudioChunk;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single segment as reported by the external transcription service, in
/// the service's own (accelerated) timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// The full verbose-JSON response shape the external service returns.
/// Modeled explicitly rather than as a generic map, exactly as the teacher
/// models provider responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub task: Option<String>,
    pub language: Option<String>,
    pub duration: f64,
    pub text: String,
    pub segments: Vec<RawSegment>,
}

/// Outcome of a single attempt against the external service, used instead
/// of threading control flow through a thrown error: retry decisions are
/// made on this value, not on whether a call returned `Err`.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(TranscriptionResponse),
    Retryable(String),
    Fatal(String),
}

/// Outcome of running one chunk through C3's full retry schedule.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub start_time: std::time::Duration,
    pub duration: std::time::Duration,
    pub success: bool,
    pub response: Option<TranscriptionResponse>,
    pub error: Option<String>,
    pub retries: u32,
}

impl ChunkResult {
    pub fn success(chunk: &AudioChunk, response: TranscriptionResponse, retries: u32) -> Self {
        Self {
            chunk_index: chunk.index,
            start_time: chunk.start_time,
            duration: chunk.duration,
            success: true,
            response: Some(response),
            error: None,
            retries,
        }
    }

    pub fn failure(chunk: &AudioChunk, error: String, retries: u32) -> Self {
        Self {
            chunk_index: chunk.index,
            start_time: chunk.start_time,
            duration: chunk.duration,
            success: false,
            response: None,
            error: Some(error),
            retries,
        }
    }
}

/// Minimal capability trait satisfied by both the real HTTP client and test
/// doubles, exactly as the teacher's provider trait is used in its own
/// orchestrator tests.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe_chunk(&self, chunk: &AudioChunk) -> Result<TranscriptionResponse>;
}
