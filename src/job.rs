use crate::config::OutputFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    CompletedWithWarnings,
    Failed,
}

/// A transcription job's state, owned exclusively by its orchestrator and
/// mutated only through its phase driver. Terminal on the first transition
/// to `Completed`/`CompletedWithWarnings`/`Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub requested_speed_factor: f64,
    pub requested_format: OutputFormat,
    pub source_duration_secs: Option<f64>,
    pub accelerated_duration_secs: Option<f64>,
    pub chunks_planned: usize,
    pub chunks_processed: usize,
    pub chunks_failed: usize,
    pub total_retries: u32,
    pub wall_time_ms: Option<u64>,
    pub created_at_unix_ms: u64,
}

impl Job {
    pub fn new(id: Uuid, speed_factor: f64, format: OutputFormat, created_at_unix_ms: u64) -> Self {
        Self {
            id,
            status: JobStatus::Processing,
            requested_speed_factor: speed_factor,
            requested_format: format,
            source_duration_secs: None,
            accelerated_duration_secs: None,
            chunks_planned: 0,
            chunks_processed: 0,
            chunks_failed: 0,
            total_retries: 0,
            wall_time_ms: None,
            created_at_unix_ms,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, JobStatus::Processing)
    }

    pub fn finish(&mut self, status: JobStatus, wall_time: Duration) {
        self.status = status;
        self.wall_time_ms = Some(wall_time.as_millis() as u64);
    }
}
