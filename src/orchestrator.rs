use crate::artifacts;
use crate::audio::{self, chunk::ChunkPlanConfig};
use crate::config::{Config, OutputFormat};
use crate::error::{Result, ServiceError};
use crate::job::{Job, JobStatus};
use crate::stitch;
use crate::transcribe::{JobCache, Transcriber, TranscriberClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const CLEANUP_DELAY: Duration = Duration::from_secs(5 * 60);

/// Result of driving one job through all six phases.
pub struct JobOutcome {
    pub job: Job,
    pub segments: Vec<stitch::Segment>,
    pub warnings: Vec<String>,
    pub artifact_paths: Vec<PathBuf>,
}

/// Runs phases 1-6 for a single request: media transform, chunking, the
/// transcription batch, final-validation, stitching, and artifact emission.
/// Generalizes the teacher's `generate_subtitles` driver from a CLI
/// progress-bar pipeline into an HTTP-request-scoped job runner, keeping the
/// same phase sequencing and cancellation-token idiom.
pub struct JobOrchestrator {
    config: Arc<Config>,
    transcriber: Arc<dyn Transcriber>,
}

impl JobOrchestrator {
    pub fn new(config: Arc<Config>, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            config,
            transcriber,
        }
    }

    /// Runs the job under `job_id` (minted by the caller so it can be handed
    /// back before this future resolves) to completion, enforcing the
    /// configured total-job soft deadline by cancelling `cancellation` if
    /// the phases haven't finished in time.
    pub async fn run(
        &self,
        job_id: Uuid,
        input_path: &Path,
        speed_factor: f64,
        format: OutputFormat,
        cancellation: CancellationToken,
    ) -> Result<JobOutcome> {
        let started = Instant::now();
        let created_at_unix_ms = unix_millis_now();
        let mut job = Job::new(job_id, speed_factor, format, created_at_unix_ms);

        let job_temp_dir = self.config.temp_dir.join(format!("job_{job_id}"));
        tokio::fs::create_dir_all(&job_temp_dir).await?;

        let deadline = self.config.job_soft_deadline();
        let deadline_cancellation = cancellation.clone();
        let deadline_guard = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            tracing::warn!(job_id = %job_id, "soft deadline exceeded, cancelling job");
            deadline_cancellation.cancel();
        });

        let result = self
            .run_phases(&mut job, input_path, speed_factor, format, &job_temp_dir, &cancellation)
            .await;

        deadline_guard.abort();

        schedule_cleanup(job_temp_dir.clone());

        let wall_time = started.elapsed();
        match result {
            Ok((segments, warnings, artifact_paths)) => {
                let status = final_status(&segments, &warnings);
                job.finish(status, wall_time);
                Ok(JobOutcome {
                    job,
                    segments,
                    warnings,
                    artifact_paths,
                })
            }
            Err(e) => {
                job.finish(JobStatus::Failed, wall_time);
                tracing::error!(job_id = %job_id, error = %e, "job failed");
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        job: &mut Job,
        input_path: &Path,
        speed_factor: f64,
        format: OutputFormat,
        job_temp_dir: &Path,
        cancellation: &CancellationToken,
    ) -> Result<(Vec<stitch::Segment>, Vec<String>, Vec<PathBuf>)> {
        // Phase 1: MediaTransform.
        let transform = audio::process_audio(input_path, job_temp_dir, speed_factor).await?;
        job.source_duration_secs = Some(transform.original_duration.as_secs_f64());
        job.accelerated_duration_secs = Some(transform.accelerated_duration.as_secs_f64());
        let mut warnings = transform.warnings.clone();

        // Phase 2: Chunker.
        let chunk_plan_config = ChunkPlanConfig::from_config(&self.config);
        let mut chunks = audio::chunk::plan_chunks(
            &transform.accelerated_path,
            transform.accelerated_duration,
            transform.original_duration,
            transform.original_bytes,
            speed_factor,
            &chunk_plan_config,
        )
        .await?;

        let chunk_dir = job_temp_dir.join("chunks");
        audio::chunk::create_chunks(
            &transform.accelerated_path,
            &mut chunks,
            &chunk_dir,
            speed_factor,
            &mut warnings,
        )
        .await?;
        job.chunks_planned = chunks.len();

        // Phase 3: BatchCoordinator.
        let transcripts_dir = job_temp_dir.join("transcripts");
        let cache = JobCache::new(transcripts_dir);
        let client = Arc::new(TranscriberClient::new(Arc::clone(&self.transcriber), &self.config));
        let results = crate::transcribe::transcribe_all(
            &chunks,
            client,
            &cache,
            self.config.concurrent_chunks,
            cancellation,
        )
        .await;

        job.chunks_processed = results.iter().filter(|r| r.success).count();
        job.chunks_failed = results.iter().filter(|r| !r.success).count();
        job.total_retries = results.iter().map(|r| r.retries).sum();

        if job.chunks_failed > 0 && job.chunks_processed == 0 {
            return Err(ServiceError::JobFailed(
                "every chunk failed transcription".to_string(),
            ));
        }

        // Phase 4: final validation.
        let has_any_segment = results
            .iter()
            .any(|r| r.response.as_ref().is_some_and(|resp| !resp.segments.is_empty()));
        if !has_any_segment {
            return Err(ServiceError::JobFailed(
                "no segments produced by any chunk".to_string(),
            ));
        }

        // Phase 5: TimelineStitcher.
        let stitch_output = stitch::stitch(&results, speed_factor);
        warnings.extend(stitch_output.warnings);

        // Phase 6: artifacts.
        let artifact_paths = artifacts::write_artifacts(
            &self.config.output_dir,
            job,
            &stitch_output.segments,
            format,
            &warnings,
        )
        .await?;

        Ok((stitch_output.segments, warnings, artifact_paths))
    }
}

fn final_status(segments: &[stitch::Segment], warnings: &[String]) -> JobStatus {
    if segments.is_empty() {
        return JobStatus::Failed;
    }
    let has_quality_alert = warnings.iter().any(|w| w.contains("QUALITY_ALERT"));
    if warnings.is_empty() && !has_quality_alert {
        JobStatus::Completed
    } else {
        JobStatus::CompletedWithWarnings
    }
}

fn schedule_cleanup(job_temp_dir: PathBuf) {
    tokio::spawn(async move {
        tokio::time::sleep(CLEANUP_DELAY).await;
        if let Err(e) = tokio::fs::remove_dir_all(&job_temp_dir).await {
            tracing::warn!(
                dir = %job_temp_dir.display(),
                error = %e,
                "failed to clean up job temp directory"
            );
        } else {
            tracing::debug!(dir = %job_temp_dir.display(), "cleaned up job temp directory");
        }
    });
}

fn unix_millis_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
