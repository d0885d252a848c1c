use crate::audio::{silence, AudioChunk, SilenceConfig};
use crate::error::{Result, ServiceError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const MAX_CHUNK_BYTES: u64 = 18 * 1024 * 1024;
const MAX_CHUNK_DURATION: Duration = Duration::from_secs(20 * 60);
const MIN_REDUCTION_TARGET: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ChunkPlanConfig {
    pub min_chunk_duration: Duration,
    pub silence: SilenceConfig,
    pub snap_to_silence: bool,
}

impl ChunkPlanConfig {
    pub fn from_config(cfg: &crate::config::Config) -> Self {
        Self {
            min_chunk_duration: Duration::from_secs_f64(cfg.min_chunk_duration_secs),
            silence: SilenceConfig::from_config(cfg),
            snap_to_silence: true,
        }
    }
}

struct PlannedBoundary {
    start: Duration,
    end: Duration,
}

/// Computes the accelerated-timeline boundaries (before silence-snapping)
/// that satisfy both the size and duration caps.
fn ideal_boundaries(
    accelerated_duration: Duration,
    original_duration: Duration,
    original_bytes: u64,
) -> Vec<PlannedBoundary> {
    let min_chunks_by_size = (original_bytes as f64 / MAX_CHUNK_BYTES as f64).ceil().max(1.0);
    let min_chunks_by_duration = (accelerated_duration.as_secs_f64()
        / MAX_CHUNK_DURATION.as_secs_f64())
    .ceil()
    .max(1.0);
    let n = min_chunks_by_size.max(min_chunks_by_duration) as usize;

    let ideal_accelerated_step = accelerated_duration.as_secs_f64() / n as f64;
    let _ = original_duration;

    (0..n)
        .map(|i| {
            let start = Duration::from_secs_f64(ideal_accelerated_step * i as f64);
            let end = if i + 1 == n {
                accelerated_duration
            } else {
                Duration::from_secs_f64(ideal_accelerated_step * (i + 1) as f64)
            };
            PlannedBoundary { start, end }
        })
        .collect()
}

/// Snaps each interior boundary to the center of the nearest silence
/// interval within `window`, falling back to the exact cut when no
/// candidate silence interval is close enough or the snap would leave a
/// tail shorter than `min_chunk_duration`.
fn snap_boundaries(
    boundaries: Vec<PlannedBoundary>,
    silences: &[crate::audio::SilenceSegment],
    window: Duration,
    min_chunk_duration: Duration,
    total: Duration,
) -> Vec<PlannedBoundary> {
    let mut cuts: Vec<Duration> = boundaries.iter().map(|b| b.end).collect();
    let last_idx = cuts.len().saturating_sub(1);

    for (i, cut) in cuts.iter_mut().enumerate() {
        if i == last_idx {
            continue; // final boundary is always the true end
        }
        let target = *cut;
        let candidate = silences
            .iter()
            .map(|s| s.center())
            .filter(|c| {
                let diff = if *c > target { *c - target } else { target - *c };
                diff <= window
            })
            .min_by_key(|c| {
                if *c > target { *c - target } else { target - *c }
            });

        if let Some(snapped) = candidate {
            if snapped > Duration::ZERO && total.saturating_sub(snapped) >= min_chunk_duration {
                *cut = snapped;
            }
        }
    }

    let mut result = Vec::with_capacity(cuts.len());
    let mut prev = Duration::ZERO;
    for cut in cuts {
        let end = cut.min(total);
        let end = end.max(prev);
        result.push(PlannedBoundary { start: prev, end });
        prev = end;
    }
    if let Some(last) = result.last_mut() {
        last.end = total;
    }
    result.retain(|b| b.end.saturating_sub(b.start) > Duration::from_millis(100));
    result
}

/// Plans chunk boundaries on the accelerated timeline, returning chunks
/// whose `start_time`/`duration` are expressed back on the **original**
/// timeline (divided by `speed_factor`).
pub async fn plan_chunks(
    accelerated_path: &Path,
    accelerated_duration: Duration,
    original_duration: Duration,
    original_bytes: u64,
    speed_factor: f64,
    config: &ChunkPlanConfig,
) -> Result<Vec<AudioChunk>> {
    let boundaries = ideal_boundaries(accelerated_duration, original_duration, original_bytes);

    let boundaries = if config.snap_to_silence {
        let silences = detect_silence_for_planning(accelerated_path, config)?;
        snap_boundaries(
            boundaries,
            &silences,
            config.silence.window_size,
            config.min_chunk_duration,
            accelerated_duration,
        )
    } else {
        boundaries
    };

    let mut chunks = Vec::with_capacity(boundaries.len());
    for (i, boundary) in boundaries.iter().enumerate() {
        let original_start = Duration::from_secs_f64(boundary.start.as_secs_f64() / speed_factor);
        let original_end = Duration::from_secs_f64(boundary.end.as_secs_f64() / speed_factor);
        chunks.push(AudioChunk {
            index: i + 1,
            path: PathBuf::new(), // filled in by create_chunks
            start_time: original_start,
            duration: original_end.saturating_sub(original_start),
        });
    }
    Ok(chunks)
}

fn detect_silence_for_planning(
    accelerated_path: &Path,
    config: &ChunkPlanConfig,
) -> Result<Vec<crate::audio::SilenceSegment>> {
    match silence::detect_silence(accelerated_path, &config.silence) {
        Ok(segments) => Ok(segments),
        // Silence detection is a planning aid only; if it fails (e.g. the
        // working file isn't a plain WAV) we degrade to uniform cuts.
        Err(e) => {
            tracing::warn!(error = %e, "silence detection failed, falling back to uniform cuts");
            Ok(Vec::new())
        }
    }
}

/// When halving truncates a chunk's duration below what was originally
/// planned for it, the dropped tail is not discarded: it becomes a new chunk
/// inserted right after this one, on the original timeline, so it still gets
/// transcribed and every later chunk's `start_time` stays correct without
/// needing to shift.
fn requeue_remainder(chunks: &mut Vec<AudioChunk>, i: usize, kept_duration: Duration) {
    let original_duration = chunks[i].duration;
    if kept_duration >= original_duration {
        return;
    }

    let remainder_start = chunks[i].start_time + kept_duration;
    let remainder_duration = original_duration - kept_duration;
    chunks[i].duration = kept_duration;

    let remainder_index = chunks[i].index + 1;
    for later in chunks.iter_mut().skip(i + 1) {
        later.index += 1;
    }
    chunks.insert(
        i + 1,
        AudioChunk {
            index: remainder_index,
            path: PathBuf::new(),
            start_time: remainder_start,
            duration: remainder_duration,
        },
    );
}

/// Cuts each planned chunk out of the accelerated working file, re-probing
/// and halving the target duration on oversize output until the chunk fits
/// under the 18 MiB cap or the target collapses to ~1s. Any duration
/// truncated off in the process is requeued as a new chunk covering the
/// dropped tail rather than being silently dropped from transcription; a
/// chunk that still exceeds the cap even at the reduction floor gets a
/// warning appended to `warnings` but is still emitted.
pub async fn create_chunks(
    accelerated_path: &Path,
    chunks: &mut Vec<AudioChunk>,
    chunk_dir: &Path,
    speed_factor: f64,
    warnings: &mut Vec<String>,
) -> Result<()> {
    tokio::fs::create_dir_all(chunk_dir).await?;

    let mut i = 0;
    while i < chunks.len() {
        let original_start = chunks[i].start_time;
        let original_duration = chunks[i].duration;
        let accel_start = Duration::from_secs_f64(original_start.as_secs_f64() * speed_factor);
        let mut accel_duration =
            Duration::from_secs_f64(original_duration.as_secs_f64() * speed_factor);

        let out_path = chunk_dir.join(format!("chunk_{:04}.wav", chunks[i].index));

        let final_size = loop {
            cut_segment(accelerated_path, &out_path, accel_start, accel_duration).await?;
            let size = tokio::fs::metadata(&out_path).await?.len();

            if size <= MAX_CHUNK_BYTES || accel_duration <= MIN_REDUCTION_TARGET {
                break size;
            }

            accel_duration = Duration::from_secs_f64(accel_duration.as_secs_f64() / 2.0);
        };

        let kept_duration = Duration::from_secs_f64(accel_duration.as_secs_f64() / speed_factor);
        chunks[i].path = out_path;
        requeue_remainder(chunks, i, kept_duration);

        if final_size > MAX_CHUNK_BYTES {
            warnings.push(format!(
                "chunk {} exceeds the {}-byte cap after reduction (size {})",
                chunks[i].index, MAX_CHUNK_BYTES, final_size
            ));
        }

        i += 1;
    }

    Ok(())
}

async fn cut_segment(
    input: &Path,
    output: &Path,
    start: Duration,
    duration: Duration,
) -> Result<()> {
    let status = Command::new("ffmpeg")
        .args(["-y", "-ss", &format!("{:.3}", start.as_secs_f64())])
        .arg("-i")
        .arg(input)
        .args(["-t", &format!("{:.3}", duration.as_secs_f64())])
        .args(["-acodec", "pcm_s16le"])
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| ServiceError::MediaTransform(format!("ffmpeg segment cut failed: {e}")))?;

    if !status.success() {
        return Err(ServiceError::MediaTransform(format!(
            "ffmpeg exited with {status} while cutting segment"
        )));
    }
    Ok(())
}
