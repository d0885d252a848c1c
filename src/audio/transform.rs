use crate::audio::{AudioMetadata, TransformResult};
use crate::error::{Result, ServiceError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Accelerated timelines beyond this are almost certainly a misconfigured
/// speed factor rather than a legitimately long recording.
const MAX_ORIGINAL_DURATION: Duration = Duration::from_secs(2 * 60 * 60);

/// Tolerances for sanity-checking the ffmpeg `atempo` pass against what
/// ffprobe reports back after the fact.
const DURATION_ACCURACY_TOLERANCE: f64 = 0.05;
const DUPLICATION_RATIO_THRESHOLD: f64 = 1.9;
const CORRUPTION_RATIO_THRESHOLD: f64 = 0.5;

pub async fn check_ffmpeg() -> Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| ServiceError::Config(format!("ffmpeg not found: {e}")))?;
    if !output.status.success() {
        return Err(ServiceError::Config("ffmpeg -version failed".to_string()));
    }
    Ok(())
}

pub async fn check_ffprobe() -> Result<()> {
    let output = Command::new("ffprobe")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| ServiceError::Config(format!("ffprobe not found: {e}")))?;
    if !output.status.success() {
        return Err(ServiceError::Config("ffprobe -version failed".to_string()));
    }
    Ok(())
}

pub async fn probe_audio(path: &Path) -> Result<AudioMetadata> {
    let duration = probe_duration(path).await?;
    let (sample_rate, channels) = probe_stream_info(path).await?;
    let bytes = tokio::fs::metadata(path).await?.len();
    Ok(AudioMetadata {
        duration,
        sample_rate,
        channels,
        bytes,
    })
}

async fn probe_duration(path: &Path) -> Result<Duration> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| ServiceError::MediaTransform(format!("ffprobe failed: {e}")))?;

    if !output.status.success() {
        return Err(ServiceError::MediaTransform(format!(
            "ffprobe exited with {}",
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let seconds: f64 = stdout
        .trim()
        .parse()
        .map_err(|_| ServiceError::MediaTransform("could not parse duration".to_string()))?;
    Ok(Duration::from_secs_f64(seconds))
}

async fn probe_stream_info(path: &Path) -> Result<(u32, u16)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "a:0",
            "-show_entries",
            "stream=sample_rate,channels",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| ServiceError::MediaTransform(format!("ffprobe failed: {e}")))?;

    if !output.status.success() {
        return Err(ServiceError::MediaTransform(format!(
            "ffprobe exited with {}",
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut parts = stdout.trim().split(',');
    let sample_rate: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ServiceError::MediaTransform("could not parse sample rate".to_string()))?;
    let channels: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ServiceError::MediaTransform("could not parse channel count".to_string()))?;
    Ok((sample_rate, channels))
}

/// Applies the configured speed factor to `input`, writing the accelerated
/// working file into `work_dir`, and validates the result against what
/// ffprobe reports back: duration must land within 5% of the expected
/// `original / speed_factor`, and the output must be neither a near-duplicate
/// of the input (speed factor silently ignored) nor corrupt (near-zero
/// length or byte count).
pub async fn process_audio(
    input: &Path,
    work_dir: &Path,
    speed_factor: f64,
) -> Result<TransformResult> {
    let original = probe_audio(input).await?;
    let mut warnings = Vec::new();

    if original.duration > MAX_ORIGINAL_DURATION {
        warnings.push(format!(
            "source duration {:.0}s exceeds the {:.0}s soft limit; processing will continue",
            original.duration.as_secs_f64(),
            MAX_ORIGINAL_DURATION.as_secs_f64()
        ));
    }

    let accelerated_path = work_dir.join("accelerated.wav");
    run_atempo(input, &accelerated_path, speed_factor).await?;

    let accelerated = probe_audio(&accelerated_path).await?;

    let expected = original.duration.as_secs_f64() / speed_factor;
    let actual = accelerated.duration.as_secs_f64();
    let relative_error = if expected > 0.0 {
        (actual - expected).abs() / expected
    } else {
        0.0
    };

    if accelerated.bytes == 0 || actual < expected * CORRUPTION_RATIO_THRESHOLD {
        return Err(ServiceError::MediaTransform(
            "accelerated output is empty or implausibly short; source may be corrupt".to_string(),
        ));
    }

    if actual > expected * DUPLICATION_RATIO_THRESHOLD {
        return Err(ServiceError::MediaTransform(
            "accelerated output duration suggests the speed factor was not applied".to_string(),
        ));
    }

    if relative_error > DURATION_ACCURACY_TOLERANCE {
        return Err(ServiceError::Validation(format!(
            "accelerated duration {actual:.1}s deviates {:.1}% from expected {expected:.1}s",
            relative_error * 100.0
        )));
    }

    Ok(TransformResult {
        accelerated_path,
        accelerated_duration: accelerated.duration,
        original_duration: original.duration,
        original_bytes: original.bytes,
        warnings,
    })
}

async fn run_atempo(input: &Path, output: &Path, speed_factor: f64) -> Result<()> {
    let filter = atempo_filter_chain(speed_factor);

    let status = Command::new("ffmpeg")
        .args(["-y", "-i"])
        .arg(input)
        .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
        .args(["-filter:a", &filter])
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| ServiceError::MediaTransform(format!("ffmpeg failed: {e}")))?;

    if !status.success() {
        return Err(ServiceError::MediaTransform(format!(
            "ffmpeg exited with {status}"
        )));
    }
    Ok(())
}

/// `atempo` only accepts factors in `[0.5, 2.0]`, so factors outside that
/// range are expressed as a chain of `atempo` stages whose product equals
/// the requested factor.
fn atempo_filter_chain(mut factor: f64) -> String {
    let mut stages = Vec::new();
    if factor <= 0.0 {
        factor = 1.0;
    }
    while factor > 2.0 {
        stages.push(2.0_f64);
        factor /= 2.0;
    }
    while factor < 0.5 {
        stages.push(0.5_f64);
        factor /= 0.5;
    }
    stages.push(factor);
    stages
        .iter()
        .map(|f| format!("atempo={f:.4}"))
        .collect::<Vec<_>>()
        .join(",")
}
