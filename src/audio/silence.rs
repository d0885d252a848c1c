use crate::audio::SilenceSegment;
use crate::error::{Result, ServiceError};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::time::Duration;

/// Parameters controlling the RMS-energy silence pass. Mirrors the shape of
/// the speech-detection windowing in the original VAD pass, just with the
/// classification inverted and the thresholds re-expressed in dB.
#[derive(Debug, Clone, Copy)]
pub struct SilenceConfig {
    pub threshold_db: f64,
    pub min_silence_duration: Duration,
    pub window_size: Duration,
}

impl SilenceConfig {
    pub fn from_config(cfg: &crate::config::Config) -> Self {
        Self {
            threshold_db: cfg.silence_threshold_db,
            min_silence_duration: Duration::from_secs_f64(cfg.silence_duration_secs),
            window_size: Duration::from_secs_f64(cfg.silence_window_secs),
        }
    }
}

fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / i16::MAX as f64;
            v * v
        })
        .sum();
    ((sum_sq / samples.len() as f64).sqrt()) as f32
}

fn rms_to_db(rms: f32) -> f64 {
    if rms <= 0.0 {
        return -100.0;
    }
    20.0 * (rms as f64).log10()
}

/// Scans `path` for intervals whose windowed RMS energy stays below
/// `threshold_db` for at least `min_silence_duration`. The returned segments
/// are candidate chunk-boundary cut points for the snap-to-silence strategy.
pub fn detect_silence(path: &Path, config: &SilenceConfig) -> Result<Vec<SilenceSegment>> {
    let mut reader = WavReader::open(path)
        .map_err(|e| ServiceError::MediaTransform(format!("failed to open wav: {e}")))?;
    let spec = reader.spec();
    let sample_rate = spec.sample_rate as f64;
    let channels = spec.channels as usize;

    let window_samples = ((config.window_size.as_secs_f64() * sample_rate) as usize).max(1);
    let hop_samples = (window_samples / 2).max(1);

    let samples: Vec<i16> = match spec.sample_format {
        SampleFormat::Int => reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ServiceError::MediaTransform(format!("failed to read samples: {e}")))?,
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v * i16::MAX as f32) as i16))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ServiceError::MediaTransform(format!("failed to read samples: {e}")))?,
    };

    if samples.is_empty() {
        return Ok(Vec::new());
    }

    // Treat all channels together; mono-downmix by frame isn't needed for
    // energy classification since we only care about magnitude.
    let frame_count = samples.len() / channels.max(1);
    let mut below_threshold = Vec::with_capacity(frame_count / hop_samples.max(1) + 1);

    let mut pos = 0usize;
    while pos < frame_count {
        let end = (pos + window_samples).min(frame_count);
        let window: &[i16] = &samples[pos * channels..end * channels];
        let rms = calculate_rms(window);
        let db = rms_to_db(rms);
        let window_start = Duration::from_secs_f64(pos as f64 / sample_rate);
        let window_end = Duration::from_secs_f64(end as f64 / sample_rate);
        below_threshold.push((window_start, window_end, db < config.threshold_db));
        if end >= frame_count {
            break;
        }
        pos += hop_samples;
    }

    Ok(merge_silent_windows(&below_threshold, config.min_silence_duration))
}

fn merge_silent_windows(
    windows: &[(Duration, Duration, bool)],
    min_silence_duration: Duration,
) -> Vec<SilenceSegment> {
    let mut segments = Vec::new();
    let mut current_start: Option<Duration> = None;
    let mut current_end = Duration::ZERO;

    for &(start, end, silent) in windows {
        if silent {
            if current_start.is_none() {
                current_start = Some(start);
            }
            current_end = end;
        } else if let Some(start) = current_start.take() {
            push_if_long_enough(&mut segments, start, current_end, min_silence_duration);
        }
    }
    if let Some(start) = current_start {
        push_if_long_enough(&mut segments, start, current_end, min_silence_duration);
    }

    segments
}

fn push_if_long_enough(
    segments: &mut Vec<SilenceSegment>,
    start: Duration,
    end: Duration,
    min_silence_duration: Duration,
) {
    if end.saturating_sub(start) >= min_silence_duration {
        segments.push(SilenceSegment { start, end });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_rms_silence() {
        let samples = vec![0i16; 1000];
        assert_eq!(calculate_rms(&samples), 0.0);
    }

    #[test]
    fn test_calculate_rms_full_scale() {
        let samples = vec![i16::MAX; 1000];
        let rms = calculate_rms(&samples);
        assert!((rms - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_rms_to_db_silence_floor() {
        assert_eq!(rms_to_db(0.0), -100.0);
    }

    #[test]
    fn test_merge_silent_windows_filters_short_gaps() {
        let windows = vec![
            (Duration::from_secs(0), Duration::from_secs(1), true),
            (Duration::from_secs(1), Duration::from_secs(2), false),
        ];
        let segments = merge_silent_windows(&windows, Duration::from_secs(2));
        assert!(segments.is_empty());
    }

    #[test]
    fn test_merge_silent_windows_keeps_long_gaps() {
        let windows = vec![
            (Duration::from_secs(0), Duration::from_secs(1), true),
            (Duration::from_secs(1), Duration::from_secs(2), true),
            (Duration::from_secs(2), Duration::from_secs(3), false),
        ];
        let segments = merge_silent_windows(&windows, Duration::from_secs_f64(1.5));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, Duration::from_secs(0));
        assert_eq!(segments[0].end, Duration::from_secs(2));
    }

    #[test]
    fn test_silence_segment_center() {
        let seg = SilenceSegment {
            start: Duration::from_secs(10),
            end: Duration::from_secs(20),
        };
        assert_eq!(seg.center(), Duration::from_secs(15));
    }
}
