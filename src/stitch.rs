use crate::transcribe::ChunkResult;
use std::time::Duration;

const GAP_OVERLAP_THRESHOLD: Duration = Duration::from_secs(1);
const DUPLICATE_LOOKBACK: usize = 3;
const QUALITY_DISCREPANCY_THRESHOLD_SECS: f64 = 60.0;
const QUALITY_MIN_DENSITY_PER_MIN: f64 = 1.0;
const QUALITY_MAX_FAILURE_RATE: f64 = 0.3;

/// A segment on the original timeline, ready for artifact emission.
#[derive(Debug, Clone)]
pub struct Segment {
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct StitchOutput {
    pub segments: Vec<Segment>,
    pub warnings: Vec<String>,
}

/// Walks chunk results in index order, mapping each service segment's
/// accelerated timestamps back onto the original timeline via
/// `s * speed_factor + chunk.start_time`, detecting gaps/overlaps between
/// chunks, and suppressing consecutive duplicate text (hallucination
/// spillover that survived C3's per-chunk guard).
pub fn stitch(results: &[ChunkResult], speed_factor: f64) -> StitchOutput {
    let mut ordered: Vec<&ChunkResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.chunk_index);

    let mut segments: Vec<Segment> = Vec::new();
    let mut warnings = Vec::new();
    let mut last_end_time = Duration::ZERO;
    let mut recent_texts: Vec<String> = Vec::new();
    let mut failed_count = 0usize;

    for result in &ordered {
        let gap = if result.start_time > last_end_time {
            result.start_time - last_end_time
        } else {
            Duration::ZERO
        };
        let overlap = if last_end_time > result.start_time {
            last_end_time - result.start_time
        } else {
            Duration::ZERO
        };

        if gap > GAP_OVERLAP_THRESHOLD {
            warnings.push(format!(
                "gap of {:.1}s before chunk {}",
                gap.as_secs_f64(),
                result.chunk_index
            ));
        } else if overlap > GAP_OVERLAP_THRESHOLD {
            warnings.push(format!(
                "overlap of {:.1}s before chunk {}",
                overlap.as_secs_f64(),
                result.chunk_index
            ));
        }

        if !result.success {
            failed_count += 1;
            warnings.push(format!(
                "chunk {} failed: {}",
                result.chunk_index,
                result.error.as_deref().unwrap_or("unknown error")
            ));
            last_end_time = result.start_time + result.duration;
            continue;
        }

        let Some(response) = &result.response else {
            last_end_time = result.start_time + result.duration;
            continue;
        };

        for raw in &response.segments {
            let text = raw.text.trim();
            if text.is_empty() {
                continue;
            }

            if recent_texts.iter().any(|t| t == text) {
                warnings.push(format!(
                    "duplicate segment text suppressed in chunk {}",
                    result.chunk_index
                ));
                continue;
            }

            let start = Duration::from_secs_f64(raw.start * speed_factor)
                + result.start_time;
            let end = Duration::from_secs_f64(raw.end * speed_factor) + result.start_time;

            segments.push(Segment {
                index: segments.len() + 1,
                start,
                end,
                text: text.to_string(),
            });

            recent_texts.push(text.to_string());
            if recent_texts.len() > DUPLICATE_LOOKBACK {
                recent_texts.remove(0);
            }
        }

        last_end_time = result.start_time + result.duration;
    }

    apply_quality_gate(&segments, &ordered, failed_count, &mut warnings);

    StitchOutput { segments, warnings }
}

fn apply_quality_gate(
    segments: &[Segment],
    ordered: &[&ChunkResult],
    failed_count: usize,
    warnings: &mut Vec<String>,
) {
    if ordered.is_empty() {
        return;
    }

    let total_duration: Duration = ordered.iter().map(|r| r.duration).sum();
    let total_minutes = (total_duration.as_secs_f64() / 60.0).max(1e-9);
    let density = segments.len() as f64 / total_minutes;
    let failure_rate = failed_count as f64 / ordered.len() as f64;

    let max_end = segments.iter().map(|s| s.end).max().unwrap_or(Duration::ZERO);
    let discrepancy = (max_end.as_secs_f64() - total_duration.as_secs_f64()).abs();

    if discrepancy > QUALITY_DISCREPANCY_THRESHOLD_SECS
        || density < QUALITY_MIN_DENSITY_PER_MIN
        || failure_rate > QUALITY_MAX_FAILURE_RATE
    {
        warnings.push(format!(
            "QUALITY_ALERT: density={density:.2}/min failure_rate={failure_rate:.2} discrepancy={discrepancy:.1}s"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::{RawSegment, TranscriptionResponse};

    fn success_result(index: usize, start: u64, duration: u64, texts: &[&str]) -> ChunkResult {
        ChunkResult {
            chunk_index: index,
            start_time: Duration::from_secs(start),
            duration: Duration::from_secs(duration),
            success: true,
            response: Some(TranscriptionResponse {
                task: None,
                language: Some("en".to_string()),
                duration: duration as f64,
                text: texts.join(" "),
                segments: texts
                    .iter()
                    .enumerate()
                    .map(|(i, t)| RawSegment {
                        start: i as f64 * 2.0,
                        end: i as f64 * 2.0 + 1.5,
                        text: t.to_string(),
                    })
                    .collect(),
            }),
            error: None,
            retries: 0,
        }
    }

    fn failure_result(index: usize, start: u64, duration: u64) -> ChunkResult {
        ChunkResult {
            chunk_index: index,
            start_time: Duration::from_secs(start),
            duration: Duration::from_secs(duration),
            success: false,
            response: None,
            error: Some("upstream failure".to_string()),
            retries: 5,
        }
    }

    #[test]
    fn test_stitch_maps_timestamps_with_speed_factor() {
        let results = vec![success_result(1, 0, 30, &["hello world"])];
        let output = stitch(&results, 2.0);
        assert_eq!(output.segments.len(), 1);
        assert_eq!(output.segments[0].start, Duration::from_secs(0));
        assert_eq!(output.segments[0].end, Duration::from_secs(3));
    }

    #[test]
    fn test_stitch_offsets_second_chunk_by_start_time() {
        let results = vec![
            success_result(1, 0, 30, &["first"]),
            success_result(2, 30, 30, &["second"]),
        ];
        let output = stitch(&results, 2.0);
        assert_eq!(output.segments.len(), 2);
        // second chunk's segment starts at raw 0 * F + chunk.start_time == 30s
        assert_eq!(output.segments[1].start, Duration::from_secs(30));
    }

    #[test]
    fn test_stitch_detects_gap() {
        let results = vec![
            success_result(1, 0, 10, &["first"]),
            success_result(2, 20, 10, &["second"]),
        ];
        let output = stitch(&results, 1.0);
        assert!(output.warnings.iter().any(|w| w.contains("gap")));
    }

    #[test]
    fn test_stitch_suppresses_consecutive_duplicates() {
        let results = vec![success_result(1, 0, 30, &["same text", "same text"])];
        let output = stitch(&results, 1.0);
        assert_eq!(output.segments.len(), 1);
        assert!(output.warnings.iter().any(|w| w.contains("duplicate")));
    }

    #[test]
    fn test_stitch_failed_chunk_advances_timeline_and_warns() {
        let results = vec![failure_result(1, 0, 30), success_result(2, 30, 30, &["ok"])];
        let output = stitch(&results, 1.0);
        assert_eq!(output.segments.len(), 1);
        assert!(output.warnings.iter().any(|w| w.contains("chunk 1 failed")));
    }

    #[test]
    fn test_stitch_segments_are_contiguously_indexed() {
        let results = vec![success_result(1, 0, 30, &["a", "b", "c"])];
        let output = stitch(&results, 1.0);
        let indices: Vec<usize> = output.segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_quality_alert_on_high_failure_rate() {
        let results = vec![
            failure_result(1, 0, 30),
            failure_result(2, 30, 30),
            success_result(3, 60, 30, &["a"]),
        ];
        let output = stitch(&results, 1.0);
        assert!(output.warnings.iter().any(|w| w.contains("QUALITY_ALERT")));
    }
}
