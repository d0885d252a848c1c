pub mod srt;

use crate::stitch::Segment;

/// Produces an SRT subtitle document (`HH:MM:SS,mmm --> HH:MM:SS,mmm`
/// blocks) directly from the stitched segment list. Segments come straight
/// out of the timeline stitcher, so no separate subtitle-entry type or
/// merge/split post-processing stage sits between them and the formatter.
pub fn format_srt(segments: &[Segment]) -> String {
    srt::format(segments)
}

/// Space-joins segment texts for the plaintext artifact.
pub fn format_plaintext(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_segments() -> Vec<Segment> {
        vec![
            Segment {
                index: 1,
                start: Duration::from_secs(0),
                end: Duration::from_secs(2),
                text: "hello".to_string(),
            },
            Segment {
                index: 2,
                start: Duration::from_secs(2),
                end: Duration::from_secs(4),
                text: "world".to_string(),
            },
        ]
    }

    #[test]
    fn test_format_plaintext_joins_with_single_space() {
        assert_eq!(format_plaintext(&sample_segments()), "hello world");
    }

    #[test]
    fn test_format_plaintext_empty() {
        assert_eq!(format_plaintext(&[]), "");
    }
}
