use crate::stitch::Segment;
use std::time::Duration;

pub fn format(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| {
            format!(
                "{}\n{} --> {}\n{}\n",
                segment.index,
                format_timestamp(segment.start),
                format_timestamp(segment.end),
                segment.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_timestamp(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = d.subsec_millis();
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(Duration::from_millis(1500)), "00:00:01,500");
        assert_eq!(
            format_timestamp(Duration::from_secs(3661) + Duration::from_millis(123)),
            "01:01:01,123"
        );
    }

    #[test]
    fn test_format_srt_blocks() {
        let segments = vec![
            Segment {
                index: 1,
                start: Duration::from_millis(1500),
                end: Duration::from_millis(4000),
                text: "Hello, world!".to_string(),
            },
            Segment {
                index: 2,
                start: Duration::from_millis(4500),
                end: Duration::from_millis(7000),
                text: "This is a test.".to_string(),
            },
        ];

        let output = format(&segments);
        assert!(output.contains("1\n00:00:01,500 --> 00:00:04,000\nHello, world!"));
        assert!(output.contains("2\n00:00:04,500 --> 00:00:07,000\nThis is a test."));
    }
}
