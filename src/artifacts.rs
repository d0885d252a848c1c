use crate::config::OutputFormat;
use crate::error::Result;
use crate::job::Job;
use crate::stitch::Segment;
use crate::subtitle;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct SegmentView {
    index: usize,
    start: f64,
    end: f64,
    text: String,
}

impl From<&Segment> for SegmentView {
    fn from(s: &Segment) -> Self {
        Self {
            index: s.index,
            start: s.start.as_secs_f64(),
            end: s.end.as_secs_f64(),
            text: s.text.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ArtifactFormats {
    srt_path: Option<String>,
    txt_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct TranscriptView {
    segments: Vec<SegmentView>,
    full_text: String,
    formats: Option<ArtifactFormats>,
}

#[derive(Debug, Serialize)]
struct StructuredOutput<'a> {
    job: &'a Job,
    transcript: TranscriptView,
    warnings: Option<Vec<String>>,
}

/// Writes the requested artifact (plus, for the `structured` format, the
/// sibling SRT/plaintext files every structured response can point to)
/// under `OUTPUT_DIR/{job_id}/` and returns the paths written.
pub async fn write_artifacts(
    output_dir: &Path,
    job: &Job,
    segments: &[Segment],
    format: OutputFormat,
    warnings: &[String],
) -> Result<Vec<PathBuf>> {
    let job_dir = output_dir.join(job.id.to_string());
    tokio::fs::create_dir_all(&job_dir).await?;

    let full_text = subtitle::format_plaintext(segments);
    let mut written = Vec::new();

    match format {
        OutputFormat::Srt => {
            let path = job_dir.join("transcript.srt");
            tokio::fs::write(&path, subtitle::format_srt(segments)).await?;
            written.push(path);
        }
        OutputFormat::Txt => {
            let path = job_dir.join("transcript.txt");
            tokio::fs::write(&path, &full_text).await?;
            written.push(path);
        }
        OutputFormat::Json => {
            let srt_path = job_dir.join("transcript.srt");
            let txt_path = job_dir.join("transcript.txt");
            tokio::fs::write(&srt_path, subtitle::format_srt(segments)).await?;
            tokio::fs::write(&txt_path, &full_text).await?;

            let output = StructuredOutput {
                job,
                transcript: TranscriptView {
                    segments: segments.iter().map(SegmentView::from).collect(),
                    full_text,
                    formats: Some(ArtifactFormats {
                        srt_path: Some(srt_path.display().to_string()),
                        txt_path: Some(txt_path.display().to_string()),
                    }),
                },
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings.to_vec())
                },
            };

            let json_path = job_dir.join("transcript.json");
            let serialized = serde_json::to_vec_pretty(&output)?;
            tokio::fs::write(&json_path, serialized).await?;
            written.push(json_path);
            written.push(srt_path);
            written.push(txt_path);
        }
    }

    Ok(written)
}
