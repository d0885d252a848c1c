pub mod chunk;
pub mod silence;
pub mod transform;

pub use chunk::{create_chunks, plan_chunks, ChunkPlanConfig};
pub use silence::{detect_silence, SilenceConfig};
pub use transform::process_audio;

use std::path::PathBuf;
use std::time::Duration;

/// Metadata about a probed audio file.
#[derive(Debug, Clone)]
pub struct AudioMetadata {
    pub duration: Duration,
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes: u64,
}

/// Result of the MediaTransform phase (C1).
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub accelerated_path: PathBuf,
    pub accelerated_duration: Duration,
    pub original_duration: Duration,
    pub original_bytes: u64,
    pub warnings: Vec<String>,
}

/// A silence interval on the accelerated timeline, as produced by the
/// silence-detection pass that the chunker snaps chunk boundaries to.
#[derive(Debug, Clone, Copy)]
pub struct SilenceSegment {
    pub start: Duration,
    pub end: Duration,
}

impl SilenceSegment {
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    pub fn center(&self) -> Duration {
        self.start + self.duration() / 2
    }
}

/// A planned, immutable chunk of the original audio. `start_time` and
/// `duration` are always expressed on the **original** timeline even though
/// the underlying cut was made against the accelerated working file.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub index: usize,
    pub path: PathBuf,
    pub start_time: Duration,
    pub duration: Duration,
}

impl AudioChunk {
    pub fn end_time(&self) -> Duration {
        self.start_time + self.duration
    }
}
