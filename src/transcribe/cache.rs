use crate::error::Result;
use crate::transcribe::TranscriptionResponse;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-job transcript cache, explicitly threaded through as a value rather
/// than kept as module-level global state so that concurrent jobs (and
/// retried batches within one job) never share mutable state.
#[derive(Debug, Clone)]
pub struct JobCache {
    dir: PathBuf,
}

impl JobCache {
    pub fn new(transcripts_dir: PathBuf) -> Self {
        Self {
            dir: transcripts_dir,
        }
    }

    fn path_for(&self, chunk_index: usize) -> PathBuf {
        self.dir.join(format!("chunk_{chunk_index:03}.json"))
    }

    /// Returns the cached response if present and its reported duration is
    /// within 5% of `expected_duration`; deletes and reports a miss on
    /// mismatch so a stale cache entry never silently masks a re-chunk.
    pub async fn get(
        &self,
        chunk_index: usize,
        expected_duration: Duration,
    ) -> Result<Option<TranscriptionResponse>> {
        let path = self.path_for(chunk_index);
        if !path.exists() {
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(&path).await?;
        let response: TranscriptionResponse = match serde_json::from_str(&contents) {
            Ok(r) => r,
            Err(_) => {
                tokio::fs::remove_file(&path).await.ok();
                return Ok(None);
            }
        };

        let expected = expected_duration.as_secs_f64();
        let relative_error = if expected > 0.0 {
            (response.duration - expected).abs() / expected
        } else {
            0.0
        };

        if relative_error > 0.05 {
            tokio::fs::remove_file(&path).await.ok();
            return Ok(None);
        }

        Ok(Some(response))
    }

    /// Writes a successful response to the cache atomically: write to a
    /// temp path in the same directory, then rename, so a crash mid-write
    /// never leaves a corrupt cache file behind.
    pub async fn put(&self, chunk_index: usize, response: &TranscriptionResponse) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let final_path = self.path_for(chunk_index);
        let tmp_path = self.dir.join(format!("chunk_{chunk_index:03}.json.tmp"));

        let serialized = serde_json::to_vec(response)?;
        tokio::fs::write(&tmp_path, serialized).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
