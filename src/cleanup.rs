use std::path::Path;
use std::time::{Duration, SystemTime};

/// Background sweep removing entries older than `max_age` from a directory.
/// Runs once; callers schedule it on an interval. Grounded on the teacher's
/// `TempCleanupGuard` drop-based cleanup idiom, generalized from per-run
/// cleanup to a periodic sweep across both temp and output directories.
pub async fn sweep_once(dir: &Path, max_age: Duration) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "skipping cleanup sweep");
            return;
        }
    };

    let now = SystemTime::now();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "error walking directory during cleanup sweep");
                break;
            }
        };

        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(_) => continue,
        };

        let age = match metadata.modified().and_then(|m| now.duration_since(m)) {
            Ok(age) => age,
            Err(_) => continue,
        };

        if age <= max_age {
            continue;
        }

        let path = entry.path();
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };

        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove stale entry");
        } else {
            tracing::debug!(path = %path.display(), "removed stale entry");
        }
    }
}

/// Spawns the periodic sweeper over both the temp and output directories,
/// running every `interval` and removing entries older than `max_age`.
pub fn spawn_sweeper(
    temp_dir: std::path::PathBuf,
    output_dir: std::path::PathBuf,
    max_age: Duration,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            sweep_once(&temp_dir, max_age).await;
            sweep_once(&output_dir, max_age).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn test_sweep_once_removes_old_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("stale.txt");
        tokio::fs::write(&stale, b"data").await.unwrap();

        // Can't travel back in time on the file's mtime without touching
        // the filesystem API directly, so exercise the zero-age-tolerance
        // path instead: max_age=0 means "anything not modified in this
        // instant is stale."
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        sweep_once(dir.path(), Duration::from_millis(1)).await;

        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn test_sweep_once_keeps_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("fresh.txt");
        tokio::fs::write(&fresh, b"data").await.unwrap();

        sweep_once(dir.path(), Duration::from_secs(3600)).await;

        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn test_sweep_once_tolerates_missing_directory() {
        let missing = std::path::PathBuf::from("/nonexistent/path/for/cleanup/test");
        sweep_once(&missing, Duration::from_secs(1)).await;
    }
}
