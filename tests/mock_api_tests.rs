//! Black-box tests against the external transcription service boundary:
//! `HttpTranscriber` talking to a mocked HTTP server, and the retry/fatal
//! classification policy that sits above it in `TranscriberClient`.

use std::sync::Arc;
use std::time::Duration;

use transcribe_service::audio::AudioChunk;
use transcribe_service::config::Config;
use transcribe_service::transcribe::{HttpTranscriber, JobCache, Transcriber, TranscriberClient};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn sample_chunk(dir: &std::path::Path) -> AudioChunk {
    let path = dir.join("chunk_0001.wav");
    tokio::fs::write(&path, b"RIFF....WAVEfmt ").await.unwrap();
    AudioChunk {
        index: 1,
        path,
        start_time: Duration::from_secs(0),
        duration: Duration::from_secs(30),
    }
}

mod http_transport_tests {
    use super::*;

    #[tokio::test]
    async fn test_http_transcriber_parses_successful_verbose_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "task": "transcribe",
                "language": "en",
                "duration": 30.0,
                "text": "hello from the mock service",
                "segments": [
                    {"start": 0.0, "end": 2.5, "text": "hello from the mock service"}
                ]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chunk = sample_chunk(dir.path()).await;
        let config = Config {
            transcription_api_key: Some("test-key".to_string()),
            ..Config::default()
        };
        let transcriber =
            HttpTranscriber::new(&config, format!("{}/v1/audio/transcriptions", server.uri())).unwrap();

        let response = transcriber.transcribe_chunk(&chunk).await.unwrap();
        assert_eq!(response.text, "hello from the mock service");
        assert_eq!(response.segments.len(), 1);
    }

    #[tokio::test]
    async fn test_http_transcriber_surfaces_413_status_in_error_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(413).set_body_string("payload too large"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chunk = sample_chunk(dir.path()).await;
        let config = Config {
            transcription_api_key: Some("test-key".to_string()),
            ..Config::default()
        };
        let transcriber =
            HttpTranscriber::new(&config, format!("{}/v1/audio/transcriptions", server.uri())).unwrap();

        let err = transcriber.transcribe_chunk(&chunk).await.unwrap_err();
        assert!(err.to_string().contains("413"));
    }

    #[tokio::test]
    async fn test_http_transcriber_surfaces_500_status_in_error_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chunk = sample_chunk(dir.path()).await;
        let config = Config {
            transcription_api_key: Some("test-key".to_string()),
            ..Config::default()
        };
        let transcriber =
            HttpTranscriber::new(&config, format!("{}/v1/audio/transcriptions", server.uri())).unwrap();

        let err = transcriber.transcribe_chunk(&chunk).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}

/// Scenarios 3 and 4 from the end-to-end list: a transient run of upstream
/// failures that eventually succeeds, and a hard 413 that must not be
/// retried at all.
mod retry_policy_tests {
    use super::*;

    #[tokio::test]
    async fn test_transient_upstream_failures_then_success_reports_two_retries() {
        let server = MockServer::start().await;

        // First two attempts: 502. Third: success. wiremock serves stacked
        // mocks in registration order once `up_to_n_times` is exhausted.
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "task": "transcribe",
                "language": "en",
                "duration": 30.0,
                "text": "eventually succeeded",
                "segments": [{"start": 0.0, "end": 2.0, "text": "eventually succeeded"}]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chunk = sample_chunk(dir.path()).await;
        let config = Config {
            transcription_api_key: Some("test-key".to_string()),
            initial_retry_delay_ms: 1,
            max_retries: 3,
            ..Config::default()
        };
        let transcriber = Arc::new(
            HttpTranscriber::new(&config, format!("{}/v1/audio/transcriptions", server.uri())).unwrap(),
        );
        let client = TranscriberClient::new(transcriber, &config);
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = JobCache::new(cache_dir.path().to_path_buf());

        let result = client.transcribe(&chunk, &cache).await.unwrap();
        assert!(result.success);
        assert_eq!(result.retries, 2);
    }

    #[tokio::test]
    async fn test_hard_413_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(413).set_body_string("file exceeds limit"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chunk = sample_chunk(dir.path()).await;
        let config = Config {
            transcription_api_key: Some("test-key".to_string()),
            initial_retry_delay_ms: 1,
            max_retries: 5,
            ..Config::default()
        };
        let transcriber = Arc::new(
            HttpTranscriber::new(&config, format!("{}/v1/audio/transcriptions", server.uri())).unwrap(),
        );
        let client = TranscriberClient::new(transcriber, &config);
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = JobCache::new(cache_dir.path().to_path_buf());

        let result = client.transcribe(&chunk, &cache).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.retries, 0);
        assert!(result.error.unwrap().contains("413"));
    }

    #[tokio::test]
    async fn test_silent_failure_detected_over_http_is_retried_then_marked_failed() {
        // Every attempt returns a suspiciously short transcript for a 30s
        // chunk, which the silent-failure guard rejects as retryable on
        // every attempt; after the retry budget is exhausted the chunk is
        // reported as failed rather than a silently-accepted bad transcript.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "task": "transcribe",
                "language": "en",
                "duration": 1.0,
                "text": "ok",
                "segments": [{"start": 0.0, "end": 1.0, "text": "ok"}]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chunk = sample_chunk(dir.path()).await;
        let config = Config {
            transcription_api_key: Some("test-key".to_string()),
            initial_retry_delay_ms: 1,
            max_retries: 2,
            ..Config::default()
        };
        let transcriber = Arc::new(
            HttpTranscriber::new(&config, format!("{}/v1/audio/transcriptions", server.uri())).unwrap(),
        );
        let client = TranscriberClient::new(transcriber, &config);
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = JobCache::new(cache_dir.path().to_path_buf());

        let result = client.transcribe(&chunk, &cache).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.retries, 2);
        assert!(result.error.unwrap().contains("duration"));
    }
}
