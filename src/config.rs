use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Srt,
    Txt,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Srt => write!(f, "srt"),
            OutputFormat::Txt => write!(f, "txt"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "srt" => Ok(OutputFormat::Srt),
            "txt" => Ok(OutputFormat::Txt),
            _ => Err(format!(
                "Unknown format: {s}. Use 'json', 'srt', or 'txt'"
            )),
        }
    }
}

/// Service configuration, layered: defaults -> optional TOML file -> environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API key for the external transcription service.
    pub transcription_api_key: Option<String>,
    /// Expected `X-API-Key` / bearer secret for inbound requests.
    pub auth_secret: Option<String>,

    pub bind_addr: String,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,

    pub default_speed_factor: f64,
    pub chunk_time_secs: u64,
    pub concurrent_chunks: usize,
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub max_file_size_mb: u64,
    pub allowed_audio_formats: Vec<String>,
    pub temp_file_max_age_hours: u64,
    pub max_concurrent_jobs: usize,
    /// Total wall-clock budget for a single job, from admission to artifact
    /// write. Exceeding it cancels the in-flight batch rather than letting a
    /// stuck chunk hold a job slot indefinitely.
    pub job_soft_deadline_secs: u64,

    pub silence_threshold_db: f64,
    pub silence_duration_secs: f64,
    pub silence_window_secs: f64,
    pub min_chunk_duration_secs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transcription_api_key: None,
            auth_secret: None,
            bind_addr: "0.0.0.0:8080".to_string(),
            temp_dir: std::env::temp_dir().join("transcribe_service"),
            output_dir: PathBuf::from("./output"),
            default_speed_factor: 2.0,
            chunk_time_secs: 900,
            concurrent_chunks: 4,
            max_retries: 5,
            initial_retry_delay_ms: 1000,
            request_timeout_ms: 600_000,
            max_file_size_mb: 500,
            allowed_audio_formats: vec![
                "mp3".into(),
                "wav".into(),
                "m4a".into(),
                "ogg".into(),
                "flac".into(),
                "aac".into(),
            ],
            temp_file_max_age_hours: 24,
            max_concurrent_jobs: 8,
            job_soft_deadline_secs: 30 * 60,
            silence_threshold_db: -40.0,
            silence_duration_secs: 0.5,
            silence_window_secs: 5.0,
            min_chunk_duration_secs: 30.0,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = toml::from_str::<Config>(&contents) {
                    config = file_config;
                }
            }
        }

        if let Ok(key) = std::env::var("TRANSCRIPTION_API_KEY") {
            config.transcription_api_key = Some(key);
        }
        if let Ok(secret) = std::env::var("AUTH_SECRET") {
            config.auth_secret = Some(secret);
        }
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(dir) = std::env::var("TEMP_DIR") {
            config.temp_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(v) = std::env::var("SPEED_FACTOR") {
            if let Ok(v) = v.parse() {
                config.default_speed_factor = v;
            }
        }
        if let Ok(v) = std::env::var("CHUNK_TIME") {
            if let Ok(v) = v.parse() {
                config.chunk_time_secs = v;
            }
        }
        if let Ok(v) = std::env::var("CONCURRENT_CHUNKS") {
            if let Ok(v) = v.parse() {
                config.concurrent_chunks = v;
            }
        }
        if let Ok(v) = std::env::var("MAX_RETRIES") {
            if let Ok(v) = v.parse() {
                config.max_retries = v;
            }
        }
        if let Ok(v) = std::env::var("INITIAL_RETRY_DELAY") {
            if let Ok(v) = v.parse() {
                config.initial_retry_delay_ms = v;
            }
        }
        if let Ok(v) = std::env::var("REQUEST_TIMEOUT") {
            if let Ok(v) = v.parse() {
                config.request_timeout_ms = v;
            }
        }
        if let Ok(v) = std::env::var("MAX_FILE_SIZE_MB") {
            if let Ok(v) = v.parse() {
                config.max_file_size_mb = v;
            }
        }
        if let Ok(v) = std::env::var("ALLOWED_AUDIO_FORMATS") {
            config.allowed_audio_formats =
                v.split(',').map(|s| s.trim().to_lowercase()).collect();
        }
        if let Ok(v) = std::env::var("TEMP_FILE_MAX_AGE_HOURS") {
            if let Ok(v) = v.parse() {
                config.temp_file_max_age_hours = v;
            }
        }
        if let Ok(v) = std::env::var("MAX_CONCURRENT_JOBS") {
            if let Ok(v) = v.parse() {
                config.max_concurrent_jobs = v;
            }
        }
        if let Ok(v) = std::env::var("JOB_SOFT_DEADLINE_SECS") {
            if let Ok(v) = v.parse() {
                config.job_soft_deadline_secs = v;
            }
        }
        if let Ok(v) = std::env::var("SILENCE_THRESHOLD") {
            if let Ok(v) = v.parse() {
                config.silence_threshold_db = v;
            }
        }
        if let Ok(v) = std::env::var("SILENCE_DURATION") {
            if let Ok(v) = v.parse() {
                config.silence_duration_secs = v;
            }
        }
        if let Ok(v) = std::env::var("SILENCE_WINDOW") {
            if let Ok(v) = v.parse() {
                config.silence_window_secs = v;
            }
        }
        if let Ok(v) = std::env::var("MIN_CHUNK_DURATION") {
            if let Ok(v) = v.parse() {
                config.min_chunk_duration_secs = v;
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.transcription_api_key.is_none() {
            return Err(ServiceError::Config(
                "TRANSCRIPTION_API_KEY not set".to_string(),
            ));
        }
        if self.concurrent_chunks == 0 {
            return Err(ServiceError::Config(
                "CONCURRENT_CHUNKS must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ServiceError::Config(
                "MAX_CONCURRENT_JOBS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn job_soft_deadline(&self) -> Duration {
        Duration::from_secs(self.job_soft_deadline_secs)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("transcribe-service").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("srt".parse::<OutputFormat>().unwrap(), OutputFormat::Srt);
        assert_eq!("txt".parse::<OutputFormat>().unwrap(), OutputFormat::Txt);
        assert!("vtt".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_speed_factor, 2.0);
        assert_eq!(config.concurrent_chunks, 4);
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_validate_missing_api_key() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_with_api_key() {
        let mut config = Config::default();
        config.transcription_api_key = Some("test-key".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_file_size_bytes() {
        let config = Config::default();
        assert_eq!(config.max_file_size_bytes(), 500 * 1024 * 1024);
    }
}
