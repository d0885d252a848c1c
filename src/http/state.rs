use crate::config::Config;
use crate::transcribe::Transcriber;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Shared application state, cloned into every handler the way the `porua`
/// reference server clones its pool/api-keys state through an extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub transcriber: Arc<dyn Transcriber>,
    pub job_admission: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: Arc<Config>, transcriber: Arc<dyn Transcriber>) -> Self {
        let job_admission = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            config,
            transcriber,
            job_admission,
        }
    }
}
