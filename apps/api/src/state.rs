use std::sync::Arc;

use crate::config::Config;
use crate::jdmatch::convert::DocConverter;
use crate::jdmatch::orchestrator::AnalysisOrchestrator;
use crate::jdmatch::repo::RecordStore;
use crate::jdmatch::status_store::StatusStore;
use crate::queue::{QstashClient, QstashReceiver};
use crate::storage::BlobStore;

/// Shared application state injected into all route handlers via Axum
/// extractors. Collaborators are constructed once at startup and passed
/// explicitly; nothing reaches for a global client.
#[derive(Clone)]
pub struct AppState {
    pub records: Arc<dyn RecordStore>,
    pub statuses: Arc<dyn StatusStore>,
    pub blob: Arc<dyn BlobStore>,
    pub converter: Arc<dyn DocConverter>,
    /// The orchestrator owns the analysis collaborators (LLM, extraction);
    /// handlers only ever drive it by `file_id`.
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub qstash: QstashClient,
    pub receiver: QstashReceiver,
    /// Client for resume downloads; bounded by a request timeout so a hung
    /// upstream surfaces as AcquisitionFailed instead of stalling the job.
    pub http: reqwest::Client,
    pub config: Config,
}
