//! Submission-side service: identity resolution, acquisition, record
//! creation, and the queue handoff. Everything after the queue boundary
//! lives in the orchestrator.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::jdmatch::acquire::{acquire_resume, UploadedFile};
use crate::jdmatch::identity::resolve_file_id;
use crate::jdmatch::models::MatchJobPayload;
use crate::jdmatch::orchestrator::ProgressEvent;
use crate::jdmatch::status::JobStatus;
use crate::state::AppState;
use crate::storage::stage_local_copy;

/// Handles one match submission end to end up to the queue boundary:
/// resolve identity, acquire and normalize the resume, persist the blob and
/// the durable record, enqueue the work. Returns the job's `file_id`.
///
/// Acquisition and validation errors surface here, before any record
/// exists; the caller gets a synchronous failure and no job is created.
pub async fn submit_match_job(
    state: &AppState,
    upload: Option<UploadedFile>,
    resume_url: Option<String>,
    jd_info: String,
) -> Result<String, AppError> {
    if jd_info.trim().is_empty() {
        return Err(AppError::InvalidInput("jd_info must not be empty".to_string()));
    }

    let file_id = resolve_file_id(resume_url.as_deref());
    info!(%file_id, "Starting match submission");

    // Transient pre-record status so early pollers see PARSING.
    state
        .statuses
        .set_status(&file_id, JobStatus::Parsing)
        .await?;

    let acquired = acquire_resume(
        upload,
        resume_url.as_deref(),
        &state.http,
        state.converter.as_ref(),
    )
    .await?;

    // Content-addressed key: concurrent re-submission of the same file can
    // never clobber another job's bytes.
    let storage_key = format!("{file_id}-{}", acquired.file_name);

    let resume_location = state
        .blob
        .upload(&storage_key, acquired.bytes.clone())
        .await?;

    let staged = stage_local_copy(&state.config.upload_dir, &storage_key, &acquired.bytes).await?;

    state
        .records
        .create(&file_id, &acquired.file_name, &resume_location, &jd_info)
        .await?;

    let payload = MatchJobPayload {
        file_id: file_id.clone(),
        file_name: storage_key,
        candidate_resume_path: staged.to_string_lossy().into_owned(),
        jd_info,
    };

    // The durable record now exists. An unpublished job gets no webhook, so
    // a failure past this point must not strand the record at PARSING.
    if let Err(e) = enqueue(state, &file_id, &payload).await {
        fail_submitted_job(state, &file_id).await;
        return Err(e);
    }

    info!(%file_id, "Match job enqueued");
    Ok(file_id)
}

/// Hands the job to the queue, then flushes QUEUED durable-first.
async fn enqueue(
    state: &AppState,
    file_id: &str,
    payload: &MatchJobPayload,
) -> Result<(), AppError> {
    let target_url = format!("{}/jdmatch/consumer", state.config.api_url);
    state.qstash.publish_json(&target_url, payload).await?;

    state.records.update_status(file_id, JobStatus::Queued).await?;
    state.statuses.set_status(file_id, JobStatus::Queued).await?;
    Ok(())
}

/// Best-effort FAILED transition for a job whose queue handoff failed; flush
/// failures are logged so the original error still reaches the submitter.
async fn fail_submitted_job(state: &AppState, file_id: &str) {
    if let Err(e) = state.records.update_status(file_id, JobStatus::Failed).await {
        warn!(%file_id, "Failed to persist FAILED status: {e}");
    }
    if let Err(e) = state.statuses.set_status(file_id, JobStatus::Failed).await {
        warn!(%file_id, "Failed to cache FAILED status: {e}");
    }
}

/// Webhook-side processing: runs the orchestrator to completion, draining
/// progress events (nobody streams them on this path). The error, if any,
/// propagates to the handler so the queue sees a failure response and
/// redelivers per its own policy.
pub async fn consume_match_job(
    state: &AppState,
    payload: &MatchJobPayload,
) -> Result<(), AppError> {
    let (tx, mut rx) = mpsc::channel::<ProgressEvent>(64);
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let result = state.orchestrator.run(&payload.file_id, &tx).await;
    drop(tx);
    let _ = drain.await;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::jdmatch::convert::DocConverter;
    use crate::jdmatch::models::{JdVerification, MatchJobRow, ScoreResult};
    use crate::jdmatch::orchestrator::AnalysisOrchestrator;
    use crate::jdmatch::repo::RecordStore;
    use crate::jdmatch::status_store::StatusStore;
    use crate::llm::Analyst;
    use crate::queue::{QstashClient, QstashReceiver};
    use crate::storage::BlobStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use futures::stream::BoxStream;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    struct InMemoryRecords {
        jobs: Mutex<HashMap<String, MatchJobRow>>,
    }

    impl InMemoryRecords {
        fn new() -> Self {
            Self {
                jobs: Mutex::new(HashMap::new()),
            }
        }

        fn jobs(&self) -> Vec<MatchJobRow> {
            self.jobs.lock().unwrap().values().cloned().collect()
        }
    }

    #[async_trait]
    impl RecordStore for InMemoryRecords {
        async fn create(
            &self,
            file_id: &str,
            file_name: &str,
            resume_location: &str,
            jd: &str,
        ) -> Result<MatchJobRow, AppError> {
            let row = MatchJobRow {
                id: Uuid::new_v4(),
                file_id: file_id.to_string(),
                file_name: file_name.to_string(),
                resume_location: resume_location.to_string(),
                jd: Some(jd.to_string()),
                status_label: JobStatus::Parsing.as_str().to_string(),
                score: None,
                matching_skills: None,
                missing_skills: None,
                explanation: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.jobs
                .lock()
                .unwrap()
                .insert(file_id.to_string(), row.clone());
            Ok(row)
        }

        async fn get_by_file_id(&self, file_id: &str) -> Result<Option<MatchJobRow>, AppError> {
            Ok(self.jobs.lock().unwrap().get(file_id).cloned())
        }

        async fn update_status(&self, file_id: &str, status: JobStatus) -> Result<(), AppError> {
            if let Some(job) = self.jobs.lock().unwrap().get_mut(file_id) {
                job.status_label = status.as_str().to_string();
                job.updated_at = Utc::now();
            }
            Ok(())
        }

        async fn save_score(&self, _file_id: &str, _score: &ScoreResult) -> Result<(), AppError> {
            Ok(())
        }
    }

    struct InMemoryStatuses {
        statuses: Mutex<HashMap<String, JobStatus>>,
    }

    impl InMemoryStatuses {
        fn new() -> Self {
            Self {
                statuses: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl StatusStore for InMemoryStatuses {
        async fn set_status(&self, file_id: &str, status: JobStatus) -> Result<(), AppError> {
            self.statuses
                .lock()
                .unwrap()
                .insert(file_id.to_string(), status);
            Ok(())
        }

        async fn get_status(&self, file_id: &str) -> Result<Option<JobStatus>, AppError> {
            Ok(self.statuses.lock().unwrap().get(file_id).copied())
        }

        async fn set_result(&self, _file_id: &str, _result_json: &str) -> Result<(), AppError> {
            Ok(())
        }

        async fn get_result(&self, _file_id: &str) -> Result<Option<String>, AppError> {
            Ok(None)
        }
    }

    struct FakeBlob;

    #[async_trait]
    impl BlobStore for FakeBlob {
        async fn upload(&self, key: &str, _bytes: Vec<u8>) -> Result<String, AppError> {
            Ok(format!("https://blobs.test/{key}"))
        }
    }

    struct FakeConverter;

    #[async_trait]
    impl DocConverter for FakeConverter {
        async fn to_pdf(&self, _path: &Path) -> Result<Vec<u8>, AppError> {
            Ok(b"%PDF".to_vec())
        }
    }

    /// Submission never reaches the analysis collaborators.
    struct NoopAnalyst;

    #[async_trait]
    impl Analyst for NoopAnalyst {
        async fn verify_jd(&self, _text: &str) -> Result<JdVerification, AppError> {
            Err(AppError::Llm("not used on this path".to_string()))
        }

        async fn extract_jd(&self, _url: &str) -> Result<String, AppError> {
            Err(AppError::Llm("not used on this path".to_string()))
        }

        async fn score_resume(
            &self,
            _jd: &str,
            _resume_path: &str,
        ) -> Result<BoxStream<'static, Result<String, AppError>>, AppError> {
            Err(AppError::Llm("not used on this path".to_string()))
        }
    }

    struct Harness {
        state: AppState,
        records: Arc<InMemoryRecords>,
        statuses: Arc<InMemoryStatuses>,
        _upload_dir: tempfile::TempDir,
    }

    /// Full submission state with in-memory stores; the queue URL points at
    /// a closed local port so every publish fails with a connection error.
    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_url: String::new(),
            redis_url: String::new(),
            s3_bucket: "resumes".to_string(),
            s3_endpoint: String::new(),
            aws_access_key_id: String::new(),
            aws_secret_access_key: String::new(),
            gemini_api_key: String::new(),
            qstash_url: "http://127.0.0.1:1".to_string(),
            qstash_token: "test-token".to_string(),
            qstash_current_signing_key: "k1".to_string(),
            qstash_next_signing_key: "k2".to_string(),
            api_url: "http://localhost:8080".to_string(),
            doc_to_pdf_api_url: "http://localhost:3000".to_string(),
            upload_dir: dir.path().to_string_lossy().into_owned(),
            port: 8080,
            rust_log: "info".to_string(),
        };

        let records = Arc::new(InMemoryRecords::new());
        let statuses = Arc::new(InMemoryStatuses::new());
        let orchestrator = Arc::new(AnalysisOrchestrator::new(
            records.clone(),
            statuses.clone(),
            Arc::new(NoopAnalyst),
            config.upload_dir.clone(),
        ));

        let state = AppState {
            records: records.clone(),
            statuses: statuses.clone(),
            blob: Arc::new(FakeBlob),
            converter: Arc::new(FakeConverter),
            orchestrator,
            qstash: QstashClient::new(config.qstash_url.clone(), config.qstash_token.clone()),
            receiver: QstashReceiver::new(
                config.qstash_current_signing_key.clone(),
                config.qstash_next_signing_key.clone(),
            ),
            http: reqwest::Client::new(),
            config,
        };

        Harness {
            state,
            records,
            statuses,
            _upload_dir: dir,
        }
    }

    fn pdf_upload() -> UploadedFile {
        UploadedFile {
            file_name: "resume.pdf".to_string(),
            bytes: b"%PDF".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_unreachable_queue_fails_the_created_job() {
        let h = harness();

        let result =
            submit_match_job(&h.state, Some(pdf_upload()), None, "Backend engineer".to_string())
                .await;
        assert!(matches!(result, Err(AppError::Queue(_))));

        // The durable record exists but must not be left at PARSING: nothing
        // would ever move it again, since no webhook was published.
        let jobs = h.records.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status(), Some(JobStatus::Failed));
        assert_eq!(
            h.statuses.get_status(&jobs[0].file_id).await.unwrap(),
            Some(JobStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_empty_jd_is_rejected_before_any_record_exists() {
        let h = harness();

        let result = submit_match_job(&h.state, Some(pdf_upload()), None, "   ".to_string()).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert!(h.records.jobs().is_empty());
    }
}
