//! Analysis orchestrator: drives one job from QUEUED to a terminal state.
//!
//! Stages run strictly sequentially; every stage completion is flushed to the
//! durable record store first and the status store second, so a poller never
//! observes a status ahead of durable truth. Any failure after the job exists
//! transitions it to FAILED in both stores before the error is re-raised to
//! the webhook caller.

use std::path::Path;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::jdmatch::classify::is_jd_link;
use crate::jdmatch::models::{MatchJobRow, ScoreResult};
use crate::jdmatch::repo::RecordStore;
use crate::jdmatch::status::JobStatus;
use crate::jdmatch::status_store::StatusStore;
use crate::llm::{strip_json_fences, Analyst};
use crate::storage::cleanup_local_copy;

/// One increment of the streamed analysis: a status transition or a text
/// chunk of the in-progress score JSON. Serialized as one NDJSON line each.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Status { status: JobStatus },
    Analysis { chunk: String },
}

pub struct AnalysisOrchestrator {
    records: Arc<dyn RecordStore>,
    statuses: Arc<dyn StatusStore>,
    analyst: Arc<dyn Analyst>,
    upload_dir: String,
}

impl AnalysisOrchestrator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        statuses: Arc<dyn StatusStore>,
        analyst: Arc<dyn Analyst>,
        upload_dir: String,
    ) -> Self {
        Self {
            records,
            statuses,
            analyst,
            upload_dir,
        }
    }

    /// Runs the full analysis for `file_id`, emitting progress events into
    /// `events`. Returns the pipeline outcome so the webhook handler can map
    /// it to an HTTP status (the queue retries on failure responses).
    ///
    /// A closed `events` receiver is treated as cancellation: the run stops
    /// without marking the job FAILED, and the queue's redelivery picks the
    /// job up again.
    pub async fn run(
        &self,
        file_id: &str,
        events: &mpsc::Sender<ProgressEvent>,
    ) -> Result<(), AppError> {
        let job = self
            .records
            .get_by_file_id(file_id)
            .await?
            .ok_or_else(|| AppError::JobNotFound(file_id.to_string()))?;

        // Idempotent consumer: the queue is at-least-once, so a duplicate
        // delivery for a terminal job must be a no-op.
        if job.status().is_some_and(|s| s.is_terminal()) {
            info!(%file_id, "Job already terminal; skipping duplicate delivery");
            return Ok(());
        }

        // A job without a JD can never succeed; fail it so the queue's
        // redelivery stops retrying instead of looping at QUEUED.
        let Some(jd) = job.jd.clone().filter(|jd| !jd.trim().is_empty()) else {
            let e = AppError::JdMissing(file_id.to_string());
            error!(%file_id, "Analysis failed: {e}");
            self.mark_failed(file_id, events).await;
            return Err(e);
        };

        match self.drive(&job, &jd, events).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(%file_id, "Analysis failed: {e}");
                self.mark_failed(file_id, events).await;
                Err(e)
            }
        }
    }

    /// The staged pipeline proper. Every `Err` from here is translated to a
    /// FAILED transition by `run`.
    async fn drive(
        &self,
        job: &MatchJobRow,
        jd: &str,
        events: &mpsc::Sender<ProgressEvent>,
    ) -> Result<(), AppError> {
        let file_id = &job.file_id;

        // Stage: classify the JD and branch.
        let link = is_jd_link(jd);
        let stage = if link {
            JobStatus::Extracting
        } else {
            JobStatus::Analyzing
        };
        self.flush_status(file_id, stage).await?;
        if !emit(events, ProgressEvent::Status { status: stage }).await {
            return Ok(());
        }

        let jd_text = if link {
            info!(%file_id, "Extracting JD from {jd}");
            self.analyst.extract_jd(jd).await?
        } else {
            let verification = self.analyst.verify_jd(jd).await?;
            if !verification.is_jd {
                return Err(AppError::NotAJobDescription(verification.reason));
            }
            jd.to_string()
        };

        // Stage: score the resume against the JD.
        self.flush_status(file_id, JobStatus::Thinking).await?;
        if !emit(
            events,
            ProgressEvent::Status {
                status: JobStatus::Thinking,
            },
        )
        .await
        {
            return Ok(());
        }

        let resume_path = self.staged_resume_path(job);
        let stream = self.analyst.score_resume(&jd_text, &resume_path).await?;
        let Some(accumulated) = forward_chunks(stream, events).await? else {
            return Ok(()); // consumer went away mid-stream
        };

        let score = parse_score(&accumulated)?;
        info!(%file_id, score = score.score, "Candidate scored");

        // Terminal MATCHED flush: durable record first, then the cache.
        self.records.save_score(file_id, &score).await?;
        self.statuses
            .set_status(file_id, JobStatus::Matched)
            .await?;
        if let Ok(json) = serde_json::to_string(&score) {
            self.statuses.set_result(file_id, &json).await?;
        }
        emit(
            events,
            ProgressEvent::Status {
                status: JobStatus::Matched,
            },
        )
        .await;

        cleanup_local_copy(&resume_path).await;
        Ok(())
    }

    /// Durable write first, cache second.
    async fn flush_status(&self, file_id: &str, status: JobStatus) -> Result<(), AppError> {
        self.records.update_status(file_id, status).await?;
        self.statuses.set_status(file_id, status).await?;
        Ok(())
    }

    /// Best-effort FAILED transition; flush failures here are logged, not
    /// propagated, so the original error reaches the caller.
    async fn mark_failed(&self, file_id: &str, events: &mpsc::Sender<ProgressEvent>) {
        if let Err(e) = self.records.update_status(file_id, JobStatus::Failed).await {
            warn!(%file_id, "Failed to persist FAILED status: {e}");
        }
        if let Err(e) = self.statuses.set_status(file_id, JobStatus::Failed).await {
            warn!(%file_id, "Failed to cache FAILED status: {e}");
        }
        emit(
            events,
            ProgressEvent::Status {
                status: JobStatus::Failed,
            },
        )
        .await;
    }

    /// Local staging path for the resume, content-addressed by
    /// `{file_id}-{filename}` so concurrent jobs never collide.
    fn staged_resume_path(&self, job: &MatchJobRow) -> String {
        Path::new(&self.upload_dir)
            .join(format!("{}-{}", job.file_id, job.file_name))
            .to_string_lossy()
            .into_owned()
    }
}

/// Sends an event; returns false if the consumer is gone.
async fn emit(events: &mpsc::Sender<ProgressEvent>, event: ProgressEvent) -> bool {
    events.send(event).await.is_ok()
}

/// Pass-through chunk forwarding: each collaborator chunk is re-emitted
/// immediately while being accumulated. Returns `None` on consumer
/// disconnect, the accumulated text on completion.
async fn forward_chunks(
    mut stream: BoxStream<'static, Result<String, AppError>>,
    events: &mpsc::Sender<ProgressEvent>,
) -> Result<Option<String>, AppError> {
    let mut accumulated = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        accumulated.push_str(&chunk);
        if !emit(events, ProgressEvent::Analysis { chunk }).await {
            return Ok(None);
        }
    }
    Ok(Some(accumulated))
}

fn parse_score(accumulated: &str) -> Result<ScoreResult, AppError> {
    serde_json::from_str(strip_json_fences(accumulated))
        .map_err(|e| AppError::ScoreParseFailed(e.to_string()))
}
