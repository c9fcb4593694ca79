//! Axum route handlers for the JD-match API.

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::info;

use crate::errors::AppError;
use crate::jdmatch::acquire::UploadedFile;
use crate::jdmatch::models::{MatchJobPayload, MatchJobRow};
use crate::jdmatch::orchestrator::ProgressEvent;
use crate::jdmatch::service::{consume_match_job, submit_match_job};
use crate::jdmatch::status::JobStatus;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SubmitResponse {
    pub file_id: String,
}

/// POST /jdmatch
///
/// Multipart form: optional `resume_file`, optional `resume_url`, required
/// `jd_info`. Returns 202 with the job's `file_id`; the analysis itself runs
/// later, off the request path, once the queue calls back.
pub async fn handle_submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let mut upload: Option<UploadedFile> = None;
    let mut resume_url: Option<String> = None;
    let mut jd_info: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("resume_file") => {
                let file_name = field
                    .file_name()
                    .unwrap_or("uploaded_resume.pdf")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidInput(e.to_string()))?;
                upload = Some(UploadedFile {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            Some("resume_url") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(e.to_string()))?;
                if !value.trim().is_empty() {
                    resume_url = Some(value);
                }
            }
            Some("jd_info") => {
                jd_info = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::InvalidInput(e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let jd_info =
        jd_info.ok_or_else(|| AppError::InvalidInput("jd_info is required".to_string()))?;

    let file_id = submit_match_job(&state, upload, resume_url, jd_info).await?;

    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { file_id })))
}

/// POST /jdmatch/consumer
///
/// Webhook invoked by the queue. The signature check runs against the raw
/// body before anything is deserialized; an unverified body is never trusted.
pub async fn handle_consumer(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = headers
        .get("Upstash-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::SignatureInvalid)?;

    state.receiver.verify(&body, signature)?;

    let payload: MatchJobPayload =
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidInput(e.to_string()))?;

    info!(file_id = %payload.file_id, "Webhook delivery verified");

    consume_match_job(&state, &payload).await?;

    Ok(Json(json!({ "status": "received", "payload": payload })))
}

/// GET /jdmatch/:file_id/status
///
/// Polling endpoint backed by the status cache, falling back to the durable
/// record when the cache entry has expired.
pub async fn handle_status(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(status) = state.statuses.get_status(&file_id).await? {
        // A MATCHED poll also gets the cached score, sparing the durable read.
        if status == JobStatus::Matched {
            if let Some(cached) = state.statuses.get_result(&file_id).await? {
                if let Ok(result) = serde_json::from_str::<serde_json::Value>(&cached) {
                    return Ok(Json(json!({ "status": status, "result": result })));
                }
            }
        }
        return Ok(Json(json!({ "status": status })));
    }

    let job = state
        .records
        .get_by_file_id(&file_id)
        .await?
        .ok_or_else(|| AppError::JobNotFound(file_id.clone()))?;

    let status = job
        .status()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown status label")))?;
    Ok(Json(json!({ "status": status })))
}

/// GET /jdmatch/:file_id
///
/// Returns the full durable record, including the score fields once MATCHED.
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<MatchJobRow>, AppError> {
    let job = state
        .records
        .get_by_file_id(&file_id)
        .await?
        .ok_or_else(|| AppError::JobNotFound(file_id.clone()))?;
    Ok(Json(job))
}

/// POST /jdmatch/:file_id/analyze
///
/// Streaming variant: runs the analysis and emits newline-delimited JSON,
/// one `{"type":"status",...}` or `{"type":"analysis",...}` object per line.
/// Dropping the connection cancels the run (the orchestrator stops once its
/// event channel closes).
pub async fn handle_analyze(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Response, AppError> {
    // Fail fast with a proper status before committing to a stream.
    let job = state
        .records
        .get_by_file_id(&file_id)
        .await?
        .ok_or_else(|| AppError::JobNotFound(file_id.clone()))?;
    if job.jd.as_deref().map_or(true, |jd| jd.trim().is_empty()) {
        return Err(AppError::JdMissing(file_id));
    }

    let (tx, rx) = mpsc::channel::<ProgressEvent>(32);
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        // Errors already flushed FAILED to both stores and emitted the event.
        let _ = orchestrator.run(&file_id, &tx).await;
    });

    let lines = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .map(|event| {
        let mut line = serde_json::to_string(&event).unwrap_or_default();
        line.push('\n');
        Ok::<_, std::convert::Infallible>(Bytes::from(line))
    });

    let response = (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response();
    Ok(response)
}
