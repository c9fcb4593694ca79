use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::jdmatch::status::JobStatus;

/// Durable record of one resume-to-JD matching attempt.
///
/// `status` is stored as TEXT; use [`MatchJobRow::status`] to get the
/// canonical enum — the raw string is never a comparison key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MatchJobRow {
    pub id: Uuid,
    pub file_id: String,
    pub file_name: String,
    pub resume_location: String,
    pub jd: Option<String>,
    #[serde(rename = "status")]
    #[sqlx(rename = "status")]
    pub status_label: String,
    pub score: Option<i32>,
    pub matching_skills: Option<Value>,
    pub missing_skills: Option<Value>,
    pub explanation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchJobRow {
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status_label)
    }
}

/// Unit of work handed to the queue and delivered back on the webhook.
///
/// Only `file_id` drives the consumer; the durable record is the source of
/// truth for the JD and the staged resume path, and the orchestrator
/// re-reads it on delivery. The remaining fields make queue delivery logs
/// and the consumer's echo response self-describing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchJobPayload {
    pub file_id: String,
    pub file_name: String,
    /// Local path where the acquired resume bytes were staged for scoring.
    pub candidate_resume_path: String,
    pub jd_info: String,
}

/// Structured output of the scoring collaborator, parsed from the
/// accumulated stream text at the end of the THINKING stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: i32,
    pub matching_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub explanation: String,
}

/// Output of the JD-structure verification collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JdVerification {
    pub is_jd: bool,
    pub reason: String,
}
