//! Durable match-record store. Postgres is the source of truth for a job;
//! the Redis status store is a derived cache written after each durable write.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::errors::AppError;
use crate::jdmatch::models::{MatchJobRow, ScoreResult};
use crate::jdmatch::status::JobStatus;

/// MatchRecordStore seam. Every mutation refreshes `updated_at`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(
        &self,
        file_id: &str,
        file_name: &str,
        resume_location: &str,
        jd: &str,
    ) -> Result<MatchJobRow, AppError>;

    async fn get_by_file_id(&self, file_id: &str) -> Result<Option<MatchJobRow>, AppError>;

    async fn update_status(&self, file_id: &str, status: JobStatus) -> Result<(), AppError>;

    /// Terminal MATCHED write: persists all score fields and the status in
    /// one statement, so the field-presence invariant (all present iff
    /// MATCHED) holds at every observable point.
    async fn save_score(&self, file_id: &str, score: &ScoreResult) -> Result<(), AppError>;
}

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn create(
        &self,
        file_id: &str,
        file_name: &str,
        resume_location: &str,
        jd: &str,
    ) -> Result<MatchJobRow, AppError> {
        let row = sqlx::query_as::<_, MatchJobRow>(
            r#"
            INSERT INTO jd_match_dtl (file_id, file_name, resume_location, jd, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(file_id)
        .bind(file_name)
        .bind(resume_location)
        .bind(jd)
        .bind(JobStatus::Parsing.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_by_file_id(&self, file_id: &str) -> Result<Option<MatchJobRow>, AppError> {
        let row = sqlx::query_as::<_, MatchJobRow>(
            "SELECT * FROM jd_match_dtl WHERE file_id = $1",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update_status(&self, file_id: &str, status: JobStatus) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE jd_match_dtl SET status = $1, updated_at = now() WHERE file_id = $2",
        )
        .bind(status.as_str())
        .bind(file_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_score(&self, file_id: &str, score: &ScoreResult) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE jd_match_dtl
            SET status = $1,
                score = $2,
                matching_skills = $3,
                missing_skills = $4,
                explanation = $5,
                updated_at = now()
            WHERE file_id = $6
            "#,
        )
        .bind(JobStatus::Matched.as_str())
        .bind(score.score)
        .bind(serde_json::json!(score.matching_skills))
        .bind(serde_json::json!(score.missing_skills))
        .bind(&score.explanation)
        .bind(file_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
