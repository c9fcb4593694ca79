//! Ephemeral status cache keyed by `jdmatch:{file_id}`, read by pollers so
//! they never touch Postgres on the hot path. Best effort: written after the
//! corresponding durable write, no durability guarantee of its own.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::errors::AppError;
use crate::jdmatch::status::JobStatus;

/// Status entries outlive the job by a day, then expire.
const STATUS_TTL_SECS: u64 = 86_400;

#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn set_status(&self, file_id: &str, status: JobStatus) -> Result<(), AppError>;

    async fn get_status(&self, file_id: &str) -> Result<Option<JobStatus>, AppError>;

    /// Caches the serialized score result alongside the MATCHED status so a
    /// poller can fetch the result without a durable read.
    async fn set_result(&self, file_id: &str, result_json: &str) -> Result<(), AppError>;

    async fn get_result(&self, file_id: &str) -> Result<Option<String>, AppError>;
}

pub struct RedisStatusStore {
    client: redis::Client,
}

impl RedisStatusStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    fn status_key(file_id: &str) -> String {
        format!("jdmatch:{file_id}")
    }

    fn result_key(file_id: &str) -> String {
        format!("jdmatch:{file_id}:result")
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn set_status(&self, file_id: &str, status: JobStatus) -> Result<(), AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(Self::status_key(file_id), status.as_str(), STATUS_TTL_SECS)
            .await?;
        Ok(())
    }

    async fn get_status(&self, file_id: &str) -> Result<Option<JobStatus>, AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let label: Option<String> = conn.get(Self::status_key(file_id)).await?;
        Ok(label.as_deref().and_then(JobStatus::parse))
    }

    async fn set_result(&self, file_id: &str, result_json: &str) -> Result<(), AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(Self::result_key(file_id), result_json, STATUS_TTL_SECS)
            .await?;
        Ok(())
    }

    async fn get_result(&self, file_id: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: Option<String> = conn.get(Self::result_key(file_id)).await?;
        Ok(result)
    }
}
