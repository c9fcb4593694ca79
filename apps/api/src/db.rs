use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Ensures the jd_match_dtl table exists. Idempotent; runs at startup.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jd_match_dtl (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            file_id TEXT NOT NULL UNIQUE,
            file_name TEXT NOT NULL,
            resume_location TEXT NOT NULL,
            jd TEXT,
            status TEXT NOT NULL,
            score INTEGER,
            matching_skills JSONB,
            missing_skills JSONB,
            explanation TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jd_match_dtl_file_id ON jd_match_dtl (file_id)")
        .execute(pool)
        .await?;

    info!("Database schema ready");
    Ok(())
}
