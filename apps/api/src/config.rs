use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub gemini_api_key: String,
    /// QStash REST base, e.g. https://qstash.upstash.io
    pub qstash_url: String,
    pub qstash_token: String,
    /// Current + next signing keys: both are accepted during key rotation.
    pub qstash_current_signing_key: String,
    pub qstash_next_signing_key: String,
    /// Public base URL of this API; the queue calls back to {api_url}/jdmatch/consumer.
    pub api_url: String,
    /// Gotenberg-style doc-to-pdf conversion service base URL.
    pub doc_to_pdf_api_url: String,
    /// Local directory where acquired resumes are staged for the scoring call.
    pub upload_dir: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            gemini_api_key: require_env("GEMINI_API_KEY")?,
            qstash_url: std::env::var("QSTASH_URL")
                .unwrap_or_else(|_| "https://qstash.upstash.io".to_string()),
            qstash_token: require_env("QSTASH_TOKEN")?,
            qstash_current_signing_key: require_env("QSTASH_CURRENT_SIGNING_KEY")?,
            qstash_next_signing_key: require_env("QSTASH_NEXT_SIGNING_KEY")?,
            api_url: require_env("API_URL")?,
            doc_to_pdf_api_url: require_env("DOC_TO_PDF_API_URL")?,
            upload_dir: std::env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "public/uploads".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
