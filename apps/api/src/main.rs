mod config;
mod db;
mod errors;
mod jdmatch;
mod llm;
mod queue;
mod routes;
mod state;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use axum::extract::DefaultBodyLimit;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{create_pool, init_schema};
use crate::jdmatch::convert::HttpDocConverter;
use crate::jdmatch::orchestrator::AnalysisOrchestrator;
use crate::jdmatch::repo::PgRecordStore;
use crate::jdmatch::status_store::RedisStatusStore;
use crate::llm::GeminiClient;
use crate::queue::{QstashClient, QstashReceiver};
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::S3BlobStore;

/// Resume uploads above this are rejected at the body-limit layer.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting jdmatch API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let pool = create_pool(&config.database_url).await?;
    init_schema(&pool).await?;
    let records = Arc::new(PgRecordStore::new(pool));

    // Initialize Redis status cache
    let redis = redis::Client::open(config.redis_url.clone())?;
    let statuses = Arc::new(RedisStatusStore::new(redis));
    info!("Redis client initialized");

    // Initialize S3 / MinIO blob storage
    let s3 = build_s3_client(&config).await;
    let blob = Arc::new(S3BlobStore::new(s3, config.s3_bucket.clone()));
    info!("S3 client initialized");

    // Initialize LLM client
    let analyst = Arc::new(GeminiClient::new(config.gemini_api_key.clone()));
    info!("LLM client initialized (model: {})", llm::MODEL);

    // Initialize the doc-to-pdf conversion collaborator
    let converter = Arc::new(HttpDocConverter::new(config.doc_to_pdf_api_url.clone()));

    // Initialize queue publish + webhook verification
    let qstash = QstashClient::new(config.qstash_url.clone(), config.qstash_token.clone());
    let receiver = QstashReceiver::new(
        config.qstash_current_signing_key.clone(),
        config.qstash_next_signing_key.clone(),
    );

    let orchestrator = Arc::new(AnalysisOrchestrator::new(
        records.clone(),
        statuses.clone(),
        analyst.clone(),
        config.upload_dir.clone(),
    ));

    // Download client with a bounded request timeout; follows redirects.
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()?;

    // Build app state
    let state = AppState {
        records,
        statuses,
        blob,
        converter,
        orchestrator,
        qstash,
        receiver,
        http,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "jdmatch-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
