pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::jdmatch::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/jdmatch", post(handlers::handle_submit))
        .route("/jdmatch/consumer", post(handlers::handle_consumer))
        .route("/jdmatch/:file_id", get(handlers::handle_get_job))
        .route("/jdmatch/:file_id/status", get(handlers::handle_status))
        .route("/jdmatch/:file_id/analyze", post(handlers::handle_analyze))
        .with_state(state)
}
