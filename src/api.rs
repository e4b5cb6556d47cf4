pub(crate) mod challenges;
pub(crate) mod error;
pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod pool;
pub(crate) mod questions;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/questions", post(questions::create_manual))
        .route("/v1/questions/generate", post(questions::generate))
        .route("/v1/questions/{id}", get(questions::get).patch(questions::edit))
        .route("/v1/questions/{id}/review", post(questions::review))
        .route("/v1/questions/{id}/publish", post(questions::publish))
        .route("/v1/challenges/today", post(challenges::publish_today))
        .route("/v1/challenges/{id}", get(challenges::get))
        .route(
            "/v1/challenges/{id}/responses",
            post(challenges::record_response),
        )
        .route("/v1/challenges/{id}/stats", get(challenges::stats))
        .route("/v1/challenges/{id}/deactivate", post(challenges::deactivate))
        .route("/v1/schedule/weekly", post(pool::schedule_weekly))
        .route("/v1/pool/health", get(pool::health))
        .route("/v1/pool/maintain", post(pool::maintain))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
