use axum::{Json, extract::State, response::IntoResponse};

use super::error::ApiError;
use crate::{
    app::AppState,
    scheduler::{JobContext, JobKind},
};

pub(crate) async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let status = state.pipeline().pool_health().await?;
    Ok(Json(status))
}

pub(crate) async fn maintain(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.telemetry().record_operator_action("maintain_pool");
    let report = state
        .scheduler()
        .run_job(JobContext::new(JobKind::PoolMaintenance))
        .await?;
    Ok(Json(report))
}

pub(crate) async fn schedule_weekly(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    state.telemetry().record_operator_action("schedule_weekly");
    let report = state
        .scheduler()
        .run_job(JobContext::new(JobKind::WeeklyBatch))
        .await?;
    Ok(Json(report))
}
