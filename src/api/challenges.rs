use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use super::error::ApiError;
use crate::{
    app::AppState,
    scheduler::{JobContext, JobKind, JobOutcome},
};

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseRequest {
    was_correct: bool,
}

/// 今日のチャレンジを公開する。既存があれば 200、新規作成なら 201。
pub(crate) async fn publish_today(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    state.telemetry().record_operator_action("publish_today");
    let report = state
        .scheduler()
        .run_job(JobContext::new(JobKind::DailyPublish))
        .await?;
    let status = match &report.outcome {
        JobOutcome::DailyPublish(daily) if daily.publication.created => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(report)))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let challenge = state.pipeline().get_challenge(challenge_id).await?;
    Ok(Json(challenge))
}

pub(crate) async fn record_response(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    Json(payload): Json<ResponseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .pipeline()
        .record_response(challenge_id, payload.was_correct)
        .await?;
    Ok(Json(stats))
}

pub(crate) async fn stats(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.pipeline().get_stats(challenge_id).await?;
    Ok(Json(stats))
}

pub(crate) async fn deactivate(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.telemetry().record_operator_action("deactivate_challenge");
    let challenge = state.pipeline().deactivate_challenge(challenge_id).await?;
    Ok(Json(challenge))
}
