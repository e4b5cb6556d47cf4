use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::error::ApiError;
use crate::{
    app::AppState,
    pipeline::ManualQuestion,
    store::models::{QuestionEdit, ReviewDecision},
};

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateQuestionRequest {
    prompt_control_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    decision: ReviewDecision,
    reviewer_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PublishRequest {
    date: NaiveDate,
}

pub(crate) async fn generate(
    State(state): State<AppState>,
    Json(payload): Json<GenerateQuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.telemetry().record_operator_action("generate_question");
    let outcome = state
        .pipeline()
        .generate_one(payload.prompt_control_id)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub(crate) async fn create_manual(
    State(state): State<AppState>,
    Json(payload): Json<ManualQuestion>,
) -> Result<impl IntoResponse, ApiError> {
    state.telemetry().record_operator_action("create_manual_question");
    let question = state.pipeline().create_manual_question(payload).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(question_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let question = state.pipeline().get_question(question_id).await?;
    Ok(Json(question))
}

pub(crate) async fn review(
    State(state): State<AppState>,
    Path(question_id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.telemetry().record_operator_action("review_question");
    let question = state
        .pipeline()
        .review_question(question_id, payload.decision, &payload.reviewer_id)
        .await?;
    Ok(Json(question))
}

pub(crate) async fn edit(
    State(state): State<AppState>,
    Path(question_id): Path<Uuid>,
    Json(payload): Json<QuestionEdit>,
) -> Result<impl IntoResponse, ApiError> {
    state.telemetry().record_operator_action("edit_question");
    let question = state.pipeline().edit_question(question_id, &payload).await?;
    Ok(Json(question))
}

pub(crate) async fn publish(
    State(state): State<AppState>,
    Path(question_id): Path<Uuid>,
    Json(payload): Json<PublishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.telemetry().record_operator_action("publish_question");
    let publication = state
        .pipeline()
        .publish_question(question_id, payload.date)
        .await?;
    let status = if publication.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(publication)))
}
