use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::error::PipelineError;

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let ApiError::Pipeline(error) = self;
        match error {
            PipelineError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::NotFound { .. } => StatusCode::NOT_FOUND,
            PipelineError::InvalidState { .. } | PipelineError::DuplicateDate { .. } => {
                StatusCode::CONFLICT
            }
            PipelineError::InsufficientPool { .. } | PipelineError::NoApprovedQuestions { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PipelineError::Generation { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        let ApiError::Pipeline(error) = self;
        error.kind()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), kind = self.kind(), error = %self, "request failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;
    use uuid::Uuid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 20).expect("valid date")
    }

    #[rstest]
    #[case(PipelineError::validation("empty"), StatusCode::UNPROCESSABLE_ENTITY)]
    #[case(PipelineError::NotFound { entity: "question", id: Uuid::nil() }, StatusCode::NOT_FOUND)]
    #[case(
        PipelineError::InvalidState {
            entity: "question",
            id: Uuid::nil(),
            status: "published".to_string(),
            action: "review",
        },
        StatusCode::CONFLICT
    )]
    #[case(
        PipelineError::DuplicateDate {
            date: date(),
            question_id: Uuid::nil(),
            existing_challenge_id: Uuid::nil(),
            existing_question_id: Uuid::nil(),
        },
        StatusCode::CONFLICT
    )]
    #[case(PipelineError::NoApprovedQuestions { date: date() }, StatusCode::SERVICE_UNAVAILABLE)]
    #[case(
        PipelineError::Generation {
            prompt_control_id: Uuid::nil(),
            attempts: 2,
            source: anyhow::anyhow!("timeout"),
        },
        StatusCode::BAD_GATEWAY
    )]
    #[case(
        PipelineError::Store(anyhow::anyhow!("pool closed")),
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    fn pipeline_errors_map_to_status_codes(
        #[case] error: PipelineError,
        #[case] expected: StatusCode,
    ) {
        let response = ApiError::from(error).into_response();
        assert_eq!(response.status(), expected);
    }
}
