//! パイプライン操作のエラー分類。
//!
//! 各バリアントはオペレーターがログを追わずに対処できるよう、
//! 対象の ID・日付・現在のステータスを保持する。

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("cannot {action} {entity} {id} while it is {status}")]
    InvalidState {
        entity: &'static str,
        id: Uuid,
        status: String,
        action: &'static str,
    },

    #[error(
        "challenge date {date} is already taken by challenge {existing_challenge_id} \
         (question {existing_question_id}); question {question_id} was not published"
    )]
    DuplicateDate {
        date: NaiveDate,
        question_id: Uuid,
        existing_challenge_id: Uuid,
        existing_question_id: Uuid,
    },

    #[error("no approved questions available for {open_dates} open date(s) starting {window_start}")]
    InsufficientPool {
        window_start: NaiveDate,
        open_dates: usize,
    },

    #[error("no approved questions available to publish for {date}")]
    NoApprovedQuestions { date: NaiveDate },

    #[error("generation failed for prompt control {prompt_control_id} after {attempts} attempt(s): {source:#}")]
    Generation {
        prompt_control_id: Uuid,
        attempts: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl PipelineError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// API レスポンスやメトリクスラベルに使う安定したエラー種別名。
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::DuplicateDate { .. } => "duplicate_date",
            Self::InsufficientPool { .. } => "insufficient_pool",
            Self::NoApprovedQuestions { .. } => "no_approved_questions",
            Self::Generation { .. } => "generation_gateway_error",
            Self::Store(_) => "store_error",
        }
    }

    /// プール枯渇系のエラーかどうか。生成による自己回復の対象になる。
    #[must_use]
    pub fn is_pool_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::InsufficientPool { .. } | Self::NoApprovedQuestions { .. }
        )
    }
}
