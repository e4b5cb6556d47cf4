//! コミュニティ回答の集計。カウンタの加算はストア側で1回の更新として行う。

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::observability::metrics::Metrics;
use crate::store::dao::{ContentStore, ResponseUpdate};
use crate::store::models::{Challenge, ResponseCounters};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CommunityStats {
    pub challenge_id: Uuid,
    pub total_responses: i64,
    pub correct_responses: i64,
    pub incorrect_responses: i64,
    pub correct_percentage: f64,
    pub incorrect_percentage: f64,
}

impl CommunityStats {
    /// 回答が0件のときは両方の割合を0とする。
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counters(challenge_id: Uuid, counters: ResponseCounters) -> Self {
        let total = counters.total_responses;
        let correct = counters.correct_responses;
        let incorrect = total - correct;
        let percentage = |part: i64| {
            if total == 0 {
                0.0
            } else {
                part as f64 * 100.0 / total as f64
            }
        };

        Self {
            challenge_id,
            total_responses: total,
            correct_responses: correct,
            incorrect_responses: incorrect,
            correct_percentage: percentage(correct),
            incorrect_percentage: percentage(incorrect),
        }
    }

    fn of(challenge: &Challenge) -> Self {
        Self::from_counters(challenge.id, challenge.counters)
    }
}

pub struct CommunityStatsAggregator {
    store: Arc<dyn ContentStore>,
    metrics: Arc<Metrics>,
}

impl CommunityStatsAggregator {
    pub fn new(store: Arc<dyn ContentStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    pub async fn record_response(
        &self,
        challenge_id: Uuid,
        was_correct: bool,
    ) -> Result<CommunityStats, PipelineError> {
        match self.store.record_response(challenge_id, was_correct).await? {
            ResponseUpdate::Recorded(challenge) => {
                self.metrics.responses_recorded.inc();
                debug!(
                    %challenge_id,
                    was_correct,
                    total = challenge.counters.total_responses,
                    "response recorded"
                );
                Ok(CommunityStats::of(&challenge))
            }
            ResponseUpdate::Inactive(_) => Err(PipelineError::InvalidState {
                entity: "challenge",
                id: challenge_id,
                status: "inactive".to_string(),
                action: "record a response for",
            }),
            ResponseUpdate::Missing => Err(PipelineError::NotFound {
                entity: "challenge",
                id: challenge_id,
            }),
        }
    }

    /// 無効化済みのチャレンジでも集計値は参照できる。
    pub async fn get_stats(&self, challenge_id: Uuid) -> Result<CommunityStats, PipelineError> {
        self.store
            .get_challenge(challenge_id)
            .await?
            .map(|challenge| CommunityStats::of(&challenge))
            .ok_or(PipelineError::NotFound {
                entity: "challenge",
                id: challenge_id,
            })
    }
}
