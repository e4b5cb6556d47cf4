//! 承認済みの問題を日付のチャレンジとして公開する。
//!
//! 日付の一意性はストアの `publish_for_date` が原子的に保証する。
//! ここでは結果をエラー分類とメトリクスに落とし込む。

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::observability::metrics::Metrics;
use crate::store::dao::{ContentStore, PublishAttempt};
use crate::store::models::Challenge;

/// `publish_today` が一度に読む候補数。使い切ったらストアから読み直す。
const TODAY_CANDIDATES: usize = 5;

/// プール先頭から `limit` 件の問題 ID を読む。`skipped` に入っている ID は除く。
///
/// 並行した管理操作で候補が消費されても、呼び出し側はこれを読み直して
/// ストアが空を返すまで続けられる。
pub(super) async fn pool_candidates(
    store: &dyn ContentStore,
    limit: usize,
    skipped: &HashSet<Uuid>,
) -> Result<VecDeque<Uuid>, PipelineError> {
    let candidates = store
        .list_pool(limit.saturating_add(skipped.len()))
        .await?
        .into_iter()
        .map(|question| question.id)
        .filter(|id| !skipped.contains(id))
        .take(limit)
        .collect();
    Ok(candidates)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Publication {
    pub challenge: Challenge,
    /// `false` when the call found an existing challenge instead of creating one.
    pub created: bool,
}

pub struct PublicationService {
    store: Arc<dyn ContentStore>,
    metrics: Arc<Metrics>,
}

impl PublicationService {
    pub fn new(store: Arc<dyn ContentStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    /// 問題を `date` のチャレンジとして公開する。同じ (問題, 日付) の再実行は既存を返す。
    pub async fn publish_for_date(
        &self,
        question_id: Uuid,
        date: NaiveDate,
    ) -> Result<Publication, PipelineError> {
        match self.store.publish_for_date(question_id, date).await? {
            PublishAttempt::Created(challenge) => {
                self.metrics.challenges_published.inc();
                info!(
                    challenge_id = %challenge.id,
                    %question_id,
                    %date,
                    "challenge published"
                );
                Ok(Publication {
                    challenge,
                    created: true,
                })
            }
            PublishAttempt::AlreadyPublished(challenge) => Ok(Publication {
                challenge,
                created: false,
            }),
            PublishAttempt::DateTaken(existing) => {
                self.metrics.duplicate_date_conflicts.inc();
                warn!(
                    %question_id,
                    %date,
                    existing_challenge_id = %existing.id,
                    existing_question_id = %existing.question_id,
                    "date already has an active challenge"
                );
                Err(PipelineError::DuplicateDate {
                    date,
                    question_id,
                    existing_challenge_id: existing.id,
                    existing_question_id: existing.question_id,
                })
            }
            PublishAttempt::QuestionMissing => Err(PipelineError::NotFound {
                entity: "question",
                id: question_id,
            }),
            PublishAttempt::QuestionNotPublishable(question) => Err(PipelineError::InvalidState {
                entity: "question",
                id: question_id,
                status: question.status.to_string(),
                action: "publish",
            }),
        }
    }

    /// 今日のチャレンジが既にあればそれを返し、なければプール先頭の問題を公開する。
    pub async fn publish_today(&self, today: NaiveDate) -> Result<Publication, PipelineError> {
        if let Some(existing) = self.store.active_challenge_for(today).await? {
            return Ok(Publication {
                challenge: existing,
                created: false,
            });
        }

        let mut skipped = HashSet::new();
        loop {
            let candidates =
                pool_candidates(self.store.as_ref(), TODAY_CANDIDATES, &skipped).await?;
            if candidates.is_empty() {
                return Err(PipelineError::NoApprovedQuestions { date: today });
            }

            for candidate in candidates {
                match self.publish_for_date(candidate, today).await {
                    Ok(publication) => return Ok(publication),
                    // 別の書き込みが先に今日を埋めた
                    Err(PipelineError::DuplicateDate { .. }) => {
                        if let Some(existing) = self.store.active_challenge_for(today).await? {
                            return Ok(Publication {
                                challenge: existing,
                                created: false,
                            });
                        }
                        skipped.insert(candidate);
                    }
                    // 候補が別の日付に使われた
                    Err(PipelineError::InvalidState { .. } | PipelineError::NotFound { .. }) => {
                        skipped.insert(candidate);
                    }
                    Err(other) => return Err(other),
                }
            }
        }
    }

    /// チャレンジを無効化し、その日付を新しい公開のために空ける。
    pub async fn deactivate_challenge(
        &self,
        challenge_id: Uuid,
    ) -> Result<Challenge, PipelineError> {
        let challenge = self
            .store
            .deactivate_challenge(challenge_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "challenge",
                id: challenge_id,
            })?;
        info!(
            %challenge_id,
            date = %challenge.challenge_date,
            "challenge deactivated"
        );
        Ok(challenge)
    }

    pub async fn get_challenge(&self, challenge_id: Uuid) -> Result<Challenge, PipelineError> {
        self.store
            .get_challenge(challenge_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "challenge",
                id: challenge_id,
            })
    }
}
