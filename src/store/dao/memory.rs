//! In-process `ContentStore` backed by a mutex-guarded map.
//!
//! Every trait method takes the lock once, so each call is atomic in the same
//! way a single transaction is for the Postgres store.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use super::{ContentStore, PublishAttempt, ResponseUpdate};
use crate::store::models::{
    Challenge, NewQuestion, PromptControl, Question, QuestionEdit, QuestionStatus,
    ResponseCounters, challenge_external_id,
};

#[derive(Debug, Default)]
struct MemoryState {
    questions: HashMap<Uuid, Question>,
    challenges: HashMap<Uuid, Challenge>,
    prompt_controls: HashMap<Uuid, PromptControl>,
}

impl MemoryState {
    fn active_challenge_on(&self, date: NaiveDate) -> Option<&Challenge> {
        self.challenges
            .values()
            .find(|challenge| challenge.is_active && challenge.challenge_date == date)
    }
}

#[derive(Debug, Default)]
pub struct MemoryContentStore {
    state: Mutex<MemoryState>,
}

impl MemoryContentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// プロンプト設定はパイプラインからは読み取り専用なので、投入はここからだけ行う。
    pub fn upsert_prompt_control(&self, control: PromptControl) -> Result<()> {
        self.lock()?.prompt_controls.insert(control.id, control);
        Ok(())
    }

    /// 全問題のスナップショット（作成順）
    pub fn questions(&self) -> Result<Vec<Question>> {
        let mut questions: Vec<Question> = self.lock()?.questions.values().cloned().collect();
        questions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(questions)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory content store mutex poisoned"))
    }
}

/// 信頼度の高い順、同値なら古い順。信頼度のない手動問題は後ろに回す。
pub(crate) fn pool_order(a: &Question, b: &Question) -> Ordering {
    let by_confidence = match (a.confidence(), b.confidence()) {
        (Some(left), Some(right)) => right.total_cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_confidence
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn insert_question(&self, question: NewQuestion) -> Result<Question> {
        let now = Utc::now();
        let stored = Question {
            id: Uuid::now_v7(),
            question_text: question.question_text,
            correct_answer: question.correct_answer,
            explanation: question.explanation,
            status: QuestionStatus::Draft,
            provenance: question.provenance,
            prompt_control_id: question.prompt_control_id,
            published_date: None,
            reviewed_by: None,
            created_at: now,
            updated_at: now,
        };
        self.lock()?.questions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>> {
        Ok(self.lock()?.questions.get(&id).cloned())
    }

    async fn review_draft(
        &self,
        id: Uuid,
        status: QuestionStatus,
        reviewer: &str,
    ) -> Result<Option<Question>> {
        let mut state = self.lock()?;
        let Some(question) = state.questions.get_mut(&id) else {
            return Ok(None);
        };
        if question.status != QuestionStatus::Draft {
            return Ok(None);
        }
        question.status = status;
        question.reviewed_by = Some(reviewer.to_string());
        question.updated_at = Utc::now();
        Ok(Some(question.clone()))
    }

    async fn edit_draft(&self, id: Uuid, edit: &QuestionEdit) -> Result<Option<Question>> {
        let mut state = self.lock()?;
        let Some(question) = state.questions.get_mut(&id) else {
            return Ok(None);
        };
        if question.status != QuestionStatus::Draft {
            return Ok(None);
        }
        edit.apply_to(question);
        question.updated_at = Utc::now();
        Ok(Some(question.clone()))
    }

    async fn count_pool(&self) -> Result<u64> {
        let state = self.lock()?;
        let count = state.questions.values().filter(|q| q.is_in_pool()).count();
        Ok(u64::try_from(count)?)
    }

    async fn list_pool(&self, limit: usize) -> Result<Vec<Question>> {
        let state = self.lock()?;
        let mut pool: Vec<Question> = state
            .questions
            .values()
            .filter(|q| q.is_in_pool())
            .cloned()
            .collect();
        pool.sort_by(pool_order);
        pool.truncate(limit);
        Ok(pool)
    }

    async fn publish_for_date(&self, question_id: Uuid, date: NaiveDate) -> Result<PublishAttempt> {
        let mut state = self.lock()?;
        let Some(question) = state.questions.get(&question_id).cloned() else {
            return Ok(PublishAttempt::QuestionMissing);
        };

        if let Some(existing) = state.active_challenge_on(date) {
            return Ok(if existing.question_id == question_id {
                PublishAttempt::AlreadyPublished(existing.clone())
            } else {
                PublishAttempt::DateTaken(existing.clone())
            });
        }

        if question.status != QuestionStatus::Approved {
            return Ok(PublishAttempt::QuestionNotPublishable(question));
        }

        let now = Utc::now();
        let challenge = Challenge {
            id: Uuid::now_v7(),
            external_id: challenge_external_id(date, question_id),
            question_id,
            challenge_date: date,
            is_active: true,
            counters: ResponseCounters::default(),
            created_at: now,
        };
        state.challenges.insert(challenge.id, challenge.clone());
        if let Some(stored) = state.questions.get_mut(&question_id) {
            stored.status = QuestionStatus::Published;
            stored.published_date = Some(date);
            stored.updated_at = now;
        }
        Ok(PublishAttempt::Created(challenge))
    }

    async fn active_challenge_for(&self, date: NaiveDate) -> Result<Option<Challenge>> {
        Ok(self.lock()?.active_challenge_on(date).cloned())
    }

    async fn active_challenges_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Challenge>> {
        let state = self.lock()?;
        let mut challenges: Vec<Challenge> = state
            .challenges
            .values()
            .filter(|c| c.is_active && c.challenge_date >= from && c.challenge_date <= to)
            .cloned()
            .collect();
        challenges.sort_by_key(|c| c.challenge_date);
        Ok(challenges)
    }

    async fn get_challenge(&self, id: Uuid) -> Result<Option<Challenge>> {
        Ok(self.lock()?.challenges.get(&id).cloned())
    }

    async fn record_response(
        &self,
        challenge_id: Uuid,
        was_correct: bool,
    ) -> Result<ResponseUpdate> {
        let mut state = self.lock()?;
        let Some(challenge) = state.challenges.get_mut(&challenge_id) else {
            return Ok(ResponseUpdate::Missing);
        };
        if !challenge.is_active {
            return Ok(ResponseUpdate::Inactive(challenge.clone()));
        }
        challenge.counters.total_responses += 1;
        if was_correct {
            challenge.counters.correct_responses += 1;
        }
        Ok(ResponseUpdate::Recorded(challenge.clone()))
    }

    async fn deactivate_challenge(&self, challenge_id: Uuid) -> Result<Option<Challenge>> {
        let mut state = self.lock()?;
        Ok(state.challenges.get_mut(&challenge_id).map(|challenge| {
            challenge.is_active = false;
            challenge.clone()
        }))
    }

    async fn get_prompt_control(&self, id: Uuid) -> Result<Option<PromptControl>> {
        Ok(self.lock()?.prompt_controls.get(&id).cloned())
    }

    async fn list_active_prompt_controls(&self) -> Result<Vec<PromptControl>> {
        let state = self.lock()?;
        let mut controls: Vec<PromptControl> = state
            .prompt_controls
            .values()
            .filter(|control| control.is_active)
            .cloned()
            .collect();
        controls.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(controls)
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }
}
