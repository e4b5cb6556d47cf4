//! 問題のライフサイクル: `draft → approved | rejected`, `approved → published`。
//!
//! `published` と `rejected` は終端状態。状態遷移はストアの
//! `WHERE status = 'draft'` 相当のガード付き更新で行い、ここでは
//! 入力検証と、ガードに弾かれた理由の切り分けだけを担当する。

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clients::GeneratedQuestion;
use crate::error::PipelineError;
use crate::observability::metrics::Metrics;
use crate::store::dao::ContentStore;
use crate::store::models::{
    NewQuestion, Provenance, Question, QuestionEdit, QuestionStatus, ReviewDecision,
};

/// 自動承認で記録されるレビュアー ID。
pub const SYSTEM_REVIEWER: &str = "system:auto-approval";

/// 信頼度による自動承認ポリシー。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoApprovalPolicy {
    threshold: f64,
}

impl Default for AutoApprovalPolicy {
    fn default() -> Self {
        Self { threshold: 0.90 }
    }
}

impl AutoApprovalPolicy {
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 生成された `draft` で、信頼度がしきい値以上のものだけが対象。
    #[must_use]
    pub fn qualifies(&self, question: &Question) -> bool {
        question.status == QuestionStatus::Draft
            && question
                .confidence()
                .is_some_and(|confidence| confidence >= self.threshold)
    }
}

/// Operator-entered question. Starts as a `draft` without confidence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManualQuestion {
    pub question_text: String,
    pub correct_answer: bool,
    pub explanation: String,
}

pub struct QuestionLifecycle {
    store: Arc<dyn ContentStore>,
    policy: AutoApprovalPolicy,
    metrics: Arc<Metrics>,
}

impl QuestionLifecycle {
    pub fn new(
        store: Arc<dyn ContentStore>,
        policy: AutoApprovalPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            policy,
            metrics,
        }
    }

    /// 生成結果を `draft` として保存する。
    pub async fn submit_generated(
        &self,
        candidate: &GeneratedQuestion,
        prompt_control_id: Uuid,
    ) -> Result<Question, PipelineError> {
        let confidence = candidate.confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(PipelineError::validation(format!(
                "confidence must be within [0, 1], got {confidence}"
            )));
        }

        let new_question = NewQuestion {
            question_text: required_text("question_text", &candidate.question_text)?,
            correct_answer: candidate.correct_answer,
            explanation: required_text("explanation", &candidate.explanation)?,
            provenance: Provenance::Generated { confidence },
            prompt_control_id: Some(prompt_control_id),
        };

        let question = self.store.insert_question(new_question).await?;
        debug!(
            question_id = %question.id,
            %prompt_control_id,
            confidence,
            "stored generated draft"
        );
        Ok(question)
    }

    pub async fn submit_manual(&self, manual: ManualQuestion) -> Result<Question, PipelineError> {
        let new_question = NewQuestion {
            question_text: required_text("question_text", &manual.question_text)?,
            correct_answer: manual.correct_answer,
            explanation: required_text("explanation", &manual.explanation)?,
            provenance: Provenance::Manual,
            prompt_control_id: None,
        };

        let question = self.store.insert_question(new_question).await?;
        info!(question_id = %question.id, "stored manual draft");
        Ok(question)
    }

    /// `draft` の問題を承認または却下する。
    pub async fn review(
        &self,
        question_id: Uuid,
        decision: ReviewDecision,
        reviewer_id: &str,
    ) -> Result<Question, PipelineError> {
        let reviewer_id = reviewer_id.trim();
        if reviewer_id.is_empty() {
            return Err(PipelineError::validation("reviewer_id must not be empty"));
        }

        let target = decision.target_status();
        match self
            .store
            .review_draft(question_id, target, reviewer_id)
            .await?
        {
            Some(question) => {
                self.metrics
                    .questions_reviewed
                    .with_label_values(&[target.as_str()])
                    .inc();
                info!(
                    %question_id,
                    status = %question.status,
                    reviewer = reviewer_id,
                    "question reviewed"
                );
                Ok(question)
            }
            None => Err(self.explain_guard_miss(question_id, "review").await),
        }
    }

    /// 承認ポリシーを満たせばシステムレビュアーで承認し、満たさなければそのまま返す。
    pub async fn auto_approve(&self, question: Question) -> Result<Question, PipelineError> {
        if !self.policy.qualifies(&question) {
            debug!(
                question_id = %question.id,
                confidence = ?question.confidence(),
                threshold = self.policy.threshold,
                "question left for manual review"
            );
            return Ok(question);
        }

        let approved = self
            .review(question.id, ReviewDecision::Approve, SYSTEM_REVIEWER)
            .await?;
        self.metrics.questions_auto_approved.inc();
        Ok(approved)
    }

    /// `draft` の間だけ本文・正答・解説を書き換える。
    pub async fn edit(
        &self,
        question_id: Uuid,
        edit: &QuestionEdit,
    ) -> Result<Question, PipelineError> {
        if edit.is_empty() {
            return Err(PipelineError::validation("edit must change at least one field"));
        }

        let normalized = QuestionEdit {
            question_text: edit
                .question_text
                .as_deref()
                .map(|text| required_text("question_text", text))
                .transpose()?,
            correct_answer: edit.correct_answer,
            explanation: edit
                .explanation
                .as_deref()
                .map(|text| required_text("explanation", text))
                .transpose()?,
        };

        match self.store.edit_draft(question_id, &normalized).await? {
            Some(question) => {
                info!(%question_id, "draft question edited");
                Ok(question)
            }
            None => Err(self.explain_guard_miss(question_id, "edit").await),
        }
    }

    pub async fn get(&self, question_id: Uuid) -> Result<Question, PipelineError> {
        self.store
            .get_question(question_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "question",
                id: question_id,
            })
    }

    /// ガード付き更新が何も変えなかったとき、存在しないのか状態違いなのかを切り分ける。
    async fn explain_guard_miss(&self, question_id: Uuid, action: &'static str) -> PipelineError {
        match self.get(question_id).await {
            Ok(question) => {
                if question.status.is_terminal() {
                    debug!(%question_id, status = %question.status, action, "question is final");
                }
                PipelineError::InvalidState {
                    entity: "question",
                    id: question_id,
                    status: question.status.to_string(),
                    action,
                }
            }
            Err(error) => error,
        }
    }
}

fn required_text(field: &str, value: &str) -> Result<String, PipelineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}
