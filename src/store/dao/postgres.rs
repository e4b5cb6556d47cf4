use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{ContentStore, PublishAttempt, ResponseUpdate};
use crate::store::models::{
    Challenge, NewQuestion, PromptControl, Provenance, Question, QuestionEdit, QuestionStatus,
    ResponseCounters, challenge_external_id,
};

const QUESTION_COLUMNS: &str = "id, question_text, correct_answer, explanation, status, \
     generated_by_ai, ai_confidence, prompt_control_id, published_date, reviewed_by, \
     created_at, updated_at";

const CHALLENGE_COLUMNS: &str = "id, external_id, question_id, challenge_date, is_active, \
     total_responses, correct_responses, created_at";

const PROMPT_CONTROL_COLUMNS: &str =
    "id, name, category, difficulty, modality, prompt_template, is_active";

#[derive(Debug, Clone)]
pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn question_from_row(row: &PgRow) -> Result<Question> {
    let id: Uuid = row.try_get("id")?;
    let status_raw: String = row.try_get("status")?;
    let status = QuestionStatus::parse(&status_raw)
        .ok_or_else(|| anyhow!("question {id} has unknown status {status_raw:?}"))?;
    let generated_by_ai: bool = row.try_get("generated_by_ai")?;
    let ai_confidence: Option<f64> = row.try_get("ai_confidence")?;
    let provenance = Provenance::from_columns(generated_by_ai, ai_confidence).ok_or_else(|| {
        anyhow!("question {id} has inconsistent provenance columns (generated_by_ai={generated_by_ai}, ai_confidence={ai_confidence:?})")
    })?;

    Ok(Question {
        id,
        question_text: row.try_get("question_text")?,
        correct_answer: row.try_get("correct_answer")?,
        explanation: row.try_get("explanation")?,
        status,
        provenance,
        prompt_control_id: row.try_get("prompt_control_id")?,
        published_date: row.try_get("published_date")?,
        reviewed_by: row.try_get("reviewed_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn challenge_from_row(row: &PgRow) -> Result<Challenge> {
    Ok(Challenge {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        question_id: row.try_get("question_id")?,
        challenge_date: row.try_get("challenge_date")?,
        is_active: row.try_get("is_active")?,
        counters: ResponseCounters {
            total_responses: row.try_get("total_responses")?,
            correct_responses: row.try_get("correct_responses")?,
        },
        created_at: row.try_get("created_at")?,
    })
}

fn prompt_control_from_row(row: &PgRow) -> Result<PromptControl> {
    Ok(PromptControl {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        difficulty: row.try_get("difficulty")?,
        modality: row.try_get("modality")?,
        prompt_template: row.try_get("prompt_template")?,
        is_active: row.try_get("is_active")?,
    })
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn insert_question(&self, question: NewQuestion) -> Result<Question> {
        let row = sqlx::query(&format!(
            r"
            INSERT INTO questions
                (id, question_text, correct_answer, explanation, status,
                 generated_by_ai, ai_confidence, prompt_control_id)
            VALUES ($1, $2, $3, $4, 'draft', $5, $6, $7)
            RETURNING {QUESTION_COLUMNS}
            "
        ))
        .bind(Uuid::now_v7())
        .bind(&question.question_text)
        .bind(question.correct_answer)
        .bind(&question.explanation)
        .bind(question.provenance.generated_by_ai())
        .bind(question.provenance.confidence())
        .bind(question.prompt_control_id)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert question")?;

        question_from_row(&row)
    }

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>> {
        let row = sqlx::query(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch question")?;

        row.as_ref().map(question_from_row).transpose()
    }

    async fn review_draft(
        &self,
        id: Uuid,
        status: QuestionStatus,
        reviewer: &str,
    ) -> Result<Option<Question>> {
        let row = sqlx::query(&format!(
            r"
            UPDATE questions
            SET status = $2, reviewed_by = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'draft'
            RETURNING {QUESTION_COLUMNS}
            "
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(reviewer)
        .fetch_optional(&self.pool)
        .await
        .context("failed to review question")?;

        row.as_ref().map(question_from_row).transpose()
    }

    async fn edit_draft(&self, id: Uuid, edit: &QuestionEdit) -> Result<Option<Question>> {
        let row = sqlx::query(&format!(
            r"
            UPDATE questions
            SET question_text = COALESCE($2, question_text),
                correct_answer = COALESCE($3, correct_answer),
                explanation = COALESCE($4, explanation),
                updated_at = NOW()
            WHERE id = $1 AND status = 'draft'
            RETURNING {QUESTION_COLUMNS}
            "
        ))
        .bind(id)
        .bind(edit.question_text.as_deref())
        .bind(edit.correct_answer)
        .bind(edit.explanation.as_deref())
        .fetch_optional(&self.pool)
        .await
        .context("failed to edit question")?;

        row.as_ref().map(question_from_row).transpose()
    }

    async fn count_pool(&self) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS pool_size FROM questions \
             WHERE status = 'approved' AND published_date IS NULL",
        )
        .fetch_one(&self.pool)
        .await
        .context("failed to count approved pool")?;

        let count: i64 = row.try_get("pool_size")?;
        Ok(u64::try_from(count)?)
    }

    async fn list_pool(&self, limit: usize) -> Result<Vec<Question>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {QUESTION_COLUMNS}
            FROM questions
            WHERE status = 'approved' AND published_date IS NULL
            ORDER BY ai_confidence DESC NULLS LAST, created_at ASC, id ASC
            LIMIT $1
            "
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("failed to list approved pool")?;

        rows.iter().map(question_from_row).collect()
    }

    async fn publish_for_date(&self, question_id: Uuid, date: NaiveDate) -> Result<PublishAttempt> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let question_row = sqlx::query(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1 FOR UPDATE"
        ))
        .bind(question_id)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to lock question")?;

        let Some(question_row) = question_row else {
            tx.rollback().await.context("failed to rollback transaction")?;
            return Ok(PublishAttempt::QuestionMissing);
        };
        let question = question_from_row(&question_row)?;

        let existing = sqlx::query(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE challenge_date = $1 AND is_active"
        ))
        .bind(date)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to check challenge date")?;

        if let Some(existing) = existing {
            let existing = challenge_from_row(&existing)?;
            tx.rollback().await.context("failed to rollback transaction")?;
            return Ok(if existing.question_id == question_id {
                PublishAttempt::AlreadyPublished(existing)
            } else {
                PublishAttempt::DateTaken(existing)
            });
        }

        if question.status != QuestionStatus::Approved {
            tx.rollback().await.context("failed to rollback transaction")?;
            return Ok(PublishAttempt::QuestionNotPublishable(question));
        }

        // 部分ユニークインデックス (challenge_date WHERE is_active) が最終防衛線
        let inserted = sqlx::query(&format!(
            r"
            INSERT INTO challenges (id, external_id, question_id, challenge_date, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT DO NOTHING
            RETURNING {CHALLENGE_COLUMNS}
            "
        ))
        .bind(Uuid::now_v7())
        .bind(challenge_external_id(date, question_id))
        .bind(question_id)
        .bind(date)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to insert challenge")?;

        let Some(inserted) = inserted else {
            tx.rollback().await.context("failed to rollback transaction")?;
            // 並行した公開に日付を取られた
            return match self.active_challenge_for(date).await? {
                Some(winner) if winner.question_id == question_id => {
                    Ok(PublishAttempt::AlreadyPublished(winner))
                }
                Some(winner) => Ok(PublishAttempt::DateTaken(winner)),
                None => Err(anyhow!(
                    "challenge insert for question {question_id} on {date} conflicted without an active winner"
                )),
            };
        };
        let challenge = challenge_from_row(&inserted)?;

        sqlx::query(
            r"
            UPDATE questions
            SET status = 'published', published_date = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(question_id)
        .bind(date)
        .execute(&mut *tx)
        .await
        .context("failed to mark question published")?;

        tx.commit().await.context("failed to commit publication")?;

        Ok(PublishAttempt::Created(challenge))
    }

    async fn active_challenge_for(&self, date: NaiveDate) -> Result<Option<Challenge>> {
        let row = sqlx::query(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE challenge_date = $1 AND is_active"
        ))
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch active challenge")?;

        row.as_ref().map(challenge_from_row).transpose()
    }

    async fn active_challenges_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Challenge>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {CHALLENGE_COLUMNS}
            FROM challenges
            WHERE is_active AND challenge_date BETWEEN $1 AND $2
            ORDER BY challenge_date
            "
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .context("failed to list active challenges")?;

        rows.iter().map(challenge_from_row).collect()
    }

    async fn get_challenge(&self, id: Uuid) -> Result<Option<Challenge>> {
        let row = sqlx::query(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch challenge")?;

        row.as_ref().map(challenge_from_row).transpose()
    }

    async fn record_response(
        &self,
        challenge_id: Uuid,
        was_correct: bool,
    ) -> Result<ResponseUpdate> {
        let row = sqlx::query(&format!(
            r"
            UPDATE challenges
            SET total_responses = total_responses + 1,
                correct_responses = correct_responses + CASE WHEN $2 THEN 1 ELSE 0 END
            WHERE id = $1 AND is_active
            RETURNING {CHALLENGE_COLUMNS}
            "
        ))
        .bind(challenge_id)
        .bind(was_correct)
        .fetch_optional(&self.pool)
        .await
        .context("failed to record challenge response")?;

        if let Some(row) = row {
            return Ok(ResponseUpdate::Recorded(challenge_from_row(&row)?));
        }

        Ok(match self.get_challenge(challenge_id).await? {
            Some(challenge) => ResponseUpdate::Inactive(challenge),
            None => ResponseUpdate::Missing,
        })
    }

    async fn deactivate_challenge(&self, challenge_id: Uuid) -> Result<Option<Challenge>> {
        let row = sqlx::query(&format!(
            "UPDATE challenges SET is_active = FALSE WHERE id = $1 RETURNING {CHALLENGE_COLUMNS}"
        ))
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to deactivate challenge")?;

        row.as_ref().map(challenge_from_row).transpose()
    }

    async fn get_prompt_control(&self, id: Uuid) -> Result<Option<PromptControl>> {
        let row = sqlx::query(&format!(
            "SELECT {PROMPT_CONTROL_COLUMNS} FROM prompt_controls WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch prompt control")?;

        row.as_ref().map(prompt_control_from_row).transpose()
    }

    async fn list_active_prompt_controls(&self) -> Result<Vec<PromptControl>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROMPT_CONTROL_COLUMNS} FROM prompt_controls WHERE is_active ORDER BY name, id"
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to list active prompt controls")?;

        rows.iter().map(prompt_control_from_row).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("content store ping failed")?;
        Ok(())
    }
}
