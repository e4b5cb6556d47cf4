//! ContentStore - 問題・チャレンジ・プロンプト設定の永続化境界
//!
//! パイプラインはこのトレイト越しにのみ状態を読み書きする。
//! 不変条件に関わる操作（日付の一意性、楽観的な状態遷移、カウンタ加算）は
//! 実装側で原子的に行う。

mod memory;
mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use super::models::{Challenge, NewQuestion, PromptControl, Question, QuestionEdit, QuestionStatus};

pub use memory::MemoryContentStore;
pub use postgres::PgContentStore;

/// Outcome of the atomic publish-for-date step.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishAttempt {
    Created(Challenge),
    /// The same question already holds the date.
    AlreadyPublished(Challenge),
    /// Another question holds the date.
    DateTaken(Challenge),
    QuestionMissing,
    QuestionNotPublishable(Question),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseUpdate {
    Recorded(Challenge),
    Inactive(Challenge),
    Missing,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// 新しい問題を `draft` として保存する
    async fn insert_question(&self, question: NewQuestion) -> Result<Question>;

    async fn get_question(&self, id: Uuid) -> Result<Option<Question>>;

    /// `draft` のときに限り `status` へ遷移させる。遷移しなかった場合は `None`
    async fn review_draft(
        &self,
        id: Uuid,
        status: QuestionStatus,
        reviewer: &str,
    ) -> Result<Option<Question>>;

    /// `draft` のときに限り本文を書き換える。書き換えなかった場合は `None`
    async fn edit_draft(&self, id: Uuid, edit: &QuestionEdit) -> Result<Option<Question>>;

    /// 承認済みかつ未割り当ての問題数
    async fn count_pool(&self) -> Result<u64>;

    /// プールを信頼度降順・作成日時昇順で返す
    async fn list_pool(&self, limit: usize) -> Result<Vec<Question>>;

    /// 日付の一意性チェックとチャレンジ作成・問題の公開を一つの単位で行う
    async fn publish_for_date(&self, question_id: Uuid, date: NaiveDate) -> Result<PublishAttempt>;

    async fn active_challenge_for(&self, date: NaiveDate) -> Result<Option<Challenge>>;

    /// `from..=to` の有効なチャレンジを日付順で返す
    async fn active_challenges_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Challenge>>;

    async fn get_challenge(&self, id: Uuid) -> Result<Option<Challenge>>;

    /// 回答数（と正答数）を原子的に加算する
    async fn record_response(&self, challenge_id: Uuid, was_correct: bool)
    -> Result<ResponseUpdate>;

    async fn deactivate_challenge(&self, challenge_id: Uuid) -> Result<Option<Challenge>>;

    async fn get_prompt_control(&self, id: Uuid) -> Result<Option<PromptControl>>;

    async fn list_active_prompt_controls(&self) -> Result<Vec<PromptControl>>;

    /// 疎通確認
    async fn ping(&self) -> Result<()>;
}
