use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// QuestionStatus - 出題候補のライフサイクル状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Draft,
    Approved,
    Rejected,
    Published,
}

impl QuestionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionStatus::Draft => "draft",
            QuestionStatus::Approved => "approved",
            QuestionStatus::Rejected => "rejected",
            QuestionStatus::Published => "published",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(QuestionStatus::Draft),
            "approved" => Some(QuestionStatus::Approved),
            "rejected" => Some(QuestionStatus::Rejected),
            "published" => Some(QuestionStatus::Published),
            _ => None,
        }
    }

    /// `published` と `rejected` からはどこにも遷移できない。
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, QuestionStatus::Published | QuestionStatus::Rejected)
    }
}

impl AsRef<str> for QuestionStatus {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a question came from. Confidence only exists for generated items.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    Generated { confidence: f64 },
    Manual,
}

impl Provenance {
    #[must_use]
    pub fn generated_by_ai(self) -> bool {
        matches!(self, Provenance::Generated { .. })
    }

    #[must_use]
    pub fn confidence(self) -> Option<f64> {
        match self {
            Provenance::Generated { confidence } => Some(confidence),
            Provenance::Manual => None,
        }
    }

    pub(crate) fn from_columns(generated_by_ai: bool, confidence: Option<f64>) -> Option<Self> {
        match (generated_by_ai, confidence) {
            (true, Some(confidence)) => Some(Provenance::Generated { confidence }),
            (false, None) => Some(Provenance::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub question_text: String,
    pub correct_answer: bool,
    pub explanation: String,
    pub status: QuestionStatus,
    pub provenance: Provenance,
    pub prompt_control_id: Option<Uuid>,
    pub published_date: Option<NaiveDate>,
    pub reviewed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    #[must_use]
    pub fn confidence(&self) -> Option<f64> {
        self.provenance.confidence()
    }

    /// 承認済みで、まだどの日付にも割り当てられていない。
    #[must_use]
    pub fn is_in_pool(&self) -> bool {
        self.status == QuestionStatus::Approved && self.published_date.is_none()
    }
}

/// Insert payload; the store assigns id, timestamps and the `draft` status.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestion {
    pub question_text: String,
    pub correct_answer: bool,
    pub explanation: String,
    pub provenance: Provenance,
    pub prompt_control_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionEdit {
    #[serde(default)]
    pub question_text: Option<String>,
    #[serde(default)]
    pub correct_answer: Option<bool>,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl QuestionEdit {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.question_text.is_none() && self.correct_answer.is_none() && self.explanation.is_none()
    }

    pub(crate) fn apply_to(&self, question: &mut Question) {
        if let Some(text) = &self.question_text {
            question.question_text.clone_from(text);
        }
        if let Some(answer) = self.correct_answer {
            question.correct_answer = answer;
        }
        if let Some(explanation) = &self.explanation {
            question.explanation.clone_from(explanation);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    #[must_use]
    pub fn target_status(self) -> QuestionStatus {
        match self {
            ReviewDecision::Approve => QuestionStatus::Approved,
            ReviewDecision::Reject => QuestionStatus::Rejected,
        }
    }
}

/// Running community counters stored on the challenge row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCounters {
    pub total_responses: i64,
    pub correct_responses: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: Uuid,
    pub external_id: String,
    pub question_id: Uuid,
    pub challenge_date: NaiveDate,
    pub is_active: bool,
    pub counters: ResponseCounters,
    pub created_at: DateTime<Utc>,
}

/// 同じ (日付, 問題) の再投入で常に同じ値になる外部 ID。
#[must_use]
pub fn challenge_external_id(date: NaiveDate, question_id: Uuid) -> String {
    format!("challenge:{date}:{question_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptControl {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub difficulty: String,
    pub modality: String,
    pub prompt_template: String,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_column_text() {
        for status in [
            QuestionStatus::Draft,
            QuestionStatus::Approved,
            QuestionStatus::Rejected,
            QuestionStatus::Published,
        ] {
            assert_eq!(QuestionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(QuestionStatus::parse("scheduled"), None);
    }

    #[test]
    fn only_published_and_rejected_are_terminal() {
        assert!(QuestionStatus::Published.is_terminal());
        assert!(QuestionStatus::Rejected.is_terminal());
        assert!(!QuestionStatus::Draft.is_terminal());
        assert!(!QuestionStatus::Approved.is_terminal());
    }

    #[test]
    fn provenance_columns_must_agree() {
        assert_eq!(
            Provenance::from_columns(true, Some(0.5)),
            Some(Provenance::Generated { confidence: 0.5 })
        );
        assert_eq!(Provenance::from_columns(false, None), Some(Provenance::Manual));
        assert_eq!(Provenance::from_columns(false, Some(0.5)), None);
        assert_eq!(Provenance::from_columns(true, None), None);
    }

    #[test]
    fn external_id_is_deterministic() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 20).expect("valid date");
        let id = Uuid::nil();
        assert_eq!(
            challenge_external_id(date, id),
            "challenge:2024-06-20:00000000-0000-0000-0000-000000000000"
        );
    }
}
