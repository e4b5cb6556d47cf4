#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use uuid::Uuid;

use challenge_worker::clients::{GeneratedQuestion, GenerationGateway, GenerationRequest};
use challenge_worker::config::PipelineTuning;
use challenge_worker::observability::Telemetry;
use challenge_worker::pipeline::PipelineOrchestrator;
use challenge_worker::store::dao::{
    ContentStore, MemoryContentStore, PublishAttempt, ResponseUpdate,
};
use challenge_worker::store::models::{
    Challenge, NewQuestion, PromptControl, Provenance, Question, QuestionEdit, QuestionStatus,
};
use challenge_worker::util::retry::RetryConfig;

/// Gateway double that counts calls and returns scripted confidences.
pub struct CountingGateway {
    calls: AtomicUsize,
    confidences: Mutex<VecDeque<f64>>,
    default_confidence: f64,
    fail: bool,
}

impl CountingGateway {
    pub fn with_confidence(default_confidence: f64) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            confidences: Mutex::new(VecDeque::new()),
            default_confidence,
            fail: false,
        }
    }

    pub fn scripted(confidences: Vec<f64>, default_confidence: f64) -> Self {
        Self {
            confidences: Mutex::new(confidences.into()),
            ..Self::with_confidence(default_confidence)
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with_confidence(0.0)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationGateway for CountingGateway {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GeneratedQuestion> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            anyhow::bail!("generation service unavailable");
        }
        let confidence = self
            .confidences
            .lock()
            .expect("confidence script lock")
            .pop_front()
            .unwrap_or(self.default_confidence);
        Ok(GeneratedQuestion {
            question_text: format!("{} question #{call}", request.category),
            correct_answer: call % 2 == 0,
            explanation: format!("Explanation for {} question #{call}.", request.category),
            confidence,
        })
    }
}

pub struct Harness {
    pub store: Arc<MemoryContentStore>,
    pub gateway: Arc<CountingGateway>,
    pub telemetry: Telemetry,
    pub orchestrator: PipelineOrchestrator,
}

impl Harness {
    pub fn new(gateway: CountingGateway) -> Self {
        Self::with_tuning(gateway, PipelineTuning::default())
    }

    pub fn with_tuning(gateway: CountingGateway, tuning: PipelineTuning) -> Self {
        let store = Arc::new(MemoryContentStore::new());
        let gateway = Arc::new(gateway);
        let telemetry = Telemetry::without_tracing().expect("telemetry");
        let orchestrator = PipelineOrchestrator::builder(
            Arc::clone(&store) as Arc<dyn ContentStore>,
            Arc::clone(&gateway) as Arc<dyn GenerationGateway>,
            telemetry.metrics_arc(),
        )
        .tuning(tuning)
        .retry(RetryConfig::new(2, 0, 0))
        .build();

        Self {
            store,
            gateway,
            telemetry,
            orchestrator,
        }
    }

    pub fn seed_prompt_control(&self, name: &str) -> PromptControl {
        let control = PromptControl {
            id: Uuid::now_v7(),
            name: name.to_string(),
            category: name.to_string(),
            difficulty: "medium".to_string(),
            modality: "true_false".to_string(),
            prompt_template: "Write one true/false question about {category}.".to_string(),
            is_active: true,
        };
        self.store
            .upsert_prompt_control(control.clone())
            .expect("seed prompt control");
        control
    }

    /// Inserts an approved question directly through the store.
    pub async fn seed_approved(&self, confidence: Option<f64>) -> Question {
        let provenance = match confidence {
            Some(confidence) => Provenance::Generated { confidence },
            None => Provenance::Manual,
        };
        let question = self
            .store
            .insert_question(NewQuestion {
                question_text: "Seeded statement.".to_string(),
                correct_answer: true,
                explanation: "Seeded explanation.".to_string(),
                provenance,
                prompt_control_id: None,
            })
            .await
            .expect("insert");
        self.store
            .review_draft(question.id, QuestionStatus::Approved, "dr.seed")
            .await
            .expect("review")
            .expect("draft")
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Store wrapper that lets an admin publish each of the first `steals`
/// candidates to a far-off date right before the pipeline's own publish call.
pub struct AdminRaceStore {
    inner: Arc<MemoryContentStore>,
    steals: AtomicUsize,
    stolen: AtomicUsize,
    admin_start: NaiveDate,
}

impl AdminRaceStore {
    pub fn new(inner: Arc<MemoryContentStore>, steals: usize, admin_start: NaiveDate) -> Self {
        Self {
            inner,
            steals: AtomicUsize::new(steals),
            stolen: AtomicUsize::new(0),
            admin_start,
        }
    }

    pub fn stolen(&self) -> usize {
        self.stolen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStore for AdminRaceStore {
    async fn insert_question(&self, question: NewQuestion) -> anyhow::Result<Question> {
        self.inner.insert_question(question).await
    }

    async fn get_question(&self, id: Uuid) -> anyhow::Result<Option<Question>> {
        self.inner.get_question(id).await
    }

    async fn review_draft(
        &self,
        id: Uuid,
        status: QuestionStatus,
        reviewer: &str,
    ) -> anyhow::Result<Option<Question>> {
        self.inner.review_draft(id, status, reviewer).await
    }

    async fn edit_draft(&self, id: Uuid, edit: &QuestionEdit) -> anyhow::Result<Option<Question>> {
        self.inner.edit_draft(id, edit).await
    }

    async fn count_pool(&self) -> anyhow::Result<u64> {
        self.inner.count_pool().await
    }

    async fn list_pool(&self, limit: usize) -> anyhow::Result<Vec<Question>> {
        self.inner.list_pool(limit).await
    }

    async fn publish_for_date(
        &self,
        question_id: Uuid,
        date: NaiveDate,
    ) -> anyhow::Result<PublishAttempt> {
        let remaining = self
            .steals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if remaining.is_ok() {
            let offset = self.stolen.fetch_add(1, Ordering::SeqCst) as u64;
            let admin_date = self
                .admin_start
                .checked_add_days(Days::new(offset))
                .expect("admin date in range");
            let attempt = self.inner.publish_for_date(question_id, admin_date).await?;
            assert!(matches!(attempt, PublishAttempt::Created(_)));
        }
        self.inner.publish_for_date(question_id, date).await
    }

    async fn active_challenge_for(&self, date: NaiveDate) -> anyhow::Result<Option<Challenge>> {
        self.inner.active_challenge_for(date).await
    }

    async fn active_challenges_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<Challenge>> {
        self.inner.active_challenges_between(from, to).await
    }

    async fn get_challenge(&self, id: Uuid) -> anyhow::Result<Option<Challenge>> {
        self.inner.get_challenge(id).await
    }

    async fn record_response(
        &self,
        challenge_id: Uuid,
        was_correct: bool,
    ) -> anyhow::Result<ResponseUpdate> {
        self.inner.record_response(challenge_id, was_correct).await
    }

    async fn deactivate_challenge(&self, challenge_id: Uuid) -> anyhow::Result<Option<Challenge>> {
        self.inner.deactivate_challenge(challenge_id).await
    }

    async fn get_prompt_control(&self, id: Uuid) -> anyhow::Result<Option<PromptControl>> {
        self.inner.get_prompt_control(id).await
    }

    async fn list_active_prompt_controls(&self) -> anyhow::Result<Vec<PromptControl>> {
        self.inner.list_active_prompt_controls().await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.inner.ping().await
    }
}
