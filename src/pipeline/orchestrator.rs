//! Pipeline orchestrator: composes lifecycle, pool health, scheduling,
//! publication and stats into the operator-facing actions.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use serde::Serialize;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};
use uuid::Uuid;

use super::lifecycle::{AutoApprovalPolicy, ManualQuestion, QuestionLifecycle};
use super::pool::{PoolHealth, PoolHealthMonitor, PoolStatus};
use super::publication::{Publication, PublicationService};
use super::stats::{CommunityStats, CommunityStatsAggregator};
use super::weekly::{WeeklySchedule, WeeklyScheduler};
use crate::clients::{GeneratedQuestion, GenerationGateway, GenerationRequest};
use crate::config::PipelineTuning;
use crate::error::PipelineError;
use crate::observability::metrics::Metrics;
use crate::store::dao::ContentStore;
use crate::store::models::{Challenge, PromptControl, Question, QuestionEdit, ReviewDecision};
use crate::util::error::is_retryable;
use crate::util::retry::RetryConfig;
use crate::util::time::today_in;

const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOutcome {
    pub question: Question,
    pub auto_approved: bool,
}

/// Generation calls made while topping up the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TopUpReport {
    pub generation_calls: usize,
    pub generated: usize,
    pub auto_approved: usize,
    pub failures: usize,
}

/// Per-dependency outcome of a readiness check.
#[derive(Debug)]
pub struct Readiness {
    pub store: anyhow::Result<()>,
    pub generation: anyhow::Result<()>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub before: PoolStatus,
    pub after: PoolStatus,
    pub top_up: TopUpReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyBatchReport {
    pub top_up: TopUpReport,
    pub schedule: WeeklySchedule,
    pub pool_after: PoolStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPublication {
    #[serde(flatten)]
    pub publication: Publication,
    /// 空のプールから生成ラウンドを経て公開できた場合に `true`。
    pub recovered: bool,
}

/// 補充をいつ止めるか。
#[derive(Debug, Clone, Copy)]
enum TopUpGoal {
    TargetBuffer,
    Health(PoolHealth),
}

pub struct PipelineOrchestrator {
    store: Arc<dyn ContentStore>,
    gateway: Arc<dyn GenerationGateway>,
    lifecycle: QuestionLifecycle,
    monitor: PoolHealthMonitor,
    publication: Arc<PublicationService>,
    scheduler: WeeklyScheduler,
    stats: CommunityStatsAggregator,
    tuning: PipelineTuning,
    retry: RetryConfig,
    generation_timeout: Duration,
    tz: FixedOffset,
    metrics: Arc<Metrics>,
}

/// Builder pattern for constructing `PipelineOrchestrator`.
pub struct PipelineBuilder {
    store: Arc<dyn ContentStore>,
    gateway: Arc<dyn GenerationGateway>,
    metrics: Arc<Metrics>,
    tuning: PipelineTuning,
    retry: RetryConfig,
    generation_timeout: Duration,
    tz: FixedOffset,
}

impl PipelineBuilder {
    #[must_use]
    pub fn tuning(mut self, tuning: PipelineTuning) -> Self {
        self.tuning = tuning;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn generation_timeout(mut self, generation_timeout: Duration) -> Self {
        self.generation_timeout = generation_timeout;
        self
    }

    #[must_use]
    pub fn timezone(mut self, tz: FixedOffset) -> Self {
        self.tz = tz;
        self
    }

    #[must_use]
    pub fn build(self) -> PipelineOrchestrator {
        let publication = Arc::new(PublicationService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.metrics),
        ));

        PipelineOrchestrator {
            lifecycle: QuestionLifecycle::new(
                Arc::clone(&self.store),
                AutoApprovalPolicy::new(self.tuning.auto_approve_threshold),
                Arc::clone(&self.metrics),
            ),
            monitor: PoolHealthMonitor::new(self.tuning.health_thresholds),
            scheduler: WeeklyScheduler::new(
                Arc::clone(&self.store),
                Arc::clone(&publication),
                self.tuning.schedule_window_days,
            ),
            stats: CommunityStatsAggregator::new(
                Arc::clone(&self.store),
                Arc::clone(&self.metrics),
            ),
            publication,
            store: self.store,
            gateway: self.gateway,
            tuning: self.tuning,
            retry: self.retry,
            generation_timeout: self.generation_timeout,
            tz: self.tz,
            metrics: self.metrics,
        }
    }
}

impl PipelineOrchestrator {
    pub fn builder(
        store: Arc<dyn ContentStore>,
        gateway: Arc<dyn GenerationGateway>,
        metrics: Arc<Metrics>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            store,
            gateway,
            metrics,
            tuning: PipelineTuning::default(),
            retry: RetryConfig::default(),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            tz: Utc.fix(),
        }
    }

    #[must_use]
    pub fn tuning(&self) -> PipelineTuning {
        self.tuning
    }

    /// 設定されたオフセットでの今日。
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        today_in(self.tz)
    }

    /// 指定したプロンプト設定で1問生成し、保存して自動承認ポリシーを適用する。
    pub async fn generate_one(
        &self,
        prompt_control_id: Uuid,
    ) -> Result<GenerationOutcome, PipelineError> {
        let control = self
            .store
            .get_prompt_control(prompt_control_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "prompt control",
                id: prompt_control_id,
            })?;
        if !control.is_active {
            return Err(PipelineError::InvalidState {
                entity: "prompt control",
                id: prompt_control_id,
                status: "inactive".to_string(),
                action: "generate from",
            });
        }

        self.generate_from(&control).await
    }

    pub async fn create_manual_question(
        &self,
        manual: ManualQuestion,
    ) -> Result<Question, PipelineError> {
        self.lifecycle.submit_manual(manual).await
    }

    pub async fn review_question(
        &self,
        question_id: Uuid,
        decision: ReviewDecision,
        reviewer_id: &str,
    ) -> Result<Question, PipelineError> {
        let question = self
            .lifecycle
            .review(question_id, decision, reviewer_id)
            .await?;
        self.refresh_pool_gauge().await;
        Ok(question)
    }

    pub async fn edit_question(
        &self,
        question_id: Uuid,
        edit: &QuestionEdit,
    ) -> Result<Question, PipelineError> {
        self.lifecycle.edit(question_id, edit).await
    }

    pub async fn get_question(&self, question_id: Uuid) -> Result<Question, PipelineError> {
        self.lifecycle.get(question_id).await
    }

    pub async fn publish_question(
        &self,
        question_id: Uuid,
        date: NaiveDate,
    ) -> Result<Publication, PipelineError> {
        let publication = self.publication.publish_for_date(question_id, date).await?;
        self.refresh_pool_gauge().await;
        Ok(publication)
    }

    pub async fn publish_todays_challenge(&self) -> Result<DailyPublication, PipelineError> {
        self.publish_todays_challenge_on(self.today()).await
    }

    /// 今日のチャレンジを公開する。プールが空なら生成ラウンドを1回だけ挟んで再試行する。
    pub async fn publish_todays_challenge_on(
        &self,
        today: NaiveDate,
    ) -> Result<DailyPublication, PipelineError> {
        let result = match self.publication.publish_today(today).await {
            Ok(publication) => Ok(DailyPublication {
                publication,
                recovered: false,
            }),
            Err(error) if error.is_pool_exhaustion() => {
                warn!(%today, "pool empty at publication time; running one generation round");
                let round = self.generation_round().await?;
                info!(
                    %today,
                    generated = round.generated,
                    auto_approved = round.auto_approved,
                    failures = round.failures,
                    "recovery generation round finished"
                );
                self.publication
                    .publish_today(today)
                    .await
                    .map(|publication| DailyPublication {
                        publication,
                        recovered: true,
                    })
            }
            Err(error) => Err(error),
        };
        self.refresh_pool_gauge().await;
        result
    }

    pub async fn schedule_weekly_batch(&self) -> Result<WeeklyBatchReport, PipelineError> {
        self.schedule_weekly_batch_from(self.today()).await
    }

    /// プールを `good` まで補充してから `start` 起点の期間を埋める。
    pub async fn schedule_weekly_batch_from(
        &self,
        start: NaiveDate,
    ) -> Result<WeeklyBatchReport, PipelineError> {
        let top_up = self.top_up(TopUpGoal::Health(PoolHealth::Good)).await?;
        let schedule = self.scheduler.schedule_window(start).await;
        let pool_after = self.pool_health().await?;
        let schedule = schedule?;

        info!(
            window_start = %start,
            generation_calls = top_up.generation_calls,
            scheduled = schedule.scheduled_count,
            requested = schedule.requested_days,
            pool_after = pool_after.available,
            "weekly batch finished"
        );
        Ok(WeeklyBatchReport {
            top_up,
            schedule,
            pool_after,
        })
    }

    /// 健全性が `good` 未満ならターゲットバッファまで生成する。
    pub async fn maintain_pool(&self) -> Result<MaintenanceReport, PipelineError> {
        let before = self.pool_health().await?;
        if before.health >= PoolHealth::Good {
            info!(
                available = before.available,
                health = %before.health,
                "pool healthy; no generation needed"
            );
            return Ok(MaintenanceReport {
                before,
                after: before,
                top_up: TopUpReport::default(),
            });
        }

        let top_up = self.top_up(TopUpGoal::TargetBuffer).await?;
        let after = self.pool_health().await?;
        info!(
            before = before.available,
            after = after.available,
            health = %after.health,
            generation_calls = top_up.generation_calls,
            failures = top_up.failures,
            "pool maintenance finished"
        );
        Ok(MaintenanceReport {
            before,
            after,
            top_up,
        })
    }

    pub async fn pool_health(&self) -> Result<PoolStatus, PipelineError> {
        let available = self.store.count_pool().await?;
        #[allow(clippy::cast_precision_loss)]
        let gauge = available as f64;
        self.metrics.pool_size.set(gauge);
        Ok(PoolStatus {
            available,
            health: self.monitor.classify(available),
            target_buffer: self.tuning.target_buffer,
            max_buffer: self.tuning.max_buffer,
            thresholds: self.monitor.thresholds(),
        })
    }

    pub async fn record_response(
        &self,
        challenge_id: Uuid,
        was_correct: bool,
    ) -> Result<CommunityStats, PipelineError> {
        self.stats.record_response(challenge_id, was_correct).await
    }

    pub async fn get_stats(&self, challenge_id: Uuid) -> Result<CommunityStats, PipelineError> {
        self.stats.get_stats(challenge_id).await
    }

    pub async fn get_challenge(&self, challenge_id: Uuid) -> Result<Challenge, PipelineError> {
        self.publication.get_challenge(challenge_id).await
    }

    pub async fn deactivate_challenge(
        &self,
        challenge_id: Uuid,
    ) -> Result<Challenge, PipelineError> {
        self.publication.deactivate_challenge(challenge_id).await
    }

    /// ストアと生成サービスの疎通を並行して確認する。
    pub async fn readiness(&self) -> Readiness {
        let (store, generation) = tokio::join!(self.store.ping(), self.gateway.health_check());
        Readiness { store, generation }
    }

    async fn generate_from(
        &self,
        control: &PromptControl,
    ) -> Result<GenerationOutcome, PipelineError> {
        let request = GenerationRequest::from(control);
        let candidate = self.generate_with_retry(&request).await?;

        let draft = self
            .lifecycle
            .submit_generated(&candidate, control.id)
            .await?;
        self.metrics.questions_generated.inc();

        let question = self.lifecycle.auto_approve(draft).await?;
        let auto_approved = question.is_in_pool();
        info!(
            question_id = %question.id,
            prompt_control_id = %control.id,
            confidence = ?question.confidence(),
            auto_approved,
            "generated question stored"
        );
        Ok(GenerationOutcome {
            question,
            auto_approved,
        })
    }

    /// タイムアウト付きで生成サービスを呼び、再試行可能な失敗はバックオフして再実行する。
    async fn generate_with_retry(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedQuestion, PipelineError> {
        let mut attempt = 0;

        loop {
            let delay = self.retry.backoff_before(attempt);
            if !delay.is_zero() {
                sleep(delay).await;
            }
            attempt += 1;

            let timer = self.metrics.generation_duration.start_timer();
            let call = timeout(self.generation_timeout, self.gateway.generate(request));
            let result = match call.await {
                Ok(result) => result,
                Err(_) => Err(anyhow!(
                    "generation timed out after {}s",
                    self.generation_timeout.as_secs_f64()
                )),
            };
            timer.observe_duration();

            match result {
                Ok(candidate) => return Ok(candidate),
                Err(error) if self.retry.allows_retry_after(attempt) && is_retryable(&error) => {
                    self.metrics.generation_retries.inc();
                    warn!(
                        prompt_control_id = %request.prompt_control_id,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %error,
                        "generation failed; retrying"
                    );
                }
                Err(error) => {
                    self.metrics.generation_failures.inc();
                    return Err(PipelineError::Generation {
                        prompt_control_id: request.prompt_control_id,
                        attempts: attempt,
                        source: error,
                    });
                }
            }
        }
    }

    /// 有効なプロンプト設定をラウンドロビンで使い、目標に届くか試行上限まで生成する。
    async fn top_up(&self, goal: TopUpGoal) -> Result<TopUpReport, PipelineError> {
        let mut report = TopUpReport::default();
        let mut available = self.store.count_pool().await?;
        if self.goal_met(goal, available) {
            return Ok(report);
        }

        let controls = self.store.list_active_prompt_controls().await?;
        if controls.is_empty() {
            warn!(available, "no active prompt controls; pool cannot be topped up");
            return Ok(report);
        }

        while !self.goal_met(goal, available)
            && report.generation_calls < self.tuning.max_generation_attempts
        {
            let control = &controls[report.generation_calls % controls.len()];
            report.generation_calls += 1;
            self.record_generation(&mut report, control).await;
            available = self.store.count_pool().await?;
        }

        if !self.goal_met(goal, available) {
            warn!(
                available,
                generation_calls = report.generation_calls,
                "generation attempt cap reached before the pool goal"
            );
        }
        Ok(report)
    }

    /// 有効なプロンプト設定ごとに1回ずつ生成する。
    async fn generation_round(&self) -> Result<TopUpReport, PipelineError> {
        let mut report = TopUpReport::default();
        let controls = self.store.list_active_prompt_controls().await?;
        for control in controls.iter().take(self.tuning.max_generation_attempts) {
            report.generation_calls += 1;
            self.record_generation(&mut report, control).await;
        }
        Ok(report)
    }

    /// 1回分の生成結果をレポートに反映する。失敗はログに残して呼び出し元を止めない。
    async fn record_generation(&self, report: &mut TopUpReport, control: &PromptControl) {
        match self.generate_from(control).await {
            Ok(outcome) => {
                report.generated += 1;
                if outcome.auto_approved {
                    report.auto_approved += 1;
                }
            }
            Err(error) => {
                report.failures += 1;
                warn!(
                    prompt_control_id = %control.id,
                    kind = error.kind(),
                    error = %error,
                    "generation during top-up failed"
                );
            }
        }
    }

    fn goal_met(&self, goal: TopUpGoal, available: u64) -> bool {
        match goal {
            TopUpGoal::TargetBuffer => available >= self.tuning.target_buffer,
            TopUpGoal::Health(health) => self.monitor.classify(available) >= health,
        }
    }

    async fn refresh_pool_gauge(&self) {
        if let Err(error) = self.pool_health().await {
            warn!(error = %error, "failed to refresh pool size gauge");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::observability::Telemetry;
    use crate::store::dao::MemoryContentStore;
    use crate::store::models::QuestionStatus;

    /// Scripted gateway: pops one result per call, repeats the fallback when empty.
    struct ScriptedGateway {
        calls: AtomicUsize,
        script: Mutex<VecDeque<anyhow::Result<f64>>>,
        fallback_confidence: f64,
    }

    impl ScriptedGateway {
        fn new(script: Vec<anyhow::Result<f64>>, fallback_confidence: f64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
                fallback_confidence,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationGateway for ScriptedGateway {
        async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GeneratedQuestion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or(Ok(self.fallback_confidence));
            next.map(|confidence| GeneratedQuestion {
                question_text: format!("Generated for {}", request.category),
                correct_answer: true,
                explanation: "Generated explanation.".to_string(),
                confidence,
            })
        }
    }

    fn control(name: &str, is_active: bool) -> PromptControl {
        PromptControl {
            id: Uuid::now_v7(),
            name: name.to_string(),
            category: "nephrology".to_string(),
            difficulty: "easy".to_string(),
            modality: "true_false".to_string(),
            prompt_template: "Write a true/false question about {category}.".to_string(),
            is_active,
        }
    }

    fn orchestrator(
        store: &Arc<MemoryContentStore>,
        gateway: &Arc<ScriptedGateway>,
    ) -> PipelineOrchestrator {
        let telemetry = Telemetry::without_tracing().expect("telemetry");
        PipelineOrchestrator::builder(
            Arc::clone(store) as Arc<dyn ContentStore>,
            Arc::clone(gateway) as Arc<dyn GenerationGateway>,
            telemetry.metrics_arc(),
        )
        .retry(RetryConfig::new(2, 0, 0))
        .build()
    }

    #[tokio::test]
    async fn generate_one_rejects_unknown_and_inactive_controls() {
        let store = Arc::new(MemoryContentStore::new());
        let gateway = Arc::new(ScriptedGateway::new(Vec::new(), 0.95));
        let inactive = control("inactive", false);
        store.upsert_prompt_control(inactive.clone()).expect("seed");
        let orchestrator = orchestrator(&store, &gateway);

        let missing = orchestrator
            .generate_one(Uuid::now_v7())
            .await
            .expect_err("unknown control");
        assert!(matches!(missing, PipelineError::NotFound { .. }));

        let error = orchestrator
            .generate_one(inactive.id)
            .await
            .expect_err("inactive control");
        assert!(matches!(error, PipelineError::InvalidState { .. }));
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_once() {
        let store = Arc::new(MemoryContentStore::new());
        let gateway = Arc::new(ScriptedGateway::new(
            vec![Err(anyhow!("connection reset")), Ok(0.93)],
            0.95,
        ));
        let active = control("cardio", true);
        store.upsert_prompt_control(active.clone()).expect("seed");

        let outcome = orchestrator(&store, &gateway)
            .generate_one(active.id)
            .await
            .expect("second attempt succeeds");

        assert_eq!(gateway.calls(), 2);
        assert!(outcome.auto_approved);
        assert_eq!(outcome.question.status, QuestionStatus::Approved);
    }

    #[tokio::test]
    async fn persistent_failures_surface_as_generation_errors() {
        let store = Arc::new(MemoryContentStore::new());
        let gateway = Arc::new(ScriptedGateway::new(
            vec![Err(anyhow!("boom")), Err(anyhow!("boom again"))],
            0.95,
        ));
        let active = control("cardio", true);
        store.upsert_prompt_control(active.clone()).expect("seed");

        let error = orchestrator(&store, &gateway)
            .generate_one(active.id)
            .await
            .expect_err("both attempts fail");

        match error {
            PipelineError::Generation { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.questions().expect("snapshot").is_empty());
    }

    #[tokio::test]
    async fn publish_today_recovers_from_an_empty_pool_once() {
        let store = Arc::new(MemoryContentStore::new());
        let gateway = Arc::new(ScriptedGateway::new(Vec::new(), 0.97));
        store
            .upsert_prompt_control(control("cardio", true))
            .expect("seed");
        let today = NaiveDate::from_ymd_opt(2024, 9, 2).expect("valid date");

        let daily = orchestrator(&store, &gateway)
            .publish_todays_challenge_on(today)
            .await
            .expect("recovered");

        assert!(daily.recovered);
        assert!(daily.publication.created);
        assert_eq!(daily.publication.challenge.challenge_date, today);
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn publish_today_surfaces_error_when_recovery_yields_only_drafts() {
        let store = Arc::new(MemoryContentStore::new());
        let gateway = Arc::new(ScriptedGateway::new(Vec::new(), 0.5));
        store
            .upsert_prompt_control(control("cardio", true))
            .expect("seed");
        let today = NaiveDate::from_ymd_opt(2024, 9, 3).expect("valid date");

        let error = orchestrator(&store, &gateway)
            .publish_todays_challenge_on(today)
            .await
            .expect_err("low confidence stays draft");

        assert!(matches!(error, PipelineError::NoApprovedQuestions { .. }));
        assert_eq!(gateway.calls(), 1);
        let questions = store.questions().expect("snapshot");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].status, QuestionStatus::Draft);
    }

    #[tokio::test]
    async fn maintain_pool_respects_the_attempt_cap() {
        let store = Arc::new(MemoryContentStore::new());
        let gateway = Arc::new(ScriptedGateway::new(Vec::new(), 0.2));
        store
            .upsert_prompt_control(control("cardio", true))
            .expect("seed");
        let telemetry = Telemetry::without_tracing().expect("telemetry");
        let orchestrator = PipelineOrchestrator::builder(
            Arc::clone(&store) as Arc<dyn ContentStore>,
            Arc::clone(&gateway) as Arc<dyn GenerationGateway>,
            telemetry.metrics_arc(),
        )
        .tuning(PipelineTuning {
            max_generation_attempts: 3,
            ..PipelineTuning::default()
        })
        .build();

        let report = orchestrator.maintain_pool().await.expect("maintain");

        assert_eq!(report.top_up.generation_calls, 3);
        assert_eq!(report.top_up.auto_approved, 0);
        assert_eq!(report.after.available, 0);
        assert_eq!(gateway.calls(), 3);
    }
}
