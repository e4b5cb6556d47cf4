use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::PipelineError,
    observability::metrics::Metrics,
    pipeline::{DailyPublication, MaintenanceReport, PipelineOrchestrator, WeeklyBatchReport},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    DailyPublish,
    PoolMaintenance,
    WeeklyBatch,
}

impl JobKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::DailyPublish => "daily_publish",
            JobKind::PoolMaintenance => "pool_maintenance",
            JobKind::WeeklyBatch => "weekly_batch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobContext {
    pub job_id: Uuid,
    pub kind: JobKind,
}

impl JobContext {
    #[must_use]
    pub fn new(kind: JobKind) -> Self {
        Self {
            job_id: Uuid::now_v7(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobOutcome {
    DailyPublish(DailyPublication),
    PoolMaintenance(MaintenanceReport),
    WeeklyBatch(WeeklyBatchReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub job: JobKind,
    pub outcome: JobOutcome,
}

/// 定期ジョブと手動トリガーの共通実行口。ジョブ ID・所要時間・結果を記録する。
#[derive(Clone)]
pub struct Scheduler {
    pipeline: Arc<PipelineOrchestrator>,
    metrics: Arc<Metrics>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<PipelineOrchestrator>, metrics: Arc<Metrics>) -> Self {
        Self { pipeline, metrics }
    }

    pub fn pipeline(&self) -> &Arc<PipelineOrchestrator> {
        &self.pipeline
    }

    pub async fn run_job(&self, context: JobContext) -> Result<JobReport, PipelineError> {
        let job = context.kind.as_str();
        tracing::info!(job_id = %context.job_id, job, "running pipeline job");

        let timer = self.metrics.job_duration.start_timer();
        let result = match context.kind {
            JobKind::DailyPublish => self
                .pipeline
                .publish_todays_challenge()
                .await
                .map(JobOutcome::DailyPublish),
            JobKind::PoolMaintenance => self
                .pipeline
                .maintain_pool()
                .await
                .map(JobOutcome::PoolMaintenance),
            JobKind::WeeklyBatch => self
                .pipeline
                .schedule_weekly_batch()
                .await
                .map(JobOutcome::WeeklyBatch),
        };
        timer.observe_duration();

        match result {
            Ok(outcome) => {
                self.metrics.jobs_completed.with_label_values(&[job]).inc();
                tracing::info!(job_id = %context.job_id, job, "pipeline job completed");
                Ok(JobReport {
                    job_id: context.job_id,
                    job: context.kind,
                    outcome,
                })
            }
            Err(error) => {
                self.metrics.jobs_failed.with_label_values(&[job]).inc();
                tracing::error!(
                    job_id = %context.job_id,
                    job,
                    kind = error.kind(),
                    error = %error,
                    "pipeline job failed"
                );
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{GeneratedQuestion, GenerationGateway, GenerationRequest};
    use crate::observability::Telemetry;
    use crate::store::dao::{ContentStore, MemoryContentStore};
    use async_trait::async_trait;

    struct UnavailableGateway;

    #[async_trait]
    impl GenerationGateway for UnavailableGateway {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> anyhow::Result<GeneratedQuestion> {
            Err(anyhow::anyhow!("generation service unavailable"))
        }
    }

    fn scheduler(telemetry: &Telemetry) -> Scheduler {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryContentStore::new());
        let pipeline = PipelineOrchestrator::builder(
            store,
            Arc::new(UnavailableGateway),
            telemetry.metrics_arc(),
        )
        .build();
        Scheduler::new(Arc::new(pipeline), telemetry.metrics_arc())
    }

    #[tokio::test]
    async fn successful_jobs_are_counted_by_kind() {
        let telemetry = Telemetry::without_tracing().expect("telemetry");
        let scheduler = scheduler(&telemetry);

        let report = scheduler
            .run_job(JobContext::new(JobKind::PoolMaintenance))
            .await
            .expect("maintenance without prompt controls still completes");

        assert_eq!(report.job, JobKind::PoolMaintenance);
        assert!(matches!(report.outcome, JobOutcome::PoolMaintenance(_)));
        assert!(
            telemetry
                .render_prometheus()
                .contains("challenge_jobs_completed_total{job=\"pool_maintenance\"} 1")
        );
    }

    #[tokio::test]
    async fn failed_jobs_are_counted_and_returned() {
        let telemetry = Telemetry::without_tracing().expect("telemetry");
        let scheduler = scheduler(&telemetry);

        let error = scheduler
            .run_job(JobContext::new(JobKind::DailyPublish))
            .await
            .expect_err("empty pool cannot publish");

        assert!(matches!(error, PipelineError::NoApprovedQuestions { .. }));
        assert!(
            telemetry
                .render_prometheus()
                .contains("challenge_jobs_failed_total{job=\"daily_publish\"} 1")
        );
    }
}
