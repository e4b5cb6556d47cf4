use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::{task::JoinHandle, time::sleep};
use tracing::{error, info};

use crate::config::CadenceSettings;
use crate::scheduler::{
    JobContext, JobKind, Scheduler,
    cadence::{Cadence, DailyCadence, WeeklyCadence},
};

/// 公開・プール保守・週次バッチの3つのデーモンを起動する。
///
/// # Errors
/// 設定された時刻が不正な場合。
pub fn spawn_pipeline_daemons(
    scheduler: &Scheduler,
    settings: CadenceSettings,
) -> Result<Vec<JoinHandle<()>>> {
    let jobs = [
        (
            JobKind::DailyPublish,
            Cadence::Daily(DailyCadence::new(settings.tz, settings.publish_hour, 0)?),
        ),
        (
            JobKind::PoolMaintenance,
            Cadence::Daily(DailyCadence::new(settings.tz, settings.maintain_hour, 0)?),
        ),
        (
            JobKind::WeeklyBatch,
            Cadence::Weekly(WeeklyCadence::new(
                settings.tz,
                settings.weekly_batch_weekday,
                settings.weekly_batch_hour,
                0,
            )?),
        ),
    ];

    Ok(jobs
        .into_iter()
        .map(|(kind, cadence)| JobDaemon::new(scheduler.clone(), kind, cadence).spawn())
        .collect())
}

struct JobDaemon {
    scheduler: Scheduler,
    kind: JobKind,
    cadence: Cadence,
}

impl JobDaemon {
    fn new(scheduler: Scheduler, kind: JobKind, cadence: Cadence) -> Self {
        Self {
            scheduler,
            kind,
            cadence,
        }
    }

    fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let job = self.kind.as_str();
        // 同じ起動時刻で二重に走らないよう、直前の起動時刻より後だけを待つ
        let mut last_run: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let from = match last_run {
                Some(previous) if previous >= now => previous + chrono::Duration::seconds(1),
                _ => now,
            };
            let Some(next) = self.cadence.next_run_from(from) else {
                error!(job, "could not compute next run time; daemon stopping");
                return;
            };
            let wait = duration_until(next, now);
            info!(
                job,
                next_run_utc = %next.to_rfc3339(),
                next_run_local = %next.with_timezone(&self.cadence.tz()).to_rfc3339(),
                wait_seconds = wait.as_secs(),
                "scheduled pipeline job"
            );
            sleep(wait).await;
            last_run = Some(next);

            let context = JobContext::new(self.kind);
            // 失敗は run_job 内で記録済み。デーモンは次回に備えて続行する
            if let Ok(report) = self.scheduler.run_job(context).await {
                info!(job_id = %report.job_id, job, "automatic pipeline job finished");
            }
        }
    }
}

fn duration_until(next: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::from_secs(0))
}
