//! 週次スケジューラ: 期間内の空き日付にプールから1問ずつ割り当てる。
//!
//! 割り当てと公開は `PublicationService::publish_for_date` の1呼び出しで行う。

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::publication::{PublicationService, pool_candidates};
use crate::error::PipelineError;
use crate::store::dao::ContentStore;
use crate::util::time::date_window;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledSlot {
    pub date: NaiveDate,
    pub question_id: Uuid,
    pub challenge_id: Uuid,
}

/// Result of one scheduling pass. A short pool yields a partial schedule, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklySchedule {
    pub window_start: NaiveDate,
    pub window_days: u32,
    /// Dates in the window that had no active challenge when the pass started.
    pub requested_days: usize,
    pub scheduled_count: usize,
    pub scheduled: Vec<ScheduledSlot>,
    /// Open dates taken by a concurrent writer during the pass.
    pub lost_dates: Vec<NaiveDate>,
    pub unfilled_dates: Vec<NaiveDate>,
}

pub struct WeeklyScheduler {
    store: Arc<dyn ContentStore>,
    publication: Arc<PublicationService>,
    window_days: u32,
}

impl WeeklyScheduler {
    pub fn new(
        store: Arc<dyn ContentStore>,
        publication: Arc<PublicationService>,
        window_days: u32,
    ) -> Self {
        Self {
            store,
            publication,
            window_days,
        }
    }

    /// `start` から `window_days` 日分の空き日付を埋める。
    ///
    /// 空き日付があるのにプールが最初から空なら `InsufficientPool`。
    pub async fn schedule_window(&self, start: NaiveDate) -> Result<WeeklySchedule, PipelineError> {
        let window = date_window(start, self.window_days);
        let Some(&end) = window.last() else {
            return Ok(self.empty_schedule(start));
        };

        let taken: HashSet<NaiveDate> = self
            .store
            .active_challenges_between(start, end)
            .await?
            .into_iter()
            .map(|challenge| challenge.challenge_date)
            .collect();
        let open: Vec<NaiveDate> = window
            .into_iter()
            .filter(|date| !taken.contains(date))
            .collect();

        let mut schedule = self.empty_schedule(start);
        schedule.requested_days = open.len();
        if open.is_empty() {
            debug!(window_start = %start, "schedule window already filled");
            return Ok(schedule);
        }

        let mut skipped: HashSet<Uuid> = HashSet::new();
        let mut pool = pool_candidates(self.store.as_ref(), open.len(), &skipped).await?;
        if pool.is_empty() {
            warn!(
                window_start = %start,
                open_dates = open.len(),
                "no approved questions available for the schedule window"
            );
            return Err(PipelineError::InsufficientPool {
                window_start: start,
                open_dates: open.len(),
            });
        }

        let mut dates: VecDeque<NaiveDate> = open.into();
        while let Some(&date) = dates.front() {
            if pool.is_empty() {
                // 手元の候補を使い切った: 残りの日付分をストアから読み直す
                pool = pool_candidates(self.store.as_ref(), dates.len(), &skipped).await?;
            }
            let Some(&question_id) = pool.front() else {
                break;
            };

            match self.publication.publish_for_date(question_id, date).await {
                Ok(publication) => {
                    pool.pop_front();
                    dates.pop_front();
                    schedule.scheduled.push(ScheduledSlot {
                        date,
                        question_id,
                        challenge_id: publication.challenge.id,
                    });
                }
                // 日付を取られた: 同じ問題を次の空き日付に回す
                Err(PipelineError::DuplicateDate { .. }) => {
                    dates.pop_front();
                    schedule.lost_dates.push(date);
                }
                // 問題が並行して消費された: 同じ日付で次の候補を試す
                Err(PipelineError::InvalidState { .. } | PipelineError::NotFound { .. }) => {
                    pool.pop_front();
                    skipped.insert(question_id);
                }
                Err(other) => return Err(other),
            }
        }
        schedule.unfilled_dates.extend(dates);
        schedule.scheduled_count = schedule.scheduled.len();

        info!(
            window_start = %start,
            requested_days = schedule.requested_days,
            scheduled = schedule.scheduled_count,
            unfilled = schedule.unfilled_dates.len(),
            lost = schedule.lost_dates.len(),
            "schedule window processed"
        );
        Ok(schedule)
    }

    fn empty_schedule(&self, start: NaiveDate) -> WeeklySchedule {
        WeeklySchedule {
            window_start: start,
            window_days: self.window_days,
            requested_days: 0,
            scheduled_count: 0,
            scheduled: Vec::new(),
            lost_dates: Vec::new(),
            unfilled_dates: Vec::new(),
        }
    }
}
