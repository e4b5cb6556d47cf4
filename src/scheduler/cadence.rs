use anyhow::{Result, anyhow};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

/// 固定オフセットでの毎日の起動時刻。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DailyCadence {
    tz: FixedOffset,
    target: NaiveTime,
}

impl DailyCadence {
    pub(crate) fn new(tz: FixedOffset, hour: u32, minute: u32) -> Result<Self> {
        let target = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| anyhow!("invalid time: {hour:02}:{minute:02}"))?;
        Ok(Self { tz, target })
    }

    /// `now` 以降で最初の起動時刻。ちょうど起動時刻なら `now` を返す。
    pub(crate) fn next_run_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let localized_now = now.with_timezone(&self.tz);
        let mut date = localized_now.date_naive();
        if localized_now.time() > self.target {
            date = date.succ_opt()?;
        }
        self.at(date)
    }

    fn at(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        self.tz
            .from_local_datetime(&date.and_time(self.target))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// 指定曜日の起動時刻。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WeeklyCadence {
    weekday: Weekday,
    daily: DailyCadence,
}

impl WeeklyCadence {
    pub(crate) fn new(tz: FixedOffset, weekday: Weekday, hour: u32, minute: u32) -> Result<Self> {
        Ok(Self {
            weekday,
            daily: DailyCadence::new(tz, hour, minute)?,
        })
    }

    pub(crate) fn next_run_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let next = self.daily.next_run_from(now)?;
        let local_date = next.with_timezone(&self.daily.tz).date_naive();
        let days_ahead = (7 + self.weekday.num_days_from_monday()
            - local_date.weekday().num_days_from_monday())
            % 7;
        let date = local_date.checked_add_days(chrono::Days::new(u64::from(days_ahead)))?;
        self.daily.at(date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cadence {
    Daily(DailyCadence),
    Weekly(WeeklyCadence),
}

impl Cadence {
    pub(crate) fn next_run_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Cadence::Daily(daily) => daily.next_run_from(now),
            Cadence::Weekly(weekly) => weekly.next_run_from(now),
        }
    }

    pub(crate) fn tz(&self) -> FixedOffset {
        match self {
            Cadence::Daily(daily) => daily.tz,
            Cadence::Weekly(weekly) => weekly.daily.tz,
        }
    }
}
