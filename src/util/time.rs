use chrono::{Days, FixedOffset, NaiveDate, Utc};

/// 指定オフセットでの「今日」。チャレンジの日付は常にこの暦日で扱う。
#[must_use]
pub fn today_in(tz: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// `start` から `days` 日分の連続した日付（`start` を含む）。
#[must_use]
pub fn date_window(start: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..days)
        .map_while(|offset| start.checked_add_days(Days::new(u64::from(offset))))
        .collect()
}
