//! 生成サービス呼び出しの再試行回数と待ち時間。
use std::time::Duration;

use rand::Rng;

/// `max_attempts` は初回を含む。待ち時間は上限付きの指数バックオフに full jitter をかける。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    /// 生成サービスは一度だけ再試行する。
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// `attempts_made` 回失敗した後、次の呼び出しまでに待つ時間。初回は待たない。
    #[must_use]
    pub fn backoff_before(&self, attempts_made: usize) -> Duration {
        let ceiling = self.backoff_ceiling(attempts_made);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=ceiling))
    }

    #[must_use]
    pub const fn allows_retry_after(&self, attempts_made: usize) -> bool {
        attempts_made < self.max_attempts
    }

    fn backoff_ceiling(&self, attempts_made: usize) -> u64 {
        let Some(exponent) = attempts_made.checked_sub(1) else {
            return 0;
        };
        let factor = u32::try_from(exponent)
            .ok()
            .and_then(|exponent| 1_u64.checked_shl(exponent))
            .unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}
