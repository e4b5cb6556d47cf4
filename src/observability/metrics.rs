/// Prometheusメトリクス定義。
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry,
    register_counter_vec_with_registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub questions_generated: Counter,
    pub generation_failures: Counter,
    pub generation_retries: Counter,
    pub questions_auto_approved: Counter,
    pub questions_reviewed: CounterVec,
    pub challenges_published: Counter,
    pub duplicate_date_conflicts: Counter,
    pub responses_recorded: Counter,
    pub jobs_completed: CounterVec,
    pub jobs_failed: CounterVec,

    // ヒストグラム
    pub generation_duration: Histogram,
    pub job_duration: Histogram,

    // ゲージ
    pub pool_size: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    #[allow(clippy::too_many_lines)]
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            questions_generated: register_counter_with_registry!(
                "challenge_questions_generated_total",
                "Total number of candidate questions stored from the generation service",
                registry
            )?,
            generation_failures: register_counter_with_registry!(
                "challenge_generation_failures_total",
                "Generation calls that failed after all retries",
                registry
            )?,
            generation_retries: register_counter_with_registry!(
                "challenge_generation_retries_total",
                "Generation calls retried after a transient failure",
                registry
            )?,
            questions_auto_approved: register_counter_with_registry!(
                "challenge_questions_auto_approved_total",
                "Questions approved by the confidence policy",
                registry
            )?,
            questions_reviewed: register_counter_vec_with_registry!(
                Opts::new(
                    "challenge_questions_reviewed_total",
                    "Review decisions applied to draft questions"
                ),
                &["decision"],
                registry
            )?,
            challenges_published: register_counter_with_registry!(
                "challenge_challenges_published_total",
                "Challenges created for a calendar date",
                registry
            )?,
            duplicate_date_conflicts: register_counter_with_registry!(
                "challenge_duplicate_date_conflicts_total",
                "Publications rejected because the date already had an active challenge",
                registry
            )?,
            responses_recorded: register_counter_with_registry!(
                "challenge_responses_recorded_total",
                "Community responses folded into challenge statistics",
                registry
            )?,
            jobs_completed: register_counter_vec_with_registry!(
                Opts::new("challenge_jobs_completed_total", "Scheduled jobs completed"),
                &["job"],
                registry
            )?,
            jobs_failed: register_counter_vec_with_registry!(
                Opts::new("challenge_jobs_failed_total", "Scheduled jobs failed"),
                &["job"],
                registry
            )?,
            generation_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "challenge_generation_duration_seconds",
                    "Latency of a single generation call"
                )
                .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 45.0, 90.0]),
                registry
            )?,
            job_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "challenge_job_duration_seconds",
                    "Duration of scheduled pipeline jobs"
                ),
                registry
            )?,
            pool_size: register_gauge_with_registry!(
                "challenge_pool_size",
                "Approved questions not yet assigned to a date",
                registry
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_on_a_fresh_registry() {
        let registry = Arc::new(Registry::new());
        let metrics = Metrics::new(Arc::clone(&registry)).expect("metrics register");

        metrics.questions_reviewed.with_label_values(&["approve"]).inc();
        metrics.pool_size.set(4.0);

        let mut buffer = Vec::new();
        let families = registry.gather();
        prometheus::Encoder::encode(&prometheus::TextEncoder::new(), &families, &mut buffer)
            .expect("encode");
        let rendered = String::from_utf8(buffer).expect("utf8");
        assert!(rendered.contains("challenge_questions_reviewed_total{decision=\"approve\"} 1"));
        assert!(rendered.contains("challenge_pool_size 4"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = Arc::new(Registry::new());
        Metrics::new(Arc::clone(&registry)).expect("first registration");
        assert!(Metrics::new(registry).is_err());
    }
}
