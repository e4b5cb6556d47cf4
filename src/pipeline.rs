pub mod lifecycle;
pub mod orchestrator;
pub mod pool;
pub mod publication;
pub mod stats;
pub mod weekly;

pub use lifecycle::{AutoApprovalPolicy, ManualQuestion, QuestionLifecycle, SYSTEM_REVIEWER};
pub use orchestrator::{
    DailyPublication, GenerationOutcome, MaintenanceReport, PipelineBuilder, PipelineOrchestrator,
    Readiness, TopUpReport, WeeklyBatchReport,
};
pub use pool::{HealthThresholds, PoolHealth, PoolHealthMonitor, PoolStatus};
pub use publication::{Publication, PublicationService};
pub use stats::{CommunityStats, CommunityStatsAggregator};
pub use weekly::{ScheduledSlot, WeeklySchedule, WeeklyScheduler};
