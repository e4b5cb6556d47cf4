pub(crate) mod cadence;
pub mod daemon;
pub mod jobs;

pub use daemon::spawn_pipeline_daemons;
pub use jobs::{JobContext, JobKind, JobOutcome, JobReport, Scheduler};
