//! Application services for background analysis orchestration.

mod config;
mod events;
mod manager;
mod pipeline;
mod queue;

pub use config::WorkerManagerConfig;
pub use events::{AnalysisEvent, EventPublisher};
pub use manager::{
    AnalysisWorkerManager, CancelOutcome, QueueAnalysisRequest, QueueDisposition, QueueStats,
    QueuedTask, ScheduledRetry, WorkerManagerError, WorkerManagerResult,
};
pub use pipeline::{AnalysisPipeline, PipelineError, PipelineOutcome};
pub use queue::ReadyQueue;
