//! In-memory adapters for the analysis ports.

mod interview;
mod task;

pub use interview::{InMemoryInterviewRepository, StoredOverallAnalysis};
pub use task::InMemoryAnalysisTaskRepository;
