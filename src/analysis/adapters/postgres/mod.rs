//! `PostgreSQL` adapters for analysis persistence.

mod interview;
mod models;
mod repository;
mod schema;

pub use interview::PostgresInterviewRepository;
pub use repository::{AnalysisPgPool, PostgresAnalysisTaskRepository};
