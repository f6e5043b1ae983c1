//! Interview analysis: background AI evaluation of recorded interviews.
//!
//! This crate queues AI analysis jobs for completed interview applications,
//! runs them on a bounded worker pool, tracks multi-step progress, and
//! retries failures with backoff.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (database, AI backend)
//!
//! # Modules
//!
//! - [`analysis`]: Task lifecycle, pipeline and worker manager
//! - [`telemetry`]: Tracing set-up for binaries

pub mod analysis;
pub mod telemetry;
