//! Background AI analysis of completed interviews.
//!
//! Submitted applications become analysis tasks that a bounded worker pool
//! runs through a four-step pipeline: fetch responses, score each response,
//! score the interview as a whole, and persist the results. At most one task
//! per application is in flight; failed attempts are retried with
//! exponential backoff. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
