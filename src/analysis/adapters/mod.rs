//! Adapter implementations for analysis ports.

pub mod memory;
pub mod ollama;
pub mod postgres;
