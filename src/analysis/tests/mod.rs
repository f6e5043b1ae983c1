//! Unit tests for background interview analysis.

mod support;
