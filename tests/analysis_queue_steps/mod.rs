//! Step definitions for analysis queue behaviour tests.

pub mod given;
pub mod then;
pub mod when;
