//! Identifier types for the analysis domain.

use super::AnalysisDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of random characters appended to generated task identifiers.
const TASK_ID_SUFFIX_LEN: usize = 12;

/// Returns `true` when a raw identifier is non-empty and free of whitespace.
fn is_valid_reference(value: &str) -> bool {
    !value.is_empty() && !value.chars().any(char::is_whitespace)
}

/// Unique identifier for an analysis task.
///
/// Generated identifiers embed the application they analyse followed by a
/// random suffix, e.g. `analysis_65f0c1_1b2c3d4e5f60`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a fresh identifier for a task analysing `application_id`.
    #[must_use]
    pub fn generate(application_id: &ApplicationId) -> Self {
        let suffix: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(TASK_ID_SUFFIX_LEN)
            .collect();
        Self(format!("analysis_{application_id}_{suffix}"))
    }

    /// Wraps an existing identifier, for example one loaded from storage.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisDomainError::EmptyTaskId`] when the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, AnalysisDomainError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AnalysisDomainError::EmptyTaskId);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the identifier as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to the interview application being analysed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(String);

impl ApplicationId {
    /// Creates a validated application reference.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisDomainError::InvalidApplicationId`] when the value
    /// is empty or contains whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, AnalysisDomainError> {
        let raw = value.into();
        if !is_valid_reference(&raw) {
            return Err(AnalysisDomainError::InvalidApplicationId(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the reference as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to the tenant workspace that owns an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Creates a validated workspace reference.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisDomainError::InvalidWorkspaceId`] when the value is
    /// empty or contains whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, AnalysisDomainError> {
        let raw = value.into();
        if !is_valid_reference(&raw) {
            return Err(AnalysisDomainError::InvalidWorkspaceId(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the reference as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a worker executor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Creates a worker identity.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisDomainError::EmptyWorkerId`] when the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, AnalysisDomainError> {
        let raw = value.into();
        if raw.trim().is_empty() {
            return Err(AnalysisDomainError::EmptyWorkerId);
        }
        Ok(Self(raw))
    }

    /// Builds the identity of the worker occupying pool slot `slot`.
    #[must_use]
    pub fn for_slot(slot: usize) -> Self {
        Self(format!("analysis-worker-{slot}"))
    }

    /// Returns the identity as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a single interview response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(String);

impl ResponseId {
    /// Wraps a response identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
