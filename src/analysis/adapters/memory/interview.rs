//! In-memory interview data for tests and local runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::analysis::{
    domain::{
        AnalysisResults, ApplicationId, InterviewContext, InterviewResponse, OverallAnalysis,
        ResponseAnalysis, ResponseId,
    },
    ports::{InterviewRepository, InterviewRepositoryError, InterviewRepositoryResult},
};

/// Overall verdict mirrored onto an application record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredOverallAnalysis {
    /// Holistic verdict.
    pub analysis: OverallAnalysis,
    /// Mean of the individual response scores.
    pub average_score: f64,
}

/// Thread-safe in-memory store of applications and their responses.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInterviewRepository {
    state: Arc<RwLock<InMemoryInterviewState>>,
}

#[derive(Debug, Default)]
struct InMemoryInterviewState {
    contexts: HashMap<ApplicationId, InterviewContext>,
    responses: HashMap<ApplicationId, Vec<InterviewResponse>>,
    overall: HashMap<ApplicationId, StoredOverallAnalysis>,
}

impl InMemoryInterviewRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> InterviewRepositoryResult<RwLockReadGuard<'_, InMemoryInterviewState>> {
        self.state.read().map_err(|err| {
            InterviewRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> InterviewRepositoryResult<RwLockWriteGuard<'_, InMemoryInterviewState>> {
        self.state.write().map_err(|err| {
            InterviewRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    /// Registers an application with its context and responses, replacing
    /// any earlier registration.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the lock is poisoned.
    pub fn insert_application(
        &self,
        application_id: ApplicationId,
        context: InterviewContext,
        responses: Vec<InterviewResponse>,
    ) -> InterviewRepositoryResult<()> {
        let mut state = self.write()?;
        state.contexts.insert(application_id.clone(), context);
        state.responses.insert(application_id, responses);
        Ok(())
    }

    /// Appends a response to a registered application.
    ///
    /// # Errors
    ///
    /// Returns [`InterviewRepositoryError::ApplicationNotFound`] when the
    /// application is not registered.
    pub fn push_response(
        &self,
        application_id: &ApplicationId,
        response: InterviewResponse,
    ) -> InterviewRepositoryResult<()> {
        let mut state = self.write()?;
        let responses = state
            .responses
            .get_mut(application_id)
            .ok_or_else(|| InterviewRepositoryError::ApplicationNotFound(application_id.clone()))?;
        responses.push(response);
        Ok(())
    }

    /// Returns the verdict mirrored onto the application, if any.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the lock is poisoned.
    pub fn overall_analysis(
        &self,
        application_id: &ApplicationId,
    ) -> InterviewRepositoryResult<Option<StoredOverallAnalysis>> {
        Ok(self.read()?.overall.get(application_id).cloned())
    }
}

#[async_trait]
impl InterviewRepository for InMemoryInterviewRepository {
    async fn fetch_responses(
        &self,
        application_id: &ApplicationId,
    ) -> InterviewRepositoryResult<Vec<InterviewResponse>> {
        let state = self.read()?;
        Ok(state
            .responses
            .get(application_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_context(
        &self,
        application_id: &ApplicationId,
    ) -> InterviewRepositoryResult<InterviewContext> {
        let state = self.read()?;
        state
            .contexts
            .get(application_id)
            .cloned()
            .ok_or_else(|| InterviewRepositoryError::ApplicationNotFound(application_id.clone()))
    }

    async fn save_response_analysis(
        &self,
        response_id: &ResponseId,
        analysis: &ResponseAnalysis,
    ) -> InterviewRepositoryResult<()> {
        let mut state = self.write()?;
        let response = state
            .responses
            .values_mut()
            .flat_map(|responses| responses.iter_mut())
            .find(|response| &response.id == response_id)
            .ok_or_else(|| InterviewRepositoryError::ResponseNotFound(response_id.clone()))?;
        response.analysis = Some(analysis.clone());
        Ok(())
    }

    async fn save_overall_analysis(
        &self,
        application_id: &ApplicationId,
        analysis: &OverallAnalysis,
        results: &AnalysisResults,
    ) -> InterviewRepositoryResult<()> {
        let mut state = self.write()?;
        if !state.contexts.contains_key(application_id) {
            return Err(InterviewRepositoryError::ApplicationNotFound(
                application_id.clone(),
            ));
        }
        state.overall.insert(
            application_id.clone(),
            StoredOverallAnalysis {
                analysis: analysis.clone(),
                average_score: results.average_score,
            },
        );
        Ok(())
    }
}
