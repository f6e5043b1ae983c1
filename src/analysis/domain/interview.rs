//! Interview data consumed by the analysis pipeline and the AI verdicts it
//! produces.

use super::ResponseId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Candidate information shared with the AI backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateProfile {
    /// Candidate display name.
    pub name: String,
    /// Contact email, if known.
    pub email: Option<String>,
    /// Years of professional experience.
    pub experience_years: Option<u32>,
    /// Self-reported skills.
    pub skills: Vec<String>,
    /// Free-form resume summary.
    pub summary: Option<String>,
}

/// Job information shared with the AI backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobProfile {
    /// Job title.
    pub title: String,
    /// Job description.
    pub description: Option<String>,
    /// Skills the role requires.
    pub required_skills: Vec<String>,
    /// Seniority or experience level.
    pub experience_level: Option<String>,
    /// Owning department.
    pub department: Option<String>,
}

/// Interview-level facts used for the overall assessment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewMetadata {
    /// Interview format, e.g. `video` or `audio`.
    pub interview_type: Option<String>,
    /// Total interview length in minutes.
    pub duration_minutes: Option<u32>,
    /// When the candidate finished the interview.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Candidate, job and interview context of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewContext {
    /// Candidate under evaluation.
    pub candidate: CandidateProfile,
    /// Job applied for.
    pub job: JobProfile,
    /// Interview facts.
    pub metadata: InterviewMetadata,
}

/// Question asked during the interview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionDetails {
    /// Question identifier.
    pub id: String,
    /// Question text shown to the candidate.
    pub text: String,
    /// Question category, e.g. `technical`.
    pub category: Option<String>,
    /// Difficulty label.
    pub difficulty: Option<String>,
    /// Reference answer supplied by the recruiter.
    pub expected_answer: Option<String>,
    /// Extra grading guidance for the evaluator.
    pub evaluation_instructions: Option<String>,
}

/// Recruiter-facing hiring recommendation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Exceptional candidate.
    StrongHire,
    /// Candidate meets the bar.
    Hire,
    /// Inconclusive; needs human review.
    #[default]
    Maybe,
    /// Candidate does not meet the bar.
    NoHire,
}

/// AI verdict on a single interview response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseAnalysis {
    /// Score out of 100, absent when the evaluator could not score.
    pub overall_score: Option<u8>,
    /// Observed strengths.
    pub strengths: Vec<String>,
    /// Suggested improvements.
    pub improvements: Vec<String>,
    /// Short narrative summary.
    pub summary: String,
    /// `true` when this verdict is a placeholder substituted for a failed
    /// analysis.
    pub is_fallback: bool,
}

impl ResponseAnalysis {
    /// Builds the placeholder verdict stored when analysis of a response
    /// fails.
    #[must_use]
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            overall_score: None,
            strengths: Vec::new(),
            improvements: Vec::new(),
            summary: reason.into(),
            is_fallback: true,
        }
    }

    /// Returns `true` for a verdict produced by the evaluator itself.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !self.is_fallback
    }
}

/// AI verdict on the interview as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverallAnalysis {
    /// Holistic score out of 100.
    pub overall_score: u8,
    /// Hiring recommendation.
    pub recommendation: Recommendation,
    /// Narrative summary.
    pub summary: String,
    /// Key strengths across the interview.
    pub strengths: Vec<String>,
    /// Key concerns across the interview.
    pub concerns: Vec<String>,
    /// `true` when the backend substituted placeholder values.
    pub is_fallback: bool,
}

/// One candidate answer together with its stored verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewResponse {
    /// Response identifier.
    pub id: ResponseId,
    /// Question answered.
    pub question: QuestionDetails,
    /// Transcribed answer.
    pub response_text: String,
    /// Stored verdict, if the response was analysed before.
    pub analysis: Option<ResponseAnalysis>,
}

impl InterviewResponse {
    /// Returns `true` when the response still needs an evaluator verdict.
    ///
    /// Responses carrying only a fallback verdict are analysed again.
    #[must_use]
    pub fn needs_analysis(&self) -> bool {
        !self
            .analysis
            .as_ref()
            .is_some_and(ResponseAnalysis::is_complete)
    }
}
