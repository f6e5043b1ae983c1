//! Results persisted on a successfully analysed task.

use super::{InterviewResponse, ResponseAnalysis, ResponseId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score substituted for responses without an evaluator score when
/// averaging.
pub const FALLBACK_SCORE: u8 = 50;

/// Score of a single response as recorded in task results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualScore {
    /// Response the score belongs to.
    pub response_id: ResponseId,
    /// Question the response answered.
    pub question_id: String,
    /// Evaluator score, absent when analysis failed.
    pub overall_score: Option<u8>,
    /// `true` when the response only has a fallback verdict.
    pub is_fallback: bool,
}

impl IndividualScore {
    /// Builds the score entry for `response` analysed as `analysis`.
    #[must_use]
    pub fn from_analysis(response: &InterviewResponse, analysis: &ResponseAnalysis) -> Self {
        Self {
            response_id: response.id.clone(),
            question_id: response.question.id.clone(),
            overall_score: analysis.overall_score,
            is_fallback: analysis.is_fallback,
        }
    }

    /// Score used for averaging: the evaluator score or [`FALLBACK_SCORE`].
    #[must_use]
    pub fn effective_score(&self) -> u8 {
        self.overall_score.unwrap_or(FALLBACK_SCORE)
    }
}

/// Arithmetic mean of the effective scores; `0.0` for an empty slice.
///
/// Failed analyses stay in the denominator with [`FALLBACK_SCORE`].
#[must_use]
#[expect(
    clippy::float_arithmetic,
    clippy::cast_precision_loss,
    reason = "the mean is reported as a fractional score over small counts"
)]
pub fn average_score(scores: &[IndividualScore]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let total: u32 = scores
        .iter()
        .map(|score| u32::from(score.effective_score()))
        .sum();
    f64::from(total) / scores.len() as f64
}

/// Outcome of a completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    /// Per-response scores in interview order.
    pub individual_scores: Vec<IndividualScore>,
    /// Holistic score from the overall assessment.
    pub overall_score: u8,
    /// Mean of the individual scores.
    pub average_score: f64,
    /// When the analysis finished.
    pub analysis_completed_at: DateTime<Utc>,
}

impl AnalysisResults {
    /// Assembles results, deriving the average from `individual_scores`.
    #[must_use]
    pub fn new(
        individual_scores: Vec<IndividualScore>,
        overall_score: u8,
        analysis_completed_at: DateTime<Utc>,
    ) -> Self {
        let average_score = average_score(&individual_scores);
        Self {
            individual_scores,
            overall_score,
            average_score,
            analysis_completed_at,
        }
    }
}
