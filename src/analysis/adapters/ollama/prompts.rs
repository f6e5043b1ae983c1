//! Prompt templates for interview evaluation.

use crate::analysis::ports::{OverallAnalysisRequest, ResponseAnalysisRequest};
use minijinja::Environment;

const RESPONSE_TEMPLATE_NAME: &str = "response_analysis";
const OVERALL_TEMPLATE_NAME: &str = "overall_analysis";

const RESPONSE_TEMPLATE: &str = r#"You are an experienced technical interviewer evaluating one answer from a recorded interview.

Role: {{ job_details.title }}{% if job_details.experience_level %} ({{ job_details.experience_level }}){% endif %}
{% if job_details.required_skills %}Required skills: {{ job_details.required_skills | join(", ") }}
{% endif %}Candidate: {{ candidate_info.name }}{% if candidate_info.experience_years %}, {{ candidate_info.experience_years }} years of experience{% endif %}

Question{% if question_details.category %} [{{ question_details.category }}]{% endif %}: {{ question_text }}
{% if question_details.expected_answer %}Reference answer: {{ question_details.expected_answer }}
{% endif %}{% if evaluation_instructions %}Evaluation guidance: {{ evaluation_instructions }}
{% endif %}
Candidate answer:
"""
{{ response_text }}
"""

Reply with a single JSON object and nothing else:
{"overall_score": <integer 0-100>, "strengths": [<string>], "improvements": [<string>], "summary": <string>}
"#;

const OVERALL_TEMPLATE: &str = r#"You are a hiring panel lead summarising a completed interview.

Role: {{ job_profile.title }}{% if job_profile.department %} in {{ job_profile.department }}{% endif %}
{% if job_profile.description %}Description: {{ job_profile.description }}
{% endif %}Candidate: {{ candidate_profile.name }}
{% if candidate_profile.summary %}Background: {{ candidate_profile.summary }}
{% endif %}{% if interview_metadata.interview_type %}Interview type: {{ interview_metadata.interview_type }}
{% endif %}
Per-question results:
{% for item in responses %}{{ loop.index }}. {{ item.question.text }}
   Score: {% if item.analysis.overall_score is not none %}{{ item.analysis.overall_score }}{% else %}unscored{% endif %}
   Summary: {{ item.analysis.summary }}
{% endfor %}
Reply with a single JSON object and nothing else:
{"overall_score": <integer 0-100>, "recommendation": "strong_hire" | "hire" | "maybe" | "no_hire", "summary": <string>, "strengths": [<string>], "concerns": [<string>]}
"#;

/// Compiled prompt templates.
#[derive(Debug)]
pub struct PromptTemplates {
    environment: Environment<'static>,
}

impl PromptTemplates {
    /// Compiles the built-in templates.
    ///
    /// # Errors
    ///
    /// Returns a [`minijinja::Error`] when a template fails to compile.
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut environment = Environment::new();
        environment.add_template(RESPONSE_TEMPLATE_NAME, RESPONSE_TEMPLATE)?;
        environment.add_template(OVERALL_TEMPLATE_NAME, OVERALL_TEMPLATE)?;
        Ok(Self { environment })
    }

    /// Renders the single-response evaluation prompt.
    ///
    /// # Errors
    ///
    /// Returns a [`minijinja::Error`] when rendering fails.
    pub fn render_response(
        &self,
        request: &ResponseAnalysisRequest,
    ) -> Result<String, minijinja::Error> {
        self.environment
            .get_template(RESPONSE_TEMPLATE_NAME)?
            .render(request)
    }

    /// Renders the overall interview prompt.
    ///
    /// # Errors
    ///
    /// Returns a [`minijinja::Error`] when rendering fails.
    pub fn render_overall(
        &self,
        request: &OverallAnalysisRequest,
    ) -> Result<String, minijinja::Error> {
        self.environment
            .get_template(OVERALL_TEMPLATE_NAME)?
            .render(request)
    }
}
