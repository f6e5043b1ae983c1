//! Ollama-backed AI analysis adapter.
//!
//! Prompts are rendered from templates, sent to the `/api/generate`
//! endpoint with JSON output requested, and the model's reply is parsed
//! leniently. Replies that cannot be parsed become fallback verdicts rather
//! than errors; only calls that never complete surface as
//! [`AnalysisBackendError`].

mod prompts;

pub use prompts::PromptTemplates;

use crate::analysis::{
    domain::{FALLBACK_SCORE, OverallAnalysis, Recommendation, ResponseAnalysis},
    ports::{
        AnalysisBackend, AnalysisBackendError, OverallAnalysisRequest, ResponseAnalysisRequest,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Connection and sampling settings for [`OllamaAnalysisBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaConfig {
    base_url: String,
    model: String,
    request_timeout: Duration,
    max_attempts: u32,
    backoff_base: Duration,
    temperature: f32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_owned(),
            model: "llama3.1".to_owned(),
            request_timeout: Duration::from_secs(60),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            temperature: 0.2,
        }
    }
}

impl OllamaConfig {
    /// Sets the server base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the per-request HTTP timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets how many times a request is attempted before giving up.
    ///
    /// Values below one are raised to one.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay between attempts.
    #[must_use]
    pub const fn with_backoff_base(mut self, delay: Duration) -> Self {
        self.backoff_base = delay;
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Returns the server base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the per-request HTTP timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the attempt budget per call.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'static str,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// [`AnalysisBackend`] talking to an Ollama server over HTTP.
#[derive(Debug, Clone)]
pub struct OllamaAnalysisBackend {
    client: reqwest::Client,
    config: OllamaConfig,
    generate_url: String,
    prompts: std::sync::Arc<PromptTemplates>,
}

impl OllamaAnalysisBackend {
    /// Creates a backend for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisBackendError::Transport`] when the HTTP client
    /// cannot be built and [`AnalysisBackendError::Rejected`] when the prompt
    /// templates fail to compile.
    pub fn new(config: OllamaConfig) -> Result<Self, AnalysisBackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(AnalysisBackendError::transport)?;
        let prompts = PromptTemplates::new()
            .map_err(|err| AnalysisBackendError::Rejected(err.to_string()))?;
        let generate_url = format!("{}/api/generate", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            config,
            generate_url,
            prompts: std::sync::Arc::new(prompts),
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &OllamaConfig {
        &self.config
    }

    async fn generate(&self, prompt: &str) -> Result<String, AnalysisBackendError> {
        let mut attempt = 1;
        loop {
            match self.send_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(err) if attempt >= self.config.max_attempts => return Err(err),
                Err(err) => {
                    let delay = self.config.backoff_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "ollama request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn send_once(&self, prompt: &str) -> Result<String, AnalysisBackendError> {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            format: "json",
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };
        let response = self
            .client
            .post(&self.generate_url)
            .json(&body)
            .send()
            .await
            .map_err(|err| self.classify(err))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AnalysisBackendError::Rejected(format!("{status}: {detail}")));
        }

        let payload: GenerateResponse =
            response.json().await.map_err(|err| self.classify(err))?;
        debug!(model = %self.config.model, bytes = payload.response.len(), "ollama replied");
        Ok(payload.response)
    }

    fn classify(&self, err: reqwest::Error) -> AnalysisBackendError {
        if err.is_timeout() {
            AnalysisBackendError::Timeout(self.config.request_timeout)
        } else {
            AnalysisBackendError::transport(err)
        }
    }
}

#[async_trait]
impl AnalysisBackend for OllamaAnalysisBackend {
    async fn analyze_response(
        &self,
        request: &ResponseAnalysisRequest,
    ) -> Result<ResponseAnalysis, AnalysisBackendError> {
        let prompt = self
            .prompts
            .render_response(request)
            .map_err(|err| AnalysisBackendError::Rejected(err.to_string()))?;
        let reply = self.generate(&prompt).await?;
        Ok(parse_response_analysis(&reply).unwrap_or_else(|| {
            warn!(question = %request.question_details.id, "unparseable response analysis");
            ResponseAnalysis::fallback("The evaluator returned an unreadable verdict.")
        }))
    }

    async fn analyze_overall(
        &self,
        request: &OverallAnalysisRequest,
    ) -> Result<OverallAnalysis, AnalysisBackendError> {
        let prompt = self
            .prompts
            .render_overall(request)
            .map_err(|err| AnalysisBackendError::Rejected(err.to_string()))?;
        let reply = self.generate(&prompt).await?;
        Ok(parse_overall_analysis(&reply).unwrap_or_else(|| {
            warn!(responses = request.responses.len(), "unparseable overall analysis");
            fallback_overall(request)
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawResponseAnalysis {
    #[serde(alias = "score")]
    overall_score: Option<Value>,
    strengths: Vec<String>,
    #[serde(alias = "weaknesses")]
    improvements: Vec<String>,
    #[serde(alias = "feedback")]
    summary: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOverallAnalysis {
    #[serde(alias = "score")]
    overall_score: Option<Value>,
    recommendation: Option<String>,
    summary: String,
    strengths: Vec<String>,
    #[serde(alias = "weaknesses")]
    concerns: Vec<String>,
}

/// Extracts the outermost JSON object from model output.
fn json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    text.get(start..=end)
}

fn parse_response_analysis(text: &str) -> Option<ResponseAnalysis> {
    let raw: RawResponseAnalysis = serde_json::from_str(json_object(text)?).ok()?;
    let score = raw.overall_score.as_ref().and_then(clamp_score)?;
    Some(ResponseAnalysis {
        overall_score: Some(score),
        strengths: raw.strengths,
        improvements: raw.improvements,
        summary: raw.summary,
        is_fallback: false,
    })
}

fn parse_overall_analysis(text: &str) -> Option<OverallAnalysis> {
    let raw: RawOverallAnalysis = serde_json::from_str(json_object(text)?).ok()?;
    let score = raw.overall_score.as_ref().and_then(clamp_score)?;
    let recommendation = raw
        .recommendation
        .as_deref()
        .and_then(parse_recommendation)
        .unwrap_or_else(|| recommendation_for(score));
    Some(OverallAnalysis {
        overall_score: score,
        recommendation,
        summary: raw.summary,
        strengths: raw.strengths,
        concerns: raw.concerns,
        is_fallback: false,
    })
}

fn clamp_score(value: &Value) -> Option<u8> {
    match value {
        Value::Number(number) => {
            if let Some(whole) = number.as_u64() {
                Some(u8::try_from(whole.min(100)).unwrap_or(100))
            } else if number.as_i64().is_some() {
                Some(0)
            } else {
                number.as_f64().map(round_score)
            }
        }
        Value::String(raw) => raw.trim().parse::<f64>().ok().map(round_score),
        _ => None,
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "the value is clamped to 0..=100 before the cast"
)]
fn round_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.clamp(0.0, 100.0).round() as u8
}

fn parse_recommendation(raw: &str) -> Option<Recommendation> {
    let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    match normalized.as_str() {
        "strong_hire" => Some(Recommendation::StrongHire),
        "hire" => Some(Recommendation::Hire),
        "maybe" => Some(Recommendation::Maybe),
        "no_hire" => Some(Recommendation::NoHire),
        _ => None,
    }
}

const fn recommendation_for(score: u8) -> Recommendation {
    match score {
        85.. => Recommendation::StrongHire,
        70..=84 => Recommendation::Hire,
        50..=69 => Recommendation::Maybe,
        _ => Recommendation::NoHire,
    }
}

/// Overall verdict derived from the per-response scores alone.
#[expect(
    clippy::integer_division,
    reason = "scores are whole numbers; truncation is acceptable for a fallback"
)]
fn fallback_overall(request: &OverallAnalysisRequest) -> OverallAnalysis {
    let scores: Vec<u32> = request
        .responses
        .iter()
        .map(|item| u32::from(item.analysis.overall_score.unwrap_or(FALLBACK_SCORE)))
        .collect();
    let count = u32::try_from(scores.len()).unwrap_or(u32::MAX);
    let score = if count == 0 {
        FALLBACK_SCORE
    } else {
        u8::try_from(scores.iter().sum::<u32>() / count).unwrap_or(FALLBACK_SCORE)
    };
    OverallAnalysis {
        overall_score: score,
        recommendation: Recommendation::Maybe,
        summary: "Automated summary unavailable; score reflects the per-question average."
            .to_owned(),
        strengths: Vec::new(),
        concerns: Vec::new(),
        is_fallback: true,
    }
}
