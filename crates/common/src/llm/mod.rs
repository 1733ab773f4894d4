//! Generative service abstraction
//!
//! Provides a unified interface for text generation backends:
//! - Gemini (`generateContent` REST API)
//! - Offline (no backend configured; every call fails so callers fall back)

use crate::config::GenerativeConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A single prompt sent to a generative backend
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    /// Ask the backend for a JSON document instead of prose
    pub json_output: bool,
}

impl GenerationRequest {
    pub fn json(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            json_output: true,
        }
    }

    pub fn text(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            json_output: false,
        }
    }
}

/// Trait for text generation
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for the request, returning the raw text
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Strip markdown code fences some models wrap JSON output in
pub fn strip_code_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Gemini generative client
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPartOut<'a>>,
}

#[derive(Serialize)]
struct GeminiPartOut<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPartIn>,
}

#[derive(Deserialize)]
struct GeminiPartIn {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiResponse {
    /// Concatenate every text part across candidates
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect()
    }
}

impl GeminiGenerator {
    /// Create a new Gemini generator
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| crate::DEFAULT_GENERATIVE_MODEL.to_string()),
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            timeout,
        })
    }

    async fn make_request(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPartOut { text: &request.prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                response_mime_type: request.json_output.then_some("application/json"),
            },
        };

        let response = self.client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout {
                        service: "generative".to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    AppError::Generation {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Generation {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: GeminiResponse = response.json().await.map_err(|e| {
            AppError::Generation {
                message: format!("Failed to parse response: {}", e),
            }
        })?;

        let text = result.into_text();
        if text.trim().is_empty() {
            return Err(AppError::Generation {
                message: "Empty response".to_string(),
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let start = Instant::now();
        let operation = if request.json_output { "json" } else { "text" };

        let result = self.make_request(request).await;
        metrics::record_external(
            start.elapsed().as_secs_f64(),
            "generative",
            operation,
            result.is_ok(),
        );

        if let Err(ref e) = result {
            tracing::warn!(model = %self.model, error = %e, "Generation request failed");
        }

        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Generator used when no backend is configured
pub struct OfflineGenerator;

#[async_trait]
impl Generator for OfflineGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        Err(AppError::Generation {
            message: "no generative backend configured".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "offline"
    }
}

/// Create a generator based on configuration
pub fn create_generator(config: &GenerativeConfig) -> Result<Arc<dyn Generator>> {
    let timeout = Duration::from_secs(config.timeout_secs);

    match (config.provider.as_str(), config.api_key.clone()) {
        ("gemini", Some(key)) if !key.trim().is_empty() => Ok(Arc::new(GeminiGenerator::new(
            key,
            Some(config.model.clone()),
            config.api_base.clone(),
            timeout,
        )?)),
        ("gemini", _) => {
            tracing::warn!("Gemini API key missing, generative calls will use fallbacks");
            Ok(Arc::new(OfflineGenerator))
        }
        ("offline", _) => Ok(Arc::new(OfflineGenerator)),
        (provider, _) => {
            tracing::warn!(provider = provider, "Unknown generative provider, running offline");
            Ok(Arc::new(OfflineGenerator))
        }
    }
}
