//! Generative backend used by the intent extractor.
//!
//! Provides the [`GenerativeBackend`] trait and a Gemini `generateContent`
//! implementation. The client is an explicitly constructed value: a missing
//! API key leaves it unconfigured rather than failing construction, and
//! callers check [`GenerativeBackend::is_configured`] at call time.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GenerationConfig;

/// The two configured model variants. Each selects a model id and a reply style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Terse replies, 1-3 sentences.
    #[default]
    Flash,
    /// Narrative replies, 12-16 sentences.
    Pro,
}

impl ModelVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flash => "flash",
            Self::Pro => "pro",
        }
    }

    /// The variant to fall back to when this one's model is missing.
    pub fn other(&self) -> Self {
        match self {
            Self::Flash => Self::Pro,
            Self::Pro => Self::Flash,
        }
    }

    /// Configured model id for this variant.
    pub fn model_id<'a>(&self, config: &'a GenerationConfig) -> &'a str {
        match self {
            Self::Flash => &config.flash_model,
            Self::Pro => &config.pro_model,
        }
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flash" => Ok(Self::Flash),
            "pro" => Ok(Self::Pro),
            _ => Err(format!("unknown model variant: {s}")),
        }
    }
}

/// One prompt plus sampling settings.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f64,
    /// Ask the backend for `application/json` output.
    pub json_output: bool,
}

/// Classified generation failure. The extractor's retry and fallback policy
/// keys off the variant.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generative backend is not configured")]
    NotConfigured,
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("rate limited by generative backend")]
    RateLimited,
    #[error("request to generative backend failed: {0}")]
    Transport(String),
    #[error("generative backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generative backend returned no text")]
    EmptyResponse,
}

/// A text-generation backend.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Whether credentials are present. Checked before every call.
    fn is_configured(&self) -> bool;

    /// Generate text for `request` with the given model id.
    async fn generate(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct GeminiGenerateRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiGenerateResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    parts: Option<Vec<GeminiResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

/// Gemini `generateContent` client.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let api_key = config.api_key.trim().to_string();
        if api_key.is_empty() {
            tracing::warn!("no generation API key configured; intents will fall back to chat replies");
        }

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError> {
        if !self.is_configured() {
            return Err(GenerationError::NotConfigured);
        }

        let body = GeminiGenerateRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart {
                    text: request.prompt.clone(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
                response_mime_type: request.json_output.then_some("application/json"),
            },
        };

        let url = format!("{}/models/{model}:generateContent", self.api_base);
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(model, status.as_u16(), text));
        }

        let payload: GeminiGenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(format!("invalid response body: {e}")))?;

        let text: String = payload
            .candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts.unwrap_or_default())
            .filter_map(|part| part.text)
            .collect();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Map a non-success HTTP status (and its body) onto a [`GenerationError`].
pub fn classify_status(model: &str, status: u16, body: String) -> GenerationError {
    let lower = body.to_ascii_lowercase();
    if status == 404 || (lower.contains("model") && lower.contains("not found")) {
        return GenerationError::ModelNotFound(model.to_string());
    }
    if status == 429 || lower.contains("resource_exhausted") || lower.contains("quota") {
        return GenerationError::RateLimited;
    }
    GenerationError::Status { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_round_trip_and_other() {
        assert_eq!("PRO".parse::<ModelVariant>().unwrap(), ModelVariant::Pro);
        assert!("turbo".parse::<ModelVariant>().is_err());
        assert_eq!(ModelVariant::Flash.other(), ModelVariant::Pro);
        assert_eq!(ModelVariant::Pro.other(), ModelVariant::Flash);
    }

    #[test]
    fn variant_maps_to_configured_model() {
        let config = GenerationConfig::default();
        assert_eq!(ModelVariant::Flash.model_id(&config), config.flash_model);
        assert_eq!(ModelVariant::Pro.model_id(&config), config.pro_model);
    }

    #[test]
    fn classify_status_codes() {
        assert!(matches!(
            classify_status("m", 404, String::new()),
            GenerationError::ModelNotFound(m) if m == "m"
        ));
        assert!(matches!(
            classify_status("m", 400, "models/m is not found for API version v1beta".into()),
            GenerationError::ModelNotFound(_)
        ));
        assert!(matches!(
            classify_status("m", 429, String::new()),
            GenerationError::RateLimited
        ));
        assert!(matches!(
            classify_status("m", 503, "{\"status\": \"RESOURCE_EXHAUSTED\"}".into()),
            GenerationError::RateLimited
        ));
        assert!(matches!(
            classify_status("m", 500, "boom".into()),
            GenerationError::Status { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn unconfigured_backend_refuses_to_call() {
        let backend = GeminiBackend::new(&GenerationConfig::default()).unwrap();
        assert!(!backend.is_configured());
        let request = GenerationRequest {
            prompt: "hi".into(),
            max_output_tokens: 10,
            temperature: 0.0,
            json_output: true,
        };
        assert!(matches!(
            backend.generate("m", &request).await,
            Err(GenerationError::NotConfigured)
        ));
    }
}
