//! Utterance → [`TransactionIntent`].
//!
//! [`IntentExtractor::extract`] never fails: generation faults (unconfigured
//! backend, missing model, throttling, transport errors, empty output) and
//! contract faults (unparseable or off-schema JSON) all come back as a
//! CHAT/NONE intent with a reply in the user's language.

use std::sync::Arc;

use thiserror::Error;

use super::locale::{detect_locale, fallback_text, FallbackReason};
use super::normalize::{normalize_and_validate, NormalizeOptions, SchemaError};
use super::prompt::{build_prompt, HistoryTurn, Personalization};
use super::sanitize::{parse_generated, SanitizeError};
use super::types::TransactionIntent;
use crate::config::GenerationConfig;
use crate::llm::{GenerationError, GenerationRequest, GenerativeBackend, ModelVariant};

/// Inputs for one extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractRequest {
    pub utterance: String,
    /// Prior turns, oldest first. Only the last five are used.
    pub history: Vec<HistoryTurn>,
    pub variant: ModelVariant,
    pub personalization: Option<Personalization>,
    pub link_context: Option<String>,
}

impl ExtractRequest {
    pub fn new(utterance: impl Into<String>, variant: ModelVariant) -> Self {
        Self {
            utterance: utterance.into(),
            variant,
            ..Default::default()
        }
    }
}

#[derive(Debug, Error)]
enum ExtractFault {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("generated output too short ({0} chars)")]
    TooShort(usize),
    #[error(transparent)]
    Sanitize(#[from] SanitizeError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl ExtractFault {
    fn fallback_reason(&self) -> FallbackReason {
        match self {
            Self::Generation(GenerationError::NotConfigured) => FallbackReason::NotConfigured,
            Self::Generation(GenerationError::RateLimited) => FallbackReason::RateLimited,
            Self::Generation(GenerationError::EmptyResponse) => FallbackReason::Unclear,
            Self::Generation(_) => FallbackReason::Busy,
            Self::TooShort(_) | Self::Sanitize(_) | Self::Schema(_) => FallbackReason::Unclear,
        }
    }
}

/// Turns free-form text into intents via a [`GenerativeBackend`].
#[derive(Clone)]
pub struct IntentExtractor {
    backend: Arc<dyn GenerativeBackend>,
    config: GenerationConfig,
    normalize: NormalizeOptions,
}

impl IntentExtractor {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        config: GenerationConfig,
        normalize: NormalizeOptions,
    ) -> Self {
        Self {
            backend,
            config,
            normalize,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    /// Extract an intent. Always returns a schema-valid value.
    #[tracing::instrument(
        name = "extract_intent",
        skip_all,
        fields(variant = %request.variant, utterance_len = request.utterance.len())
    )]
    pub async fn extract(&self, request: &ExtractRequest) -> TransactionIntent {
        match self.try_extract(request).await {
            Ok(intent) => intent,
            Err(fault) => {
                let reason = fault.fallback_reason();
                match reason {
                    FallbackReason::Busy => tracing::error!(error = %fault, "generation call failed"),
                    _ => tracing::warn!(error = %fault, ?reason, "falling back to chat reply"),
                }
                let locale = detect_locale(&request.utterance);
                TransactionIntent::chat(fallback_text(reason, locale))
            }
        }
    }

    async fn try_extract(&self, request: &ExtractRequest) -> Result<TransactionIntent, ExtractFault> {
        if !self.backend.is_configured() {
            return Err(GenerationError::NotConfigured.into());
        }

        let prompt = build_prompt(
            &request.utterance,
            &request.history,
            request.variant,
            request.personalization.as_ref(),
            request.link_context.as_deref(),
        );
        let generation = GenerationRequest {
            prompt,
            max_output_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
            json_output: true,
        };

        let text = self.generate_with_fallback(request.variant, &generation).await?;

        let trimmed_len = text.trim().chars().count();
        if trimmed_len < self.config.min_output_chars {
            return Err(ExtractFault::TooShort(trimmed_len));
        }

        let value = parse_generated(&text)?;
        let intent = normalize_and_validate(&value, &self.normalize)?;
        tracing::debug!(kind = ?intent.kind, action = %intent.action_type(), "intent extracted");
        Ok(intent)
    }

    /// Try the requested variant, then the other one, but only when the
    /// first model is reported missing. At most one retry.
    async fn generate_with_fallback(
        &self,
        variant: ModelVariant,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError> {
        let order = [variant, variant.other()];
        let mut last_err = None;

        for (attempt, candidate) in order.iter().enumerate() {
            let model = candidate.model_id(&self.config);
            match self.backend.generate(model, request).await {
                Err(GenerationError::ModelNotFound(missing)) => {
                    tracing::warn!(model = %missing, attempt, "model not found, trying other variant");
                    last_err = Some(GenerationError::ModelNotFound(missing));
                }
                other => return other,
            }
        }

        Err(last_err.unwrap_or(GenerationError::EmptyResponse))
    }
}
