//! CLI `analyze` command: one-shot intent extraction.

use std::sync::Arc;

use anyhow::{Context, Result};

use intentmem::config::IntentMemConfig;
use intentmem::intent::normalize::NormalizeOptions;
use intentmem::intent::{ExtractRequest, IntentExtractor};
use intentmem::llm::{GeminiBackend, ModelVariant};

/// Build an extractor from config.
pub fn build_extractor(config: &IntentMemConfig) -> Result<IntentExtractor> {
    let backend = GeminiBackend::new(&config.generation).context("failed to build generation client")?;
    Ok(IntentExtractor::new(
        Arc::new(backend),
        config.generation.clone(),
        NormalizeOptions {
            native_token: config.ledger.native_token.clone(),
        },
    ))
}

/// Extract an intent from `text` and print it as pretty JSON on stdout.
pub async fn analyze(config: &IntentMemConfig, text: &str, model: ModelVariant) -> Result<()> {
    let extractor = build_extractor(config)?;
    let intent = extractor.extract(&ExtractRequest::new(text, model)).await;
    println!("{}", serde_json::to_string_pretty(&intent)?);
    Ok(())
}
