//! HTTP server: intent analysis, blob store proxy, health.
//!
//! Provides [`build_router`] for the routes and [`serve`] which wires up the
//! generative backend and blob gateway from config and runs until Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::IntentMemConfig;
use crate::gateway::{BlobGateway, GatewayError, WalrusStore};
use crate::intent::normalize::NormalizeOptions;
use crate::intent::prompt::{describe_activity, HistoryTurn, Personalization, MAX_ACTIVITY_ENTRIES};
use crate::intent::{ExtractRequest, IntentExtractor, TransactionIntent};
use crate::llm::{GeminiBackend, GenerativeBackend, ModelVariant};
use crate::memory::types::ActivityLogEntry;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub extractor: IntentExtractor,
    pub gateway: BlobGateway,
    pub default_epochs: u32,
}

impl AppState {
    /// Build the production state (Gemini backend, Walrus store) from config.
    pub fn from_config(config: &IntentMemConfig) -> Result<Self> {
        let backend: Arc<dyn GenerativeBackend> = Arc::new(GeminiBackend::new(&config.generation)?);
        let extractor = IntentExtractor::new(
            backend,
            config.generation.clone(),
            NormalizeOptions {
                native_token: config.ledger.native_token.clone(),
            },
        );
        let store = Arc::new(WalrusStore::new(&config.blob)?);
        let gateway = BlobGateway::new(store, config.blob.timeout());
        Ok(Self {
            extractor,
            gateway,
            default_epochs: config.blob.epochs,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/blob", get(get_blob).put(put_blob))
        .route("/health", get(health))
        .with_state(state)
}

/// Start the HTTP server and block until Ctrl-C.
pub async fn serve(config: IntentMemConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::from_config(&config)?;
    if !state.extractor.is_configured() {
        tracing::warn!("GEMINI_API_KEY not set; /api/analyze will answer with fallback replies");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "intentmem listening at http://{bind_addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    /// `"flash"` or `"pro"`; full model ids containing "pro" also select Pro.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub memory_context: Option<MemoryContext>,
    #[serde(default)]
    pub link_context: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryContext {
    #[serde(default)]
    pub ai_summary: Option<String>,
    /// Activity entries as the client stores them, or free-form strings.
    #[serde(default)]
    pub recent_activities: Vec<Value>,
}

impl MemoryContext {
    fn into_personalization(self) -> Personalization {
        let start = self.recent_activities.len().saturating_sub(MAX_ACTIVITY_ENTRIES);
        let recent_activities = self.recent_activities[start..]
            .iter()
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => serde_json::from_value::<ActivityLogEntry>(other.clone())
                    .map(|entry| describe_activity(&entry))
                    .unwrap_or_else(|_| other.to_string()),
            })
            .collect();
        Personalization {
            ai_summary: self
                .ai_summary
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            recent_activities,
            past_messages: Vec::new(),
        }
    }
}

fn parse_variant(model: Option<&str>) -> ModelVariant {
    match model {
        Some(m) => m
            .parse()
            .unwrap_or_else(|_| {
                if m.to_ascii_lowercase().contains("pro") {
                    ModelVariant::Pro
                } else {
                    ModelVariant::Flash
                }
            }),
        None => ModelVariant::default(),
    }
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> (StatusCode, Json<TransactionIntent>) {
    let request = match payload {
        Ok(Json(request)) if !request.message.trim().is_empty() => request,
        Ok(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(TransactionIntent::chat("Please type a message.")),
            )
        }
        Err(rejection) => {
            tracing::debug!(error = %rejection, "malformed analyze request");
            return (
                rejection.status(),
                Json(TransactionIntent::chat("Sorry, I couldn't read that request.")),
            );
        }
    };

    let extract = ExtractRequest {
        utterance: request.message,
        history: request.history,
        variant: parse_variant(request.model.as_deref()),
        personalization: request.memory_context.map(MemoryContext::into_personalization),
        link_context: request.link_context,
    };

    // Extraction never errors; a panic inside it is the only internal fault left.
    let extractor = state.extractor.clone();
    match tokio::spawn(async move { extractor.extract(&extract).await }).await {
        Ok(intent) => (StatusCode::OK, Json(intent)),
        Err(e) => {
            tracing::error!(error = %e, "intent extraction task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TransactionIntent::chat(
                    "Something went wrong on our side. Please try again.",
                )),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
struct PutBlobQuery {
    epochs: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GetBlobQuery {
    pointer: String,
}

fn gateway_error_response(error: &GatewayError) -> Response {
    let status = match error {
        GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

async fn put_blob(
    State(state): State<AppState>,
    Query(query): Query<PutBlobQuery>,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "empty body" }))).into_response();
    }
    let epochs = query.epochs.unwrap_or(state.default_epochs).max(1);
    match state.gateway.put_bytes(body, epochs).await {
        Ok(pointer) => Json(json!({ "pointer": pointer })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "blob put failed");
            gateway_error_response(&e)
        }
    }
}

async fn get_blob(State(state): State<AppState>, Query(query): Query<GetBlobQuery>) -> Response {
    match state.gateway.get_bytes(&query.pointer).await {
        Ok(Some(bytes)) => ([(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response(),
        Err(e) => {
            tracing::warn!(pointer = %query.pointer, error = %e, "blob get failed");
            gateway_error_response(&e)
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "generation_configured": state.extractor.is_configured(),
    }))
}
