mod helpers;

use helpers::{test_extractor, ScriptedBackend};
use intentmem::intent::locale::{fallback_text, FallbackReason, Locale};
use intentmem::intent::prompt::HistoryTurn;
use intentmem::intent::{ActionType, ExtractRequest, IntentKind, TransactionIntent};
use intentmem::llm::{GenerationError, ModelVariant};
use intentmem::memory::types::ChatRole;

const TRANSFER_JSON: &str = r#"{"type":"TRANSACTION","summary":"Sending 5 SUI to Mira","data":{"action_type":"TRANSFER","params":{"amount":"5","token":"SUI","recipient":"Mira"}}}"#;

async fn extract_from(output: &str, utterance: &str) -> TransactionIntent {
    let backend = ScriptedBackend::always(output);
    let extractor = test_extractor(backend);
    extractor
        .extract(&ExtractRequest::new(utterance, ModelVariant::Flash))
        .await
}

fn assert_schema_valid(intent: &TransactionIntent) {
    assert!(!intent.summary.trim().is_empty());
    let value = serde_json::to_value(intent).unwrap();
    assert!(value["data"]["params"].is_object(), "params always present: {value}");
    let back: TransactionIntent = serde_json::from_value(value).unwrap();
    assert_eq!(&back, intent);
}

#[tokio::test]
async fn malformed_outputs_always_yield_schema_valid_intents() {
    let outputs = [
        format!("```json\n{TRANSFER_JSON}\n```"),
        format!("```JSON\n{TRANSFER_JSON}```"),
        format!("Sure! Here is the intent you asked for:\n{TRANSFER_JSON}\nLet me know."),
        TRANSFER_JSON[..TRANSFER_JSON.len() - 3].to_string(),
        r#"{"type": "CHAT", "summary": "hello there friend"]]"#.to_string(),
        r#"{"type": "CHAT", "summary": "a reply that never"#.to_string(),
        String::new(),
        "   ".to_string(),
        "I cannot help with that request, sorry.".to_string(),
        "[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]".to_string(),
        r#"{"summary": 42, "type": "TRANSACTION", "data": "oops"}"#.to_string(),
        "\u{0}\u{1}garbage{{{{]]]]\"\"\"".to_string(),
    ];

    for output in &outputs {
        let intent = extract_from(output, "send 5 sui to mira").await;
        assert_schema_valid(&intent);
    }
}

#[tokio::test]
async fn fenced_and_prose_wrapped_outputs_parse() {
    for output in [
        format!("```json\n{TRANSFER_JSON}\n```"),
        format!("Here you go: {TRANSFER_JSON} Anything else?"),
    ] {
        let intent = extract_from(&output, "send 5 sui to mira").await;
        assert_eq!(intent.kind, IntentKind::Transaction);
        assert_eq!(intent.action_type(), ActionType::Transfer);
        assert_eq!(intent.params().recipient.as_deref(), Some("Mira"));
    }
}

#[tokio::test]
async fn truncated_transfer_is_repaired() {
    let truncated = r#"{"type":"TRANSACTION","summary":"Sending 5 SUI to Mira","data":{"action_type":"TRANSFER","params":{"amount":"5","token":"SUI","recipient":"Mira","#;
    let intent = extract_from(truncated, "send 5 sui to mira").await;

    assert_eq!(intent.kind, IntentKind::Transaction);
    assert_eq!(intent.action_type(), ActionType::Transfer);
    let params = intent.params();
    assert_eq!(params.amount.as_deref(), Some("5"));
    assert_eq!(params.token, None, "native token is normalized to null");
    assert_eq!(params.recipient.as_deref(), Some("Mira"));
}

#[tokio::test]
async fn truncated_inside_string_is_closed() {
    let truncated = r#"{"type":"TRANSACTION","summary":"Sending 5 SUI","data":{"action_type":"TRANSFER","params":{"amount":"5","recipient":"Mir"#;
    let intent = extract_from(truncated, "send 5 sui to mira").await;
    assert_eq!(intent.action_type(), ActionType::Transfer);
    assert_eq!(intent.params().recipient.as_deref(), Some("Mir"));
}

#[tokio::test]
async fn legacy_to_key_becomes_recipient() {
    let output = r#"{"type":"transaction","summary":"Sending 2 USDC to Bob","data":{"action_type":"transfer","params":{"amount":2,"token":"USDC","to":"Bob"}}}"#;
    let intent = extract_from(output, "send 2 usdc to bob").await;

    assert_eq!(intent.kind, IntentKind::Transaction);
    assert_eq!(intent.action_type(), ActionType::Transfer);
    let params = intent.params();
    assert_eq!(params.recipient.as_deref(), Some("Bob"));
    assert_eq!(params.amount.as_deref(), Some("2"));
    assert_eq!(params.token.as_deref(), Some("USDC"));

    let value = serde_json::to_value(&intent).unwrap();
    assert!(value["data"]["params"].get("to").is_none());
}

#[tokio::test]
async fn garbage_falls_back_to_localized_chat() {
    let intent = extract_from("no json here at all, just words", "send money please").await;
    assert_eq!(intent.kind, IntentKind::Chat);
    assert_eq!(intent.action_type(), ActionType::None);
    assert_eq!(
        intent.summary,
        fallback_text(FallbackReason::Unclear, Locale::English)
    );

    let intent = extract_from("", "chuyển tiền cho mẹ").await;
    assert_eq!(
        intent.summary,
        fallback_text(FallbackReason::Unclear, Locale::Vietnamese)
    );
}

#[tokio::test]
async fn generation_faults_map_to_fallback_replies() {
    let cases = [
        (GenerationError::RateLimited, FallbackReason::RateLimited),
        (GenerationError::Transport("connection reset".into()), FallbackReason::Busy),
        (GenerationError::EmptyResponse, FallbackReason::Unclear),
    ];
    for (error, reason) in cases {
        let backend = ScriptedBackend::new(vec![Err(error)]);
        let intent = test_extractor(backend.clone())
            .extract(&ExtractRequest::new("send 1 sui to ali", ModelVariant::Flash))
            .await;
        assert_eq!(intent.kind, IntentKind::Chat);
        assert_eq!(intent.summary, fallback_text(reason, Locale::English));
        assert_eq!(backend.calls(), 1, "no retry for {reason:?}");
    }
}

#[tokio::test]
async fn missing_model_retries_other_variant_once() {
    let backend = ScriptedBackend::new(vec![
        Err(GenerationError::ModelNotFound("pro".into())),
        Ok(TRANSFER_JSON.to_string()),
    ]);
    let intent = test_extractor(backend.clone())
        .extract(&ExtractRequest::new("send 5 sui to mira", ModelVariant::Pro))
        .await;
    assert_eq!(intent.action_type(), ActionType::Transfer);

    let models = backend.models.lock().unwrap().clone();
    assert_eq!(models.len(), 2);
    assert_ne!(models[0], models[1]);
}

#[tokio::test]
async fn prompt_carries_recent_history_only() {
    let backend = ScriptedBackend::always(TRANSFER_JSON);
    let mut request = ExtractRequest::new("and 5 more to mira", ModelVariant::Flash);
    request.history = (0..8)
        .map(|i| HistoryTurn {
            role: ChatRole::User,
            content: format!("turn-{i}"),
        })
        .collect();
    test_extractor(backend.clone()).extract(&request).await;

    let prompt = backend.last_prompt().unwrap();
    assert!(prompt.contains("and 5 more to mira"));
    assert!(!prompt.contains("turn-2"));
    assert!(prompt.contains("turn-3"));
    assert!(prompt.contains("turn-7"));
}
