// tests/sse_consensus.rs


use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use concord::consensus::{ConsensusSettings, SLOW_RESPONSE_NOTICE, TIMEOUT_MESSAGE};

/// Parse every JSON frame, leaving the literal `[DONE]` sentinel out.
fn consensus_events(frames: &[String]) -> Vec<Value> {
    frames
        .iter()
        .filter(|f| f.as_str() != "[DONE]")
        .map(|f| serde_json::from_str(f).expect("event frame"))
        .collect()
}

fn events_of<'a>(events: &'a [Value], kind: &str) -> Vec<&'a Value> {
    events.iter().filter(|e| e["type"] == kind).collect()
}

#[tokio::test]
async fn test_consensus_streams_all_models_to_final() {
    let upstream = test_helpers::spawn_mock_upstream().await;
    let (base, _state) = test_helpers::spawn_app(&upstream).await;

    let response = Client::new()
        .post(format!("{base}/api/chat/consensus"))
        .header("x-guest-api-key", "sk-guest")
        .json(&json!({
            "message": "compare sorting algorithms",
            "models": ["mock/alpha", "mock/beta"],
        }))
        .send()
        .await
        .expect("POST /api/chat/consensus");
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.text().await.expect("stream body");
    let frames = test_helpers::sse_data_frames(&body);
    assert_eq!(frames.last().map(String::as_str), Some("[DONE]"));

    let events = consensus_events(&frames);

    let start = &events[0];
    assert_eq!(start["type"], "consensus_start");
    assert_eq!(start["models"], json!(["mock/alpha", "mock/beta"]));
    assert!(
        start["responses"]
            .as_array()
            .expect("slots")
            .iter()
            .all(|r| r["isLoading"] == true)
    );

    // Two chunks per model, full text so far in each update
    assert_eq!(events_of(&events, "consensus_update").len(), 4);
    assert_eq!(events_of(&events, "consensus_complete").len(), 2);

    let titles = events_of(&events, "title_update");
    assert_eq!(titles.len(), 1);
    assert_eq!(titles[0]["title"], "Mock Title");
    assert!(
        titles[0]["conversationId"]
            .as_str()
            .expect("conversation id")
            .starts_with("guest-consensus-")
    );

    let last = events.last().expect("events");
    assert_eq!(last["type"], "consensus_final");
    let responses = last["responses"].as_array().expect("final responses");
    assert_eq!(responses.len(), 2);
    for slot in responses {
        assert_eq!(slot["content"], "Hello");
        assert!(slot.get("error").is_none());
        assert_eq!(slot["isLoading"], false);
        assert_eq!(slot["isStreaming"], false);
    }
    assert!(
        last.get("messageId").is_none(),
        "guest aggregates are not persisted"
    );
}

#[tokio::test]
async fn test_one_failing_model_does_not_sink_the_session() {
    let upstream = test_helpers::spawn_mock_upstream().await;
    let (base, _state) = test_helpers::spawn_app(&upstream).await;

    let body = Client::new()
        .post(format!("{base}/api/chat/consensus"))
        .header("x-guest-api-key", "sk-guest")
        .json(&json!({
            "message": "compare sorting algorithms",
            "models": ["mock/alpha", "mock/broken"],
        }))
        .send()
        .await
        .expect("POST /api/chat/consensus")
        .text()
        .await
        .expect("stream body");
    let frames = test_helpers::sse_data_frames(&body);
    assert_eq!(frames.last().map(String::as_str), Some("[DONE]"));

    let events = consensus_events(&frames);

    let errors = events_of(&events, "consensus_error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["model"], "mock/broken");
    assert_eq!(errors[0]["modelIndex"], 1);
    assert_eq!(errors[0]["error"], "model exploded");

    let finals = events_of(&events, "consensus_final");
    assert_eq!(finals.len(), 1);
    let responses = finals[0]["responses"].as_array().expect("responses");
    assert_eq!(responses[0]["content"], "Hello");
    assert!(responses[0].get("error").is_none());
    assert_eq!(responses[1]["error"], "model exploded");
}

#[tokio::test]
async fn test_authed_consensus_persists_aggregate() {
    let upstream = test_helpers::spawn_mock_upstream().await;
    let (base, state) = test_helpers::spawn_app(&upstream).await;

    let body = Client::new()
        .post(format!("{base}/api/chat/consensus"))
        .header("x-user-id", "user-7")
        .json(&json!({
            "message": "compare sorting algorithms",
            "models": ["deepseek/deepseek-chat-v3-0324:free", "deepseek/deepseek-r1-0528:free"],
        }))
        .send()
        .await
        .expect("POST /api/chat/consensus")
        .text()
        .await
        .expect("stream body");
    let frames = test_helpers::sse_data_frames(&body);
    let events = consensus_events(&frames);

    let finals = events_of(&events, "consensus_final");
    assert_eq!(finals.len(), 1);
    let message_id = finals[0]["messageId"].as_str().expect("persisted message id");
    assert!(!message_id.is_empty());

    let titles = events_of(&events, "title_update");
    let conversation_id = titles[0]["conversationId"]
        .as_str()
        .expect("conversation id");

    let stored = state
        .store
        .find_conversation(conversation_id, "user-7")
        .await
        .expect("lookup")
        .expect("conversation row");
    assert_eq!(
        stored.model,
        "consensus:deepseek/deepseek-chat-v3-0324:free,deepseek/deepseek-r1-0528:free"
    );
    assert_eq!(stored.title, "compare sorting algorithms");

    // The aggregate is one assistant message holding every slot
    let history = state
        .store
        .load_history(conversation_id)
        .await
        .expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, "user");
    let aggregate: Value = serde_json::from_str(&history[1].content).expect("aggregate json");
    let slots = aggregate.as_array().expect("slot array");
    assert_eq!(slots.len(), 2);
    assert!(slots.iter().all(|s| s["content"] == "Hello"));
}

#[tokio::test]
async fn test_timeout_marks_stragglers_and_finalizes() {
    let upstream = test_helpers::spawn_mock_upstream().await;
    let settings = ConsensusSettings {
        timeout: Duration::from_millis(300),
        slow_notice_after: Duration::from_secs(60),
    };
    let (base, _state) = test_helpers::spawn_app_with_settings(&upstream, settings).await;

    let body = Client::new()
        .post(format!("{base}/api/chat/consensus"))
        .header("x-guest-api-key", "sk-guest")
        .json(&json!({"message": "anyone home", "models": ["mock/hang"]}))
        .send()
        .await
        .expect("POST /api/chat/consensus")
        .text()
        .await
        .expect("stream body");
    let frames = test_helpers::sse_data_frames(&body);
    assert_eq!(frames.last().map(String::as_str), Some("[DONE]"));

    let events = consensus_events(&frames);
    let finals = events_of(&events, "consensus_final");
    assert_eq!(finals.len(), 1);
    let slot = &finals[0]["responses"][0];
    assert_eq!(slot["error"], TIMEOUT_MESSAGE);
    assert_eq!(slot["isLoading"], false);
    assert_eq!(slot["responseTime"], 300);
}

#[tokio::test]
async fn test_slow_models_trigger_a_notice() {
    let upstream = test_helpers::spawn_mock_upstream().await;
    let settings = ConsensusSettings {
        timeout: Duration::from_secs(10),
        slow_notice_after: Duration::from_millis(100),
    };
    let (base, _state) = test_helpers::spawn_app_with_settings(&upstream, settings).await;

    let body = Client::new()
        .post(format!("{base}/api/chat/consensus"))
        .header("x-guest-api-key", "sk-guest")
        .json(&json!({"message": "take your time", "models": ["mock/slow"]}))
        .send()
        .await
        .expect("POST /api/chat/consensus")
        .text()
        .await
        .expect("stream body");
    let events = consensus_events(&test_helpers::sse_data_frames(&body));

    let notices = events_of(&events, "consensus_taking_long");
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0]["message"], SLOW_RESPONSE_NOTICE);

    // The slow model still completes afterwards
    assert_eq!(events_of(&events, "consensus_complete").len(), 1);
}

#[tokio::test]
async fn test_consensus_request_validation() {
    let upstream = test_helpers::spawn_mock_upstream().await;
    let (base, _state) = test_helpers::spawn_app(&upstream).await;
    let client = Client::new();

    let response = client
        .post(format!("{base}/api/chat/consensus"))
        .header("x-guest-api-key", "sk-guest")
        .json(&json!({"message": "hi", "models": []}))
        .send()
        .await
        .expect("empty models POST");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("error body");
    assert_eq!(body["error"], "At least one model is required");

    // With the system credential every requested model must be free-tier;
    // offenders are reported together, before any stream opens
    let response = client
        .post(format!("{base}/api/chat/consensus"))
        .header("x-user-id", "user-1")
        .json(&json!({
            "message": "hi",
            "models": [
                "deepseek/deepseek-chat-v3-0324:free",
                "anthropic/claude-sonnet-4",
                "openai/gpt-4.1",
            ],
        }))
        .send()
        .await
        .expect("mixed tier POST");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("error body");
    let message = body["error"].as_str().expect("error text");
    assert!(message.contains("anthropic/claude-sonnet-4"));
    assert!(message.contains("openai/gpt-4.1"));
    assert!(!message.contains("deepseek/deepseek-chat-v3-0324:free"));
    assert!(message.contains("require an OpenRouter API key"));
}
