//! HTTP mock tests for the OpenAI client and the item sink
//!
//! Uses wiremock to stand in for the provider API and the sink endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use taskbreak::domain::{ConsolidatedTask, TaskGraph};
use taskbreak::llm::{CompletionRequest, LlmClient, LlmError, OpenAIClient, StopReason};
use taskbreak::sink::{HttpItemSink, spawn_publish};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn openai_client(server: &MockServer) -> OpenAIClient {
    OpenAIClient::new("gpt-4o-mini", "test-api-key", server.uri(), 1024, Duration::from_secs(5))
        .unwrap()
        .with_max_retries(0)
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 3}
    })
}

// =============================================================================
// OpenAI client
// =============================================================================

#[tokio::test]
async fn test_openai_completion() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-api-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 16,
            "messages": [{"role": "user", "content": "Classify this text"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("Learning")))
        .expect(1)
        .mount(&server)
        .await;

    let client = openai_client(&server);
    let response = client
        .complete(CompletionRequest::single("", "Classify this text", 16))
        .await
        .unwrap();

    assert_eq!(response.content.as_deref(), Some("Learning"));
    assert_eq!(response.stop_reason, StopReason::EndTurn);
    assert_eq!(response.usage.total(), 15);
}

#[tokio::test]
async fn test_openai_rate_limit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let err = openai_client(&server)
        .complete(CompletionRequest::single("", "hi", 16))
        .await
        .unwrap_err();

    assert!(err.is_rate_limit());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn test_openai_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let err = openai_client(&server)
        .complete(CompletionRequest::single("", "hi", 16))
        .await
        .unwrap_err();

    match err {
        LlmError::ApiError { status, message } => {
            assert_eq!(status, 500);
            assert!(message.contains("Internal Server Error"));
        }
        other => panic!("Expected ApiError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ask_rejects_empty_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("")))
        .mount(&server)
        .await;

    let client = openai_client(&server);
    let err = taskbreak::llm::ask(&client, "", "hi", 16).await.unwrap_err();
    assert!(matches!(err, LlmError::EmptyResponse));
}

// =============================================================================
// Item sink
// =============================================================================

fn graph() -> TaskGraph {
    TaskGraph {
        tasks: vec![
            ConsolidatedTask {
                id: 1,
                name_of_the_task: "Download Python".to_string(),
                description: "Get the installer".to_string(),
                dependencies: vec![],
                estimation: Some(1),
            },
            ConsolidatedTask {
                id: 2,
                name_of_the_task: "Write a CLI tool".to_string(),
                description: "Apply the basics".to_string(),
                dependencies: vec![1],
                estimation: Some(8),
            },
        ],
    }
}

#[tokio::test]
async fn test_sink_posts_one_item_per_task() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/items"))
        .and(body_partial_json(json!({
            "name_of_the_task": "Write a CLI tool",
            "task_id": 2,
            "dependencies": [1],
            "estimated_duration": 8
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let sink = HttpItemSink::new(format!("{}/items", server.uri()), Duration::from_secs(5)).unwrap();
    let published = spawn_publish(Arc::new(sink), &graph()).await.unwrap();

    assert_eq!(published, 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_sink_failures_are_counted_not_raised() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&server)
        .await;

    let sink = HttpItemSink::new(format!("{}/items", server.uri()), Duration::from_secs(5)).unwrap();
    let published = spawn_publish(Arc::new(sink), &graph()).await.unwrap();
    assert_eq!(published, 0);
}
