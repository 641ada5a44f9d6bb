//! Completion pipeline integration tests
//!
//! Replies are produced in the background; tests wait for the pipeline to
//! settle before inspecting the transcript.

use chatline_common::Config;
use chatline_conversations::{CompletionFailure, CompletionOutcome};
use chatline_llm::{LlmError, LlmRole, MockBehavior, MockLlmService};
use std::time::Duration;
use uuid::Uuid;

use crate::common::{id_of, TestApp};

#[test_log::test(tokio::test)]
async fn test_hello_gets_hi_there() {
    let app = TestApp::with_llm(MockLlmService::replying("Hi there"));
    let owner = Uuid::new_v4();
    let conv = app.create_conversation(owner, None).await;
    let id = id_of(&conv);

    app.send_message(owner, &id, "Hello").await;
    app.settle().await;

    let messages = app.list_messages(owner, &id).await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "Hi there");
    assert_eq!(messages[1]["user_id"], owner.to_string());
    assert_eq!(messages[1]["metadata"]["type"], "text");
}

#[test_log::test(tokio::test)]
async fn test_request_window_and_settings() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let conv = app.create_conversation(owner, None).await;
    let id = id_of(&conv);

    for i in 0..6 {
        app.send_message(owner, &id, &format!("turn {}", i)).await;
        app.settle().await;
    }

    let requests = app.llm.recorded_requests();
    assert_eq!(requests.len(), 6);

    let last = requests.last().unwrap();
    assert_eq!(last.messages.len(), 10);
    assert_eq!(last.messages[9].role, LlmRole::User);
    assert_eq!(last.messages[9].content, "turn 5");
    assert_eq!(last.messages[8].role, LlmRole::Assistant);
    assert_eq!(last.max_tokens, Some(200));
    assert_eq!(last.temperature, Some(0.7));
    assert_eq!(
        last.system_prompt.as_deref(),
        Some("You are a helpful assistant. Keep responses concise.")
    );
}

#[test_log::test(tokio::test)]
async fn test_quota_failure_leaves_transcript_unchanged() {
    let app = TestApp::with_llm(MockLlmService::failing(LlmError::QuotaExceeded(
        "429 quota exceeded".into(),
    )));
    let owner = Uuid::new_v4();
    let conv = app.create_conversation(owner, None).await;
    let id = id_of(&conv);
    let mut reports = app.pipeline.subscribe();

    app.send_message(owner, &id, "Hello").await;

    let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.failure(), Some(CompletionFailure::QuotaExceeded));

    let messages = app.list_messages(owner, &id).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(app.pipeline.stats().quota_exceeded, 1);
}

#[test_log::test(tokio::test)]
async fn test_transient_failure_does_not_block_later_messages() {
    let llm = MockLlmService::new();
    llm.push_behavior(MockBehavior::Fail(LlmError::Request("connection reset".into())));
    let app = TestApp::with_llm(llm);
    let owner = Uuid::new_v4();
    let conv = app.create_conversation(owner, None).await;
    let id = id_of(&conv);

    app.send_message(owner, &id, "first").await;
    app.settle().await;
    app.send_message(owner, &id, "second").await;
    app.settle().await;

    let messages = app.list_messages(owner, &id).await;
    let roles: Vec<&str> = messages
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "user", "assistant"]);

    let stats = app.pipeline.stats();
    assert_eq!(stats.generation_error, 1);
    assert_eq!(stats.completed, 1);
}

#[test_log::test(tokio::test)]
async fn test_concurrent_messages_each_get_a_reply() {
    let llm = MockLlmService::new();
    llm.set_delay(Duration::from_millis(30));
    let app = TestApp::with_llm(llm);
    let owner = Uuid::new_v4();
    let conv = app.create_conversation(owner, None).await;
    let id = id_of(&conv);

    let (a, b) = tokio::join!(
        app.send_message(owner, &id, "alpha"),
        app.send_message(owner, &id, "beta"),
    );
    assert_ne!(a["id"], b["id"]);
    app.settle().await;

    let messages = app.list_messages(owner, &id).await;
    assert_eq!(messages.len(), 4);
    let replies: Vec<&str> = messages
        .iter()
        .filter(|m| m["role"] == "assistant")
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(replies.len(), 2);
    assert!(replies.contains(&"Mock response to: alpha"));
    assert!(replies.contains(&"Mock response to: beta"));

    let position = |content: &str| {
        messages
            .iter()
            .position(|m| m["content"] == content)
            .unwrap()
    };
    assert!(position("Mock response to: alpha") > position("alpha"));
    assert!(position("Mock response to: beta") > position("beta"));
}

#[test_log::test(tokio::test)]
async fn test_slow_completion_times_out_without_reply() {
    let llm = MockLlmService::new();
    llm.set_delay(Duration::from_secs(3));
    let config = Config {
        completion_timeout_secs: 1,
        ..Config::default()
    };
    let app = TestApp::with_config(llm, config);
    let owner = Uuid::new_v4();
    let conv = app.create_conversation(owner, None).await;
    let id = id_of(&conv);
    let mut reports = app.pipeline.subscribe();

    app.send_message(owner, &id, "are you there?").await;

    let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        report.outcome,
        CompletionOutcome::Failed {
            failure: CompletionFailure::GenerationError,
            ..
        }
    ));
    assert_eq!(app.list_messages(owner, &id).await.len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_reply_to_deleted_conversation_is_dropped() {
    let llm = MockLlmService::new();
    llm.set_delay(Duration::from_millis(50));
    let app = TestApp::with_llm(llm);
    let owner = Uuid::new_v4();
    let conv = app.create_conversation(owner, None).await;
    let id = id_of(&conv);

    app.send_message(owner, &id, "quick question").await;
    let resp = app
        .send(crate::common::authed_request(
            axum::http::Method::DELETE,
            &format!("/v1/conversations/{}", id),
            owner,
            None,
        ))
        .await;
    assert_eq!(resp.status(), axum::http::StatusCode::NO_CONTENT);
    app.settle().await;

    let stats = app.pipeline.stats();
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.generation_error, 1);
    assert_eq!(app.store.message_count().unwrap(), 0);
}
