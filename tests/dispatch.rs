//! Chat dispatch and backend client integration tests

use std::sync::Arc;
use std::time::Duration;

use voice_shell::{
    BackendClient, ChatBackend, ChatDispatcher, ChatHistory, ChatSender, Error, WakeWordBackend,
};

mod common;

use common::{CHAT_ERROR, Reply};

fn client(base_url: &str) -> Arc<BackendClient> {
    Arc::new(BackendClient::new(base_url, Duration::from_secs(5)).expect("client builds"))
}

#[tokio::test]
async fn test_dispatch_posts_message_and_records_reply() {
    let (url, mut seen) = common::serve_http(vec![Reply::json(
        200,
        r#"{"response":"It is 3 PM."}"#,
    )])
    .await;

    let history = ChatHistory::new();
    let dispatcher = ChatDispatcher::new(client(&url), history.clone(), CHAT_ERROR);
    dispatcher.send(" what time is it ", true).await;

    let request = seen.recv().await.unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/chat");
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "message": "what time is it", "speak_response": true })
    );

    let entries = history.snapshot();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].sender, ChatSender::User);
    assert_eq!(entries[0].text, "what time is it");
    assert_eq!(entries[1].sender, ChatSender::Assistant);
    assert_eq!(entries[1].text, "It is 3 PM.");
}

#[tokio::test]
async fn test_server_error_becomes_error_entry() {
    let (url, _seen) = common::serve_http(vec![
        Reply::json(500, r#"{"detail":"boom"}"#),
        Reply::json(200, r#"{"response":"recovered"}"#),
    ])
    .await;

    let history = ChatHistory::new();
    let dispatcher = ChatDispatcher::new(client(&url), history.clone(), CHAT_ERROR);

    dispatcher.send("first", false).await;
    dispatcher.send("second", false).await;

    let texts: Vec<String> = history.snapshot().into_iter().map(|e| e.text).collect();
    assert_eq!(texts, vec!["first", CHAT_ERROR, "second", "recovered"]);
}

#[tokio::test]
async fn test_unreachable_backend_never_fails_dispatch() {
    // Nothing listens on the discard port
    let history = ChatHistory::new();
    let backend = Arc::new(
        BackendClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap(),
    );
    let dispatcher = ChatDispatcher::new(backend, history.clone(), CHAT_ERROR);

    dispatcher.send("hello?", false).await;

    let entries = history.snapshot();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].sender, ChatSender::Assistant);
    assert_eq!(entries[1].text, CHAT_ERROR);
}

#[tokio::test]
async fn test_malformed_reply_is_an_error() {
    let (url, _seen) = common::serve_http(vec![Reply::json(200, r#"{"text":"wrong shape"}"#)]).await;

    let request = voice_shell::ChatRequest {
        message: "hi".to_string(),
        speak_response: false,
    };
    assert!(client(&url).chat(&request).await.is_err());
}

#[tokio::test]
async fn test_wake_word_control_endpoints() {
    let (url, mut seen) = common::serve_http(vec![
        Reply::json(200, r#"{"status":"started"}"#),
        Reply::json(503, r#"{"detail":"no microphone"}"#),
    ])
    .await;
    let client = client(&url);

    client.start_detection().await.unwrap();
    let start = seen.recv().await.unwrap();
    assert_eq!((start.method.as_str(), start.path.as_str()), ("POST", "/api/wake-word/start"));

    let err = client.stop_detection().await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 503, .. }), "got {err:?}");
    let stop = seen.recv().await.unwrap();
    assert_eq!(stop.path, "/api/wake-word/stop");
}

#[tokio::test]
async fn test_status_probes() {
    let (url, mut seen) = common::serve_http(vec![
        Reply::json(200, r#"{"status":"ok","model":"llama3"}"#),
        Reply::json(200, r#"{"active":true,"keyword":"jarvis"}"#),
    ])
    .await;
    let client = client(&url);

    let status = client.status().await.unwrap();
    assert_eq!(status["status"], "ok");
    assert_eq!(seen.recv().await.unwrap().path, "/api/status");

    let wake = client.wake_word_status().await.unwrap();
    assert!(wake.active);
    assert_eq!(wake.keyword.as_deref(), Some("jarvis"));
    assert_eq!(seen.recv().await.unwrap().path, "/api/wake-word/status");
}
