//! HTTP adapter tests against a mock server: handshake, the two directory
//! fetches, and history, including the malformed-entry and failure paths.

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use perch::core::config::Config;
use perch::net::http::{spawn_history_fetch, HttpClient};
use perch::net::{NetEvent, NetHandle};
use perch::store::Store;

fn config_for(server: &MockServer) -> Config {
    Config {
        token: Some("test-token".into()),
        base_url: server.uri(),
        db_path: PathBuf::from(":memory:"),
        log_level: log::LevelFilter::Info,
        retry_failed_history: false,
    }
}

/// Wait for the next event without blocking the async runtime.
async fn recv_event(rx: &mpsc::Receiver<NetEvent>) -> NetEvent {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(event) = rx.try_recv() {
            return event;
        }
        assert!(Instant::now() < deadline, "timed out waiting for net event");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn handshake_sends_bearer_token_and_extracts_url_and_self_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rtm.connect"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "url": "wss://gateway.test/socket",
            "self": {"id": "U007", "name": "me"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (tx, rx) = mpsc::channel();
    let net = NetHandle::new(&config_for(&server), tx);
    net.start();

    match recv_event(&rx).await {
        NetEvent::Handshake { socket_url, user_id } => {
            assert_eq!(socket_url, "wss://gateway.test/socket");
            assert_eq!(user_id, "U007");
        }
        _ => panic!("expected a handshake event"),
    }
}

#[tokio::test]
async fn directory_fetch_replaces_both_tables_without_duplicates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations.list"))
        .and(query_param("limit", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channels": [
                {"id": "C1", "name": "general", "is_member": true},
                {"id": "D1", "is_im": true, "user": "U1"},
                {"bogus": "no id"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users.list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "members": [
                {"id": "U1", "name": "ana"},
                {"id": "U2", "name": "bob"}
            ]
        })))
        .mount(&server)
        .await;

    let store = Store::open_in_memory().unwrap();
    let (tx, rx) = mpsc::channel();
    let mut net = NetHandle::new(&config_for(&server), tx);

    // Two hello cycles: the second replace must not duplicate anything.
    for _ in 0..2 {
        net.fetch_directory();
        for _ in 0..2 {
            let event = recv_event(&rx).await;
            net.apply_event(&store, event).unwrap();
        }
    }

    store.rebuild_conversation_list("").unwrap();
    let entries = store.list_entries(0, 10).unwrap();
    assert_eq!(entries.len(), 2);
    // the malformed channel entry was skipped; the DM resolves to its peer
    let names: Vec<&str> = entries.iter().map(|e| e.display_name.as_str()).collect();
    assert_eq!(names, vec!["ana", "general"]);
}

#[tokio::test]
async fn history_fetch_replaces_messages_and_skips_malformed_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations.history"))
        .and(query_param("channel", "C1"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "messages": [
                {"type": "message", "user": "U1", "text": "newest", "ts": "200.1"},
                {"type": "message", "user": "U1"},
                {"type": "message", "user": "U2", "text": "older", "ts": "100.1"}
            ]
        })))
        .mount(&server)
        .await;

    let store = Store::open_in_memory().unwrap();
    store
        .insert_remote_message("message", "C1", Some("U9"), "stale local copy", "1.0")
        .unwrap();

    let config = config_for(&server);
    let (tx, rx) = mpsc::channel();
    let mut net = NetHandle::new(&config, tx.clone());
    let http = HttpClient::new(config.base_url.clone(), "test-token".into());
    spawn_history_fetch(http, tx, "C1".into());

    let event = recv_event(&rx).await;
    net.apply_event(&store, event).unwrap();

    let messages = store.messages_for("C1").unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].body, "newest");
    assert_eq!(messages[1].body, "older");
}

#[tokio::test]
async fn failed_history_fetch_posts_a_failure_event() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations.history"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (tx, rx) = mpsc::channel();
    let http = HttpClient::new(server.uri(), "test-token".into());
    spawn_history_fetch(http, tx, "C1".into());

    match recv_event(&rx).await {
        NetEvent::HistoryFailed { conversation } => assert_eq!(conversation, "C1"),
        _ => panic!("expected a history-failed event"),
    }
}
