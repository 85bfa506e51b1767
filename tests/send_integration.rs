//! Send pipeline integration tests
//!
//! Covers the full send round trip against a `wiremock` backend: request
//! body, confirmation, the single follow-up refresh and single-flight
//! behaviour.

mod common;

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use relaybox::auth::Session;
use relaybox::host::PopupKind;
use relaybox::send::SkipReason;
use relaybox::{SendError, SendOutcome};

use common::{client_for, mount_feed};

fn session(is_admin: bool) -> Session {
    Session {
        user_id: Some(1001),
        display_name: "Ann".to_string(),
        username: None,
        is_admin,
        unanswered_count: 0,
    }
}

#[tokio::test]
async fn test_send_confirms_and_refreshes_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .and(body_json(json!({ "initData": "tok", "text": "Hello" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "message_id": 42 })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/messages/sent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "message_id": 42, "text": "Hello", "is_answered": false }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/messages/inbox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, host) = client_for(&server);
    let relay = client.open(session(false), "tok");
    relay.sender().set_input("  Hello  ");
    assert_eq!(relay.sender().counter(), "9/4096");

    match relay.sender().submit_input().await.expect("send succeeds") {
        SendOutcome::Sent(confirmation) => {
            assert_eq!(confirmation.reference(), "#42");
            assert_eq!(confirmation.request.text, "Hello");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(relay.sender().input(), "");
    assert_eq!(relay.sender().counter(), "0/4096");
    assert_eq!(host.messages(), vec!["Message #42 sent!".to_string()]);

    let model = relay.view_model();
    assert_eq!(model.outbox.messages.len(), 1);
    assert_eq!(model.outbox.messages[0].id, 42);
    assert_eq!(model.compose.counter, "0/4096");
    assert!(!model.compose.sending);
    assert!(!model.compose.can_send);
}

#[tokio::test]
async fn test_concurrent_submit_is_single_flight() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "ok": true, "message_id": 1 }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_feed(&server, "/api/messages/sent", json!([])).await;
    mount_feed(&server, "/api/messages/inbox", json!([])).await;

    let (client, _host) = client_for(&server);
    let relay = client.open(session(false), "tok");
    let sender = relay.sender();

    let (first, second) = tokio::join!(sender.submit("one"), sender.submit("two"));
    assert!(matches!(first, Ok(SendOutcome::Sent(_))));
    assert_eq!(second, Ok(SendOutcome::Skipped(SkipReason::InFlight)));

    // The flag is released afterwards.
    assert!(!relay.context().is_sending());
}

#[tokio::test]
async fn test_server_rejection_keeps_input() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({ "ok": false, "error": "You are banned" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let (client, host) = client_for(&server);
    let relay = client.open(session(false), "tok");
    relay.sender().set_input("Hello");

    let err = relay.sender().submit_input().await.unwrap_err();
    assert_eq!(err, SendError::ServerRejected("You are banned".to_string()));
    assert_eq!(relay.sender().input(), "Hello");
    assert!(relay.sender().can_send());

    let popups = host.popups();
    assert_eq!(popups.len(), 1);
    assert_eq!(popups[0].kind, PopupKind::Error);
    assert_eq!(popups[0].message, "You are banned");
}

#[tokio::test]
async fn test_server_error_without_body_is_network_exception() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let (client, host) = client_for(&server);
    let relay = client.open(session(false), "tok");

    let err = relay.sender().submit("Hello").await.unwrap_err();
    assert!(matches!(err, SendError::NetworkException(_)));
    assert_eq!(host.messages(), vec!["Failed to send message".to_string()]);
}

#[tokio::test]
async fn test_blank_submit_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (client, host) = client_for(&server);
    let relay = client.open(session(false), "tok");

    let outcome = relay.sender().submit(" \n ").await.unwrap();
    assert_eq!(outcome, SendOutcome::Skipped(SkipReason::Empty));
    assert!(host.popups().is_empty());
}

#[tokio::test]
async fn test_admin_reply_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/admin/reply"))
        .and(body_json(json!({ "initData": "tok", "message_id": 9, "answer": "On its way" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;
    mount_feed(
        &server,
        "/api/messages/inbox",
        json!([{ "message_id": 9, "original_text": "Where?", "answer_text": "On its way" }]),
    )
    .await;

    let (client, host) = client_for(&server);
    let relay = client.open(session(true), "tok");

    let outcome = relay.sender().reply(9, "On its way").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Replied(ref c) if c.reference() == "#9"));
    assert_eq!(host.messages(), vec!["Answer to #9 sent!".to_string()]);

    let inbox = relay.view_model().inbox.messages;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].text, "Where?");
}

#[tokio::test]
async fn test_reply_is_refused_for_users() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (client, _host) = client_for(&server);
    let relay = client.open(session(false), "tok");
    assert_eq!(
        relay.sender().reply(9, "hi").await.unwrap_err(),
        SendError::NotPermitted
    );
}
