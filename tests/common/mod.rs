use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use relaybox::host::{HostBridge, Popup};
use relaybox::{Config, RelayClient};

/// Host that keeps every popup for later inspection
#[derive(Debug, Default)]
pub struct RecordingHost {
    popups: Mutex<Vec<Popup>>,
}

#[allow(dead_code)]
impl RecordingHost {
    pub fn popups(&self) -> Vec<Popup> {
        self.popups.lock().expect("popup lock").clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.popups().into_iter().map(|p| p.message).collect()
    }
}

impl HostBridge for RecordingHost {
    fn show_popup(&self, popup: Popup) {
        self.popups.lock().expect("popup lock").push(popup);
    }
}

/// Configuration pointing at a mock server, without retries or telemetry
pub fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.auth.retry_attempts = 0;
    config.telemetry.enabled = false;
    config
}

#[allow(dead_code)]
pub fn client_for(server: &MockServer) -> (RelayClient, Arc<RecordingHost>) {
    client_with(config_for(server))
}

#[allow(dead_code)]
pub fn client_with(config: Config) -> (RelayClient, Arc<RecordingHost>) {
    let host = Arc::new(RecordingHost::default());
    let client = RelayClient::from_config(config, host.clone()).expect("client should build");
    (client, host)
}

#[allow(dead_code)]
pub fn auth_ok(first_name: &str, is_admin: bool, unanswered: u32) -> Value {
    json!({
        "ok": true,
        "user": {
            "id": 1001,
            "first_name": first_name,
            "username": "ann_k",
            "is_admin": is_admin,
            "unanswered": unanswered
        }
    })
}

/// Accept every auth strategy with the given body
#[allow(dead_code)]
pub async fn mount_auth(server: &MockServer, body: Value) {
    Mock::given(path("/api/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub async fn mount_feed(server: &MockServer, feed_path: &str, messages: Value) {
    Mock::given(method("GET"))
        .and(path(feed_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": messages })))
        .mount(server)
        .await;
}
