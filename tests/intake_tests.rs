//! Integration tests for webhook intake.
//!
//! Boots the full router on an ephemeral port with a stub provider API and
//! exercises both intake protocols end to end: endpoint resolution, body
//! parsing, resource fetching, signature verification, filtering, and the
//! one-log-per-delivery contract.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test intake_tests
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use reasonkit_hooks::config::AppConfig;
use reasonkit_hooks::error::FetchError;
use reasonkit_hooks::model::ResourceType;
use reasonkit_hooks::resource::ResourceFetcher;
use reasonkit_hooks::server::app_router;
use reasonkit_hooks::signature::{compute_signature, SIGNATURE_HEADER, SIGNATURE_HEADER_LEGACY};
use reasonkit_hooks::state::AppState;
use reasonkit_hooks::store::LogQuery;
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

const OWNER: &str = "owner-a";
const API_KEY: &str = "live_abcdef123456";

/// Provider API stub: answers from memory and records every call it sees.
struct StubFetcher {
    fail: bool,
    calls: Mutex<Vec<(String, String)>>,
}

impl StubFetcher {
    fn ok() -> Self {
        Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ResourceFetcher for StubFetcher {
    async fn fetch(
        &self,
        api_key: &str,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<Value, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((api_key.to_string(), resource_id.to_string()));
        if self.fail {
            return Err(FetchError::Api {
                status: 404,
                message: format!("No such resource: {}", resource_id),
            });
        }
        Ok(json!({
            "id": resource_id,
            "object": resource_type.as_str(),
            "amount": 4200,
            "status": "succeeded"
        }))
    }
}

struct TestApp {
    base: String,
    client: reqwest::Client,
    state: Arc<AppState>,
    fetcher: Arc<StubFetcher>,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn log_count(&self) -> usize {
        self.state
            .store()
            .query_logs(OWNER, &LogQuery::default())
            .pagination
            .total
    }

    async fn create_credential(&self) -> String {
        let resp = self
            .client
            .post(self.url("/api/credentials"))
            .header("x-owner-id", OWNER)
            .json(&json!({"label": "Live", "apiKey": API_KEY}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    async fn create_endpoint(&self, body: Value) -> Value {
        let resp = self
            .client
            .post(self.url("/api/endpoints"))
            .header("x-owner-id", OWNER)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    /// Deliver a classic form-encoded webhook to the endpoint's intake URL
    async fn post_classic(&self, endpoint: &Value, body: &str) -> reqwest::Response {
        self.client
            .post(endpoint["intakeUrl"].as_str().unwrap())
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }

    /// Deliver a nextgen JSON webhook, optionally signed
    async fn post_nextgen(
        &self,
        endpoint: &Value,
        body: &str,
        signature: Option<&str>,
    ) -> reqwest::Response {
        let mut req = self
            .client
            .post(endpoint["intakeUrl"].as_str().unwrap())
            .header("content-type", "application/json")
            .body(body.to_string());
        if let Some(sig) = signature {
            req = req.header(SIGNATURE_HEADER, sig);
        }
        req.send().await.unwrap()
    }

    async fn fetch_endpoint(&self, id: &str) -> Value {
        let resp = self
            .client
            .get(self.url(&format!("/api/endpoints/{}", id)))
            .header("x-owner-id", OWNER)
            .send()
            .await
            .unwrap();
        resp.json().await.unwrap()
    }
}

async fn spawn_app_with(fetcher: StubFetcher) -> TestApp {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = AppConfig {
        encryption_key: "integration-test-master-key".to_string(),
        public_url: format!("http://{}", addr),
        max_concurrent_forwards: 4,
        provider_api_base: "http://127.0.0.1:9".to_string(),
        cors_origins: Vec::new(),
    };
    let fetcher = Arc::new(fetcher);
    let state = Arc::new(AppState::new(config).unwrap().with_fetcher(fetcher.clone()));

    let router = app_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        state,
        fetcher,
    }
}

async fn spawn_app() -> TestApp {
    spawn_app_with(StubFetcher::ok()).await
}

// ============================================================================
// Endpoint resolution
// ============================================================================

#[tokio::test]
async fn test_unknown_endpoint_is_404_and_unlogged() {
    let app = spawn_app().await;

    let resp = app
        .client
        .post(app.url(&format!(
            "/api/webhooks/classic/{}/{}",
            OWNER,
            Uuid::new_v4()
        )))
        .body("id=tr_123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "Endpoint not found");
    assert_eq!(app.log_count(), 0);
}

#[tokio::test]
async fn test_kind_mismatch_is_indistinguishable_from_missing() {
    let app = spawn_app().await;
    let endpoint = app
        .create_endpoint(json!({"name": "Shop", "kind": "classic"}))
        .await;

    // Same endpoint id, wrong protocol segment
    let url = endpoint["intakeUrl"]
        .as_str()
        .unwrap()
        .replace("/classic/", "/nextgen/");
    let resp = app
        .client
        .post(url)
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.log_count(), 0);
}

#[tokio::test]
async fn test_disabled_endpoint_is_403_and_unlogged() {
    let app = spawn_app().await;
    let endpoint = app
        .create_endpoint(json!({"name": "Shop", "kind": "classic"}))
        .await;
    let id = endpoint["id"].as_str().unwrap();

    let resp = app
        .client
        .patch(app.url(&format!("/api/endpoints/{}", id)))
        .header("x-owner-id", OWNER)
        .json(&json!({"isEnabled": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.post_classic(&endpoint, "id=tr_123").await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Endpoint is disabled");
    assert_eq!(app.log_count(), 0);
}

#[tokio::test]
async fn test_get_intake_reports_protocol() {
    let app = spawn_app().await;
    let endpoint = app
        .create_endpoint(json!({"name": "Events", "kind": "nextgen"}))
        .await;

    let resp = app
        .client
        .get(endpoint["intakeUrl"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["message"], "Webhook endpoint active (nextgen protocol)");
}

// ============================================================================
// Classic protocol
// ============================================================================

#[tokio::test]
async fn test_classic_delivery_fetches_and_logs() {
    let app = spawn_app().await;
    let credential_id = app.create_credential().await;
    let endpoint = app
        .create_endpoint(json!({
            "name": "Shop",
            "kind": "classic",
            "credentialId": credential_id
        }))
        .await;

    let resp = app.post_classic(&endpoint, "id=tr_123&livemode=true").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack, json!({"ok": true}));

    let page = app.state.store().query_logs(OWNER, &LogQuery::default());
    assert_eq!(page.pagination.total, 1);
    let log = &page.logs[0];
    assert_eq!(log.status.as_str(), "success");
    assert_eq!(log.resource_id.as_deref(), Some("tr_123"));
    assert_eq!(log.resource_type, Some(ResourceType::Payment));
    let fetched = log.fetched_resource.as_ref().unwrap();
    assert_eq!(fetched["amount"], 4200);

    // The stub saw the decrypted credential, not ciphertext
    let calls = app.fetcher.calls.lock().unwrap();
    assert_eq!(calls.as_slice(), &[(API_KEY.to_string(), "tr_123".to_string())]);
    drop(calls);

    let reloaded = app.fetch_endpoint(endpoint["id"].as_str().unwrap()).await;
    assert_eq!(reloaded["totalReceived"], 1);
    assert!(reloaded["lastReceivedAt"].is_string());
}

#[tokio::test]
async fn test_classic_missing_id_logs_invalid() {
    let app = spawn_app().await;
    let endpoint = app
        .create_endpoint(json!({"name": "Shop", "kind": "classic"}))
        .await;

    let resp = app.post_classic(&endpoint, "livemode=true").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "Missing or invalid resource id");

    let page = app.state.store().query_logs(OWNER, &LogQuery::default());
    assert_eq!(page.pagination.total, 1);
    assert_eq!(page.logs[0].status.as_str(), "invalid");
    assert_eq!(
        page.logs[0].error.as_deref(),
        Some("Missing or invalid resource id")
    );

    let reloaded = app.fetch_endpoint(endpoint["id"].as_str().unwrap()).await;
    assert_eq!(reloaded["totalReceived"], 0, "invalid deliveries do not count");
}

#[tokio::test]
async fn test_classic_without_credential_logs_fetch_failed() {
    let app = spawn_app().await;
    let endpoint = app
        .create_endpoint(json!({"name": "Shop", "kind": "classic"}))
        .await;

    let resp = app.post_classic(&endpoint, "id=tr_123").await;
    // Still acknowledged; the provider must not retry over our config gap
    assert_eq!(resp.status(), StatusCode::OK);

    let page = app.state.store().query_logs(OWNER, &LogQuery::default());
    assert_eq!(page.pagination.total, 1);
    let log = &page.logs[0];
    assert_eq!(log.status.as_str(), "fetch_failed");
    assert_eq!(
        log.error.as_deref(),
        Some("No API key configured for endpoint")
    );
    assert!(log.fetched_resource.is_none());
    assert!(app.fetcher.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_classic_provider_failure_logs_fetch_failed() {
    let app = spawn_app_with(StubFetcher::failing()).await;
    let credential_id = app.create_credential().await;
    let endpoint = app
        .create_endpoint(json!({
            "name": "Shop",
            "kind": "classic",
            "credentialId": credential_id
        }))
        .await;

    let resp = app.post_classic(&endpoint, "id=tr_gone").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let page = app.state.store().query_logs(OWNER, &LogQuery::default());
    let log = &page.logs[0];
    assert_eq!(log.status.as_str(), "fetch_failed");
    let error = log.error.as_deref().unwrap();
    assert!(error.contains("404"), "error should carry the provider status: {}", error);
    assert!(error.contains("tr_gone"));
}

#[tokio::test]
async fn test_classic_resource_filter_drops_silently() {
    let app = spawn_app().await;
    let credential_id = app.create_credential().await;
    let endpoint = app
        .create_endpoint(json!({
            "name": "Shop",
            "kind": "classic",
            "credentialId": credential_id,
            "resourceTypeFilter": ["payment", "refund"]
        }))
        .await;

    let resp = app.post_classic(&endpoint, "id=ord_555").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"ok": true, "filtered": true}));

    assert_eq!(app.log_count(), 0, "filtered deliveries leave no trace");
    assert!(app.fetcher.calls.lock().unwrap().is_empty());

    // A matching type still flows through
    let resp = app.post_classic(&endpoint, "id=tr_1").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(app.log_count(), 1);
}

// ============================================================================
// Nextgen protocol
// ============================================================================

#[tokio::test]
async fn test_nextgen_valid_signature_logs_success() {
    let app = spawn_app().await;
    let endpoint = app
        .create_endpoint(json!({
            "name": "Events",
            "kind": "nextgen",
            "sharedSecret": "whsec_abc"
        }))
        .await;

    let payload =
        r#"{"id":"evt_1","type":"payment.succeeded","data":{"object":{"id":"tr_9"}}}"#;
    let signature = compute_signature("whsec_abc", payload.as_bytes());

    let resp = app.post_nextgen(&endpoint, payload, Some(&signature)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack, json!({"ok": true, "signatureValid": true}));

    let page = app.state.store().query_logs(OWNER, &LogQuery::default());
    let log = &page.logs[0];
    assert_eq!(log.status.as_str(), "success");
    assert_eq!(log.event_type.as_deref(), Some("payment.succeeded"));
    assert_eq!(log.signature_valid, Some(true));
    assert_eq!(log.signature_header.as_deref(), Some(signature.as_str()));
    assert_eq!(log.raw_body.as_deref(), Some(payload));

    let reloaded = app.fetch_endpoint(endpoint["id"].as_str().unwrap()).await;
    assert_eq!(reloaded["totalReceived"], 1);
}

#[tokio::test]
async fn test_nextgen_legacy_header_accepted() {
    let app = spawn_app().await;
    let endpoint = app
        .create_endpoint(json!({
            "name": "Events",
            "kind": "nextgen",
            "sharedSecret": "whsec_abc"
        }))
        .await;

    let payload = r#"{"id":"evt_2","type":"order.created"}"#;
    let signature = compute_signature("whsec_abc", payload.as_bytes());
    let resp = app
        .client
        .post(endpoint["intakeUrl"].as_str().unwrap())
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER_LEGACY, &signature)
        .body(payload)
        .send()
        .await
        .unwrap();

    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack["signatureValid"], true);
}

#[tokio::test]
async fn test_nextgen_bad_signature_acknowledged_but_flagged() {
    let app = spawn_app().await;
    let endpoint = app
        .create_endpoint(json!({
            "name": "Events",
            "kind": "nextgen",
            "sharedSecret": "whsec_abc"
        }))
        .await;

    let payload = r#"{"id":"evt_3","type":"payment.succeeded"}"#;
    let resp = app
        .post_nextgen(&endpoint, payload, Some("deadbeef"))
        .await;
    // 200, never 401: a retry storm helps nobody
    assert_eq!(resp.status(), StatusCode::OK);
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack["ok"], true);
    assert_eq!(ack["signatureValid"], false);
    assert_eq!(ack["warning"], "Signature verification failed");

    let page = app.state.store().query_logs(OWNER, &LogQuery::default());
    assert_eq!(page.pagination.total, 1);
    assert_eq!(page.logs[0].status.as_str(), "signature_failed");
    assert_eq!(page.logs[0].signature_valid, Some(false));

    let reloaded = app.fetch_endpoint(endpoint["id"].as_str().unwrap()).await;
    assert_eq!(reloaded["totalReceived"], 0);
}

#[tokio::test]
async fn test_nextgen_missing_signature_header() {
    let app = spawn_app().await;
    let endpoint = app
        .create_endpoint(json!({
            "name": "Events",
            "kind": "nextgen",
            "sharedSecret": "whsec_abc"
        }))
        .await;

    let resp = app
        .post_nextgen(&endpoint, r#"{"id":"evt_4"}"#, None)
        .await;
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack["signatureValid"], false);
    assert_eq!(ack["warning"], "Missing signature header");
}

#[tokio::test]
async fn test_nextgen_invalid_json_is_400() {
    let app = spawn_app().await;
    let endpoint = app
        .create_endpoint(json!({"name": "Events", "kind": "nextgen"}))
        .await;

    let resp = app.post_nextgen(&endpoint, "{not json", None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid JSON payload");

    let page = app.state.store().query_logs(OWNER, &LogQuery::default());
    assert_eq!(page.pagination.total, 1);
    assert_eq!(page.logs[0].status.as_str(), "invalid");
}

#[tokio::test]
async fn test_nextgen_event_filter_applies_to_verified_only() {
    let app = spawn_app().await;
    let endpoint = app
        .create_endpoint(json!({
            "name": "Events",
            "kind": "nextgen",
            "sharedSecret": "whsec_abc",
            "eventTypeFilter": ["payment.succeeded"]
        }))
        .await;

    // Verified but filtered: silent drop
    let payload = r#"{"id":"evt_5","type":"payment.failed"}"#;
    let signature = compute_signature("whsec_abc", payload.as_bytes());
    let resp = app.post_nextgen(&endpoint, payload, Some(&signature)).await;
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack, json!({"ok": true, "filtered": true}));
    assert_eq!(app.log_count(), 0);

    // Unverified traffic bypasses the filter and is always logged
    let resp = app.post_nextgen(&endpoint, payload, Some("deadbeef")).await;
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack["signatureValid"], false);
    assert_eq!(app.log_count(), 1);

    let page = app.state.store().query_logs(OWNER, &LogQuery::default());
    assert_eq!(page.logs[0].status.as_str(), "signature_failed");
}

#[tokio::test]
async fn test_nextgen_event_filter_skips_untyped_payloads() {
    let app = spawn_app().await;
    let endpoint = app
        .create_endpoint(json!({
            "name": "Events",
            "kind": "nextgen",
            "sharedSecret": "whsec_abc",
            "eventTypeFilter": ["payment.succeeded"]
        }))
        .await;

    // Verified payload carrying no type/event/eventType field: there is
    // nothing to match, so the allow-list must not swallow it
    let payload = r#"{"id":"evt_6","data":{"object":{"id":"tr_7"}}}"#;
    let signature = compute_signature("whsec_abc", payload.as_bytes());
    let resp = app.post_nextgen(&endpoint, payload, Some(&signature)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ack: Value = resp.json().await.unwrap();
    assert_eq!(ack, json!({"ok": true, "signatureValid": true}));

    let page = app.state.store().query_logs(OWNER, &LogQuery::default());
    assert_eq!(
        page.pagination.total, 1,
        "untyped deliveries are still audited"
    );
    assert_eq!(page.logs[0].status.as_str(), "success");
    assert!(page.logs[0].event_type.is_none());

    let reloaded = app.fetch_endpoint(endpoint["id"].as_str().unwrap()).await;
    assert_eq!(reloaded["totalReceived"], 1);
}
