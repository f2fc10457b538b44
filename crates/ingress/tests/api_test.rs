//! # Integration Tests for the Ingress HTTP API
//!
//! Router dijalankan di listener lokal (port acak), upstream di-mock dengan
//! wiremock, dan request dikirim dengan reqwest.

use std::time::Duration;

use chainmap_ingress::{router, AppState, IngressConfig};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(upstream: &MockServer) -> IngressConfig {
    let mut cfg = IngressConfig::default();
    cfg.gateway.base_url = upstream.uri();
    cfg.gateway.max_retries = 1;
    cfg.gateway.base_retry_delay_ms = 10;
    cfg.probe_timeout_ms = 500;
    cfg
}

async fn spawn_app(cfg: &IngressConfig) -> String {
    let state = AppState::from_config(cfg).expect("state");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.expect("serve");
    });
    format!("http://{}", addr)
}

fn http() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("client")
}

#[tokio::test]
async fn test_network_view_is_enriched() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/system-info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "blockchain": {"nodeId": "n1", "blockHeight": 3, "network": {"peersHttp": []}}
        })))
        .mount(&upstream)
        .await;

    let base = spawn_app(&test_config(&upstream)).await;
    let resp = http().get(format!("{}/api/network", base)).send().await.expect("send");
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["network"]["localNode"], json!("n1"));
    assert_eq!(body["stats"]["total"], json!(1));
    assert_eq!(body["peers"][0]["isLocal"], json!(true));
    assert_eq!(body["peers"][0]["city"], json!("Unknown"));
    assert!(body["peers"][0]["lat"].is_number());
}

#[tokio::test]
async fn test_upstream_failure_maps_to_bad_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&upstream)
        .await;

    let base = spawn_app(&test_config(&upstream)).await;

    let resp = http().get(format!("{}/api/blocks", base)).send().await.expect("send");
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["endpoint"], json!("/blocks"));
    assert_eq!(body["status"], json!(500));

    let resp = http().get(format!("{}/api/network", base)).send().await.expect("send");
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().unwrap_or_default().contains("HTTP 500"));

    let resp = http().get(format!("{}/health", base)).send().await.expect("send");
    assert_eq!(resp.status(), 503);
}

#[tokio::test]
async fn test_address_balance_forwards_body() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/address-balance"))
        .and(body_json(json!({"address": "abc"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"balance": 42})))
        .expect(1)
        .mount(&upstream)
        .await;

    let base = spawn_app(&test_config(&upstream)).await;
    let client = http();

    let resp = client
        .post(format!("{}/api/address-balance", base))
        .json(&json!({"address": " abc "}))
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["data"]["balance"], json!(42));
    assert_eq!(body["cacheHit"], json!(false));

    // kedua kali dari cache
    let resp = client
        .post(format!("{}/api/address-balance", base))
        .json(&json!({"address": "abc"}))
        .send()
        .await
        .expect("send");
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["cacheHit"], json!(true));

    let resp = client
        .post(format!("{}/api/address-balance", base))
        .json(&json!({}))
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_cache_clear_and_metrics() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&upstream)
        .await;

    let base = spawn_app(&test_config(&upstream)).await;
    let client = http();

    client.get(format!("{}/api/blocks", base)).send().await.expect("send");

    let resp = client.post(format!("{}/api/cache/clear", base)).send().await.expect("send");
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["cleared"], json!(1));

    let resp = client.get(format!("{}/health", base)).send().await.expect("send");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["status"], json!("healthy"));

    let text = client
        .get(format!("{}/metrics", base))
        .send()
        .await
        .expect("send")
        .text()
        .await
        .expect("text");
    assert!(text.contains("ingress_requests_total 3"));
    assert!(text.contains("gateway_network_calls_total 2"));
}
