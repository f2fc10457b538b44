//! # Integration Tests for PeerFanoutAggregator
//!
//! Upstream dan setiap peer adalah wiremock server terpisah.
//!
//! ## Test Categories
//!
//! 1. Scenario: lokal + peer online + peer timeout
//! 2. Isolation: peer yang hang tidak menunda agregasi
//! 3. Dedup: record lokal menang atas klaim peer
//! 4. Edge cases: peer kosong, upstream gagal, response peer rusak

use std::sync::Arc;
use std::time::{Duration, Instant};

use chainmap_gateway::{GatewayConfig, RetryingGatewayClient};
use chainmap_ingress::{AggregationError, IngressMetrics, PeerFanoutAggregator, PeerStatus};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

async fn mount_system_info(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/system-info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn aggregator_for(upstream: &MockServer) -> (PeerFanoutAggregator, Arc<IngressMetrics>) {
    let mut cfg = GatewayConfig::with_base_url(upstream.uri());
    cfg.max_retries = 1;
    cfg.base_retry_delay_ms = 10;
    let gateway = RetryingGatewayClient::new(cfg).expect("gateway");
    let metrics = Arc::new(IngressMetrics::new());
    let aggregator =
        PeerFanoutAggregator::new(gateway, PROBE_TIMEOUT, metrics.clone()).expect("aggregator");
    (aggregator, metrics)
}

// ════════════════════════════════════════════════════════════════════════════
// SCENARIO
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_local_online_peer_and_timed_out_peer() {
    let upstream = MockServer::start().await;
    let p1 = MockServer::start().await;
    let p2 = MockServer::start().await;

    mount_system_info(
        &upstream,
        json!({
            "blockchain": {
                "nodeId": "n1",
                "httpUrl": upstream.uri(),
                "blockHeight": 0,
                "network": {
                    "peersHttp": [p1.uri(), p2.uri()],
                    "peersP2P": ["p2p://p1", "p2p://p2"]
                }
            }
        }),
    )
    .await;
    mount_system_info(
        &p1,
        json!({"blockchain": {"blockHeight": 10, "difficulty": 3, "network": {"peersHttp": ["a"]}}}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/system-info"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"blockchain": {"blockHeight": 99}}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&p2)
        .await;

    let (aggregator, metrics) = aggregator_for(&upstream);
    let view = aggregator.build_network_view().await.expect("view");

    assert!(view.success);
    assert_eq!(view.peers.len(), 3);

    let local = &view.peers[0];
    assert!(local.is_local);
    assert_eq!(local.node_id, "n1");
    assert_eq!(local.status, PeerStatus::Online);
    assert_eq!(local.response_time, 0);

    let online = &view.peers[1];
    assert_eq!(online.http_url, p1.uri());
    assert_eq!(online.node_id, format!("node-{}", p1.address().port()));
    assert_eq!(online.status, PeerStatus::Online);
    assert_eq!(online.block_height, 10);
    assert_eq!(online.difficulty, 3);
    assert_eq!(online.peer_count, 1);
    assert_eq!(online.p2p_url, "p2p://p1");
    assert!(online.error.is_none());

    let offline = &view.peers[2];
    assert_eq!(offline.node_id, format!("node-{}", p2.address().port()));
    assert_eq!(offline.status, PeerStatus::Offline);
    assert_eq!(offline.block_height, 0);
    assert_eq!(offline.p2p_url, "p2p://p2");
    assert!(offline.error.as_deref().unwrap_or_default().contains("timed out"));
    assert!(offline.response_time >= PROBE_TIMEOUT.as_millis() as u64);

    assert_eq!(view.stats.total, 3);
    assert_eq!(view.stats.online, 2);
    assert_eq!(view.stats.offline, 1);
    assert_eq!(view.stats.max_block_height, 10);
    assert_eq!(view.stats.min_block_height, 10);

    assert_eq!(view.network.local_node, "n1");
    assert_eq!(view.network.total_peers, 2);
    assert_eq!(view.network.p2p_connections, 2);

    assert_eq!(metrics.peer_probes_total.get(), 2);
    assert_eq!(metrics.peer_probe_failures.get(), 1);
}

#[tokio::test]
async fn test_hung_peer_does_not_delay_beyond_its_timeout() {
    let upstream = MockServer::start().await;
    let fast = MockServer::start().await;
    let hung = MockServer::start().await;

    mount_system_info(
        &upstream,
        json!({"blockchain": {"nodeId": "n1", "network": {"peersHttp": [hung.uri(), fast.uri()]}}}),
    )
    .await;
    mount_system_info(&fast, json!({"blockchain": {"blockHeight": 4}})).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&hung)
        .await;

    let (aggregator, _) = aggregator_for(&upstream);
    let started = Instant::now();
    let view = aggregator.build_network_view().await.expect("view");

    assert!(started.elapsed() < Duration::from_secs(3));
    // urutan input dipertahankan
    assert_eq!(view.peers[1].status, PeerStatus::Offline);
    assert_eq!(view.peers[2].status, PeerStatus::Online);
    assert_eq!(view.peers[2].block_height, 4);
}

// ════════════════════════════════════════════════════════════════════════════
// DEDUP
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_local_record_wins_over_self_referential_peer() {
    let upstream = MockServer::start().await;
    let self_claim = format!("{}/", upstream.uri());

    mount_system_info(
        &upstream,
        json!({
            "blockchain": {
                "nodeId": "n1",
                "httpUrl": upstream.uri(),
                "blockHeight": 21,
                "network": {"peersHttp": [{"httpUrl": self_claim, "nodeId": "remote-claim"}]}
            }
        }),
    )
    .await;

    let (aggregator, _) = aggregator_for(&upstream);
    let view = aggregator.build_network_view().await.expect("view");

    assert_eq!(view.peers.len(), 1);
    assert!(view.peers[0].is_local);
    assert_eq!(view.peers[0].node_id, "n1");
    assert_eq!(view.stats.total, 1);
    assert_eq!(view.network.total_peers, 1);
}

#[tokio::test]
async fn test_structured_peer_node_id_and_p2p_mismatch() {
    let upstream = MockServer::start().await;
    let p1 = MockServer::start().await;
    let p2 = MockServer::start().await;

    mount_system_info(
        &upstream,
        json!({
            "blockchain": {
                "nodeId": "n1",
                "network": {
                    "peersHttp": [
                        {"httpUrl": p1.uri(), "nodeId": "peer-one"},
                        p2.uri()
                    ],
                    "peersP2P": ["p2p://only-one"]
                }
            }
        }),
    )
    .await;
    mount_system_info(&p1, json!({"blockchain": {"blockHeight": 3}})).await;
    mount_system_info(&p2, json!({"blockchain": {"nodeId": "self-named", "blockHeight": 5}})).await;

    let (aggregator, _) = aggregator_for(&upstream);
    let view = aggregator.build_network_view().await.expect("view");

    assert_eq!(view.peers[1].node_id, "peer-one");
    assert_eq!(view.peers[2].node_id, "self-named");
    // panjang array beda: join posisional tidak dipakai
    assert_eq!(view.peers[1].p2p_url, "unknown");
    assert_eq!(view.peers[2].p2p_url, "unknown");
    assert_eq!(view.network.p2p_connections, 1);
}

// ════════════════════════════════════════════════════════════════════════════
// EDGE CASES
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_empty_peer_list_yields_local_only() {
    let upstream = MockServer::start().await;
    mount_system_info(
        &upstream,
        json!({"blockchain": {"nodeId": "solo", "blockHeight": 8, "network": {"peersHttp": []}}}),
    )
    .await;

    let (aggregator, _) = aggregator_for(&upstream);
    let view = aggregator.build_network_view().await.expect("view");

    assert_eq!(view.peers.len(), 1);
    assert_eq!(view.stats.total, 1);
    assert_eq!(view.stats.online, 1);
    assert_eq!(view.stats.avg_response_time, 0);
    assert_eq!(view.stats.max_block_height, 8);
}

#[tokio::test]
async fn test_upstream_failure_is_aggregation_error() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/system-info"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&upstream)
        .await;

    let (aggregator, metrics) = aggregator_for(&upstream);
    let err = aggregator.build_network_view().await.unwrap_err();

    match err {
        AggregationError::Upstream(failure) => {
            assert_eq!(failure.endpoint, "/system-info");
            assert_eq!(failure.status, Some(503));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(metrics.aggregation_failures.get(), 1);
}

#[tokio::test]
async fn test_bad_peer_responses_become_offline_records() {
    let upstream = MockServer::start().await;
    let broken = MockServer::start().await;
    let garbage = MockServer::start().await;

    mount_system_info(
        &upstream,
        json!({"blockchain": {"nodeId": "n1", "network": {"peersHttp": [broken.uri(), garbage.uri(), "unknown"]}}}),
    )
    .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&garbage)
        .await;

    let (aggregator, _) = aggregator_for(&upstream);
    let view = aggregator.build_network_view().await.expect("view");

    assert_eq!(view.peers.len(), 4);
    assert_eq!(view.peers[1].error.as_deref(), Some("HTTP 500"));
    assert!(view.peers[2].error.as_deref().unwrap_or_default().contains("invalid JSON"));
    assert_eq!(view.peers[3].http_url, "unknown");
    assert_eq!(view.peers[3].status, PeerStatus::Offline);
    assert_eq!(view.stats.offline, 3);
    assert_eq!(view.stats.online, 1);
}
