//! End-to-end behavior of the outbound call pipeline against in-memory
//! collaborators.
#![allow(clippy::unwrap_used)] // Test code can use unwrap

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use storefront_kit_client::{AuthScheme, HttpClient, HttpClientConfig, ResponseCacheService};
use storefront_kit_core::acknowledge::{CommitStatus, Decision};
use storefront_kit_core::call_log::{CallStatus, Method};
use storefront_kit_core::error::CallError;
use storefront_kit_core::payload::Payload;
use storefront_kit_core::scope::{Actor, RequestScope};
use storefront_kit_runtime::circuit_breaker::CircuitBreakerConfig;
use storefront_kit_testing::{
    MemoryAcknowledgeStore, MemoryCachePolicyStore, MemoryCallLogStore, MemoryResponseCacheStore,
    MockTransport,
};

#[derive(Serialize)]
struct ChargeCard {
    order_id: i64,
    amount_cents: i64,
}

struct Harness {
    client: HttpClient,
    transport: Arc<MockTransport>,
    call_logs: Arc<MemoryCallLogStore>,
    acknowledgments: Arc<MemoryAcknowledgeStore>,
}

fn harness_with_config(config: HttpClientConfig) -> Harness {
    let transport = Arc::new(MockTransport::default());
    let call_logs = Arc::new(MemoryCallLogStore::default());
    let acknowledgments = Arc::new(MemoryAcknowledgeStore::default());
    let cache = Arc::new(ResponseCacheService::new(
        Arc::new(MemoryCachePolicyStore::default()),
        Arc::new(MemoryResponseCacheStore::default()),
    ));
    let client = HttpClient::new(
        config,
        transport.clone(),
        call_logs.clone(),
        acknowledgments.clone(),
        cache,
    );

    Harness {
        client,
        transport,
        call_logs,
        acknowledgments,
    }
}

fn harness() -> Harness {
    let mut config = HttpClientConfig::new("http://payments.internal", "payments");
    config.use_normal_sleep = true;
    harness_with_config(config)
}

fn charge() -> Payload {
    Payload::of(&ChargeCard {
        order_id: 9,
        amount_cents: 1250,
    })
    .unwrap()
}

#[tokio::test]
async fn successful_post_moves_the_audit_row_to_success() {
    let h = harness();
    h.transport
        .enqueue_ok(200, r#"{"id": 55, "state": "charged"}"#);
    let scope = RequestScope::new(Actor::User(7));

    let response: Option<serde_json::Value> = h
        .client
        .call(&scope, "/charges", Method::Post, Some(charge()), false)
        .await
        .unwrap();
    assert_eq!(response.unwrap()["state"], "charged");

    let rows = h.call_logs.snapshot();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.status, CallStatus::Success);
    assert_eq!(row.http_status_code, 200);
    assert_eq!(row.transaction_id, 55);
    assert_eq!(row.method, Method::Post);
    assert_eq!(row.url, "http://payments.internal/charges");
    assert_eq!(row.client_id, 7);
    assert_eq!(row.client_type, "User");
    assert_eq!(row.request.get("order_id").unwrap(), 9);
}

#[tokio::test]
async fn transport_failures_are_retried_then_surfaced() {
    let h = harness();
    for _ in 0..4 {
        h.transport.enqueue_err("connection refused");
    }
    let scope = RequestScope::new(Actor::System);

    let result: Result<Option<serde_json::Value>, _> = h
        .client
        .call(&scope, "/charges", Method::Post, Some(charge()), false)
        .await;

    assert!(matches!(result, Err(CallError::Transport(_))));
    // One initial attempt plus max_network_retries.
    assert_eq!(h.transport.attempts(), 4);

    let rows = h.call_logs.snapshot();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, CallStatus::Failed);
    assert_eq!(rows[0].http_status_code, 0);
}

#[tokio::test]
async fn transient_failure_recovers_on_retry() {
    let h = harness();
    h.transport.enqueue_err("connection reset");
    h.transport.enqueue_ok(200, r#"{"id": 1}"#);
    let scope = RequestScope::new(Actor::System);

    let response: Option<serde_json::Value> = h
        .client
        .call(&scope, "/charges", Method::Post, Some(charge()), false)
        .await
        .unwrap();

    assert!(response.is_some());
    assert_eq!(h.transport.attempts(), 2);
    assert_eq!(h.call_logs.snapshot()[0].status, CallStatus::Success);
}

#[tokio::test]
async fn get_calls_are_never_audited_or_acknowledged() {
    let h = harness();
    let scope = RequestScope::new(Actor::Customer(3));

    let _: Option<serde_json::Value> = h
        .client
        .call(&scope, "/charges/1", Method::Get, None, true)
        .await
        .unwrap();

    assert!(h.call_logs.is_empty());
    assert!(h.acknowledgments.is_empty());
    assert_eq!(scope.pending_count(), 0);
}

#[tokio::test]
async fn non_2xx_maps_the_structured_error_body() {
    let h = harness();
    h.transport
        .enqueue_ok(404, r#"{"code": "not_found", "message": "no such charge"}"#);
    let scope = RequestScope::new(Actor::System);

    let result: Result<Option<serde_json::Value>, _> = h
        .client
        .call(&scope, "/charges/9", Method::Delete, None, false)
        .await;

    match result {
        Err(CallError::Status {
            status,
            code,
            message,
            url,
        }) => {
            assert_eq!(status, 404);
            assert_eq!(code, "not_found");
            assert_eq!(message, "no such charge");
            assert_eq!(url, "http://payments.internal/charges/9");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    // A definitive answer is never retried.
    assert_eq!(h.transport.attempts(), 1);
    let rows = h.call_logs.snapshot();
    assert_eq!(rows[0].status, CallStatus::Failed);
    assert_eq!(rows[0].http_status_code, 404);
}

#[tokio::test]
async fn decode_failure_leaves_the_row_successful() {
    let h = harness();
    h.transport.enqueue_ok(200, "pong");
    let scope = RequestScope::new(Actor::System);

    let result: Result<Option<Vec<i64>>, _> = h
        .client
        .call(&scope, "/charges", Method::Post, Some(charge()), false)
        .await;

    assert!(matches!(result, Err(CallError::Decode(_))));
    let rows = h.call_logs.snapshot();
    assert_eq!(rows[0].status, CallStatus::Success);
    assert_eq!(rows[0].http_status_code, 200);
}

#[tokio::test]
async fn unlogged_variants_write_no_rows() {
    let h = harness();
    let scope = RequestScope::new(Actor::System);

    let _: Option<serde_json::Value> = h
        .client
        .call_without_log(&scope, "/health", Method::Post, None)
        .await
        .unwrap();
    let _: Option<serde_json::Value> = h
        .client
        .call_with_base_url(&scope, "http://other.internal/ping", Method::Post, None)
        .await
        .unwrap();

    assert!(h.call_logs.is_empty());
    let requests = h.transport.requests();
    assert_eq!(requests[1].url, "http://other.internal/ping");
}

#[tokio::test]
async fn invalid_absolute_url_is_rejected_before_dispatch() {
    let h = harness();
    let scope = RequestScope::new(Actor::System);

    let result: Result<Option<serde_json::Value>, _> = h
        .client
        .call_with_base_url(&scope, "not a url", Method::Get, None)
        .await;

    assert!(matches!(result, Err(CallError::InvalidUrl(_))));
    assert_eq!(h.transport.attempts(), 0);
}

#[tokio::test]
async fn raw_error_calls_append_query_and_keep_the_body() {
    let h = harness();
    h.transport.enqueue_ok(502, "<bad gateway>");
    let scope = RequestScope::new(Actor::System);
    let query = vec![("expand".to_string(), "items".to_string())];

    let result: Result<Option<serde_json::Value>, _> = h
        .client
        .call_with_raw_error(&scope, "/charges", Method::Post, &query, Some(charge()), false)
        .await;

    match result {
        Err(CallError::Status { code, message, .. }) => {
            assert_eq!(code, "502");
            assert_eq!(message, "<bad gateway>");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(h.transport.requests()[0].url.ends_with("?expand=items"));
}

#[tokio::test]
async fn auth_schemes_travel_as_headers_and_query() {
    let h = harness();
    h.client
        .add_authentication(AuthScheme::bearer("t0k3n".to_string()));
    h.client.add_authentication(AuthScheme::api_key("k1".to_string()));
    let scope = RequestScope::new(Actor::System);

    let _: Option<serde_json::Value> = h
        .client
        .call(&scope, "/charges", Method::Get, None, false)
        .await
        .unwrap();

    let sent = &h.transport.requests()[0];
    assert!(
        sent.headers
            .contains(&("Authorization".to_string(), "Bearer t0k3n".to_string()))
    );
    assert!(
        sent.headers
            .contains(&("Content-Type".to_string(), "application/json".to_string()))
    );
    assert!(sent.url.ends_with("?APIKey=k1"));
}

#[tokio::test]
async fn needs_ack_success_registers_for_acknowledgment() {
    let h = harness();
    h.transport.enqueue_ok(200, r#"{"id": 3}"#);
    let scope = RequestScope::new(Actor::User(7));

    let _: Option<serde_json::Value> = h
        .client
        .call(&scope, "/charges", Method::Post, Some(charge()), true)
        .await
        .unwrap();

    assert_eq!(scope.pending_count(), 1);
    let records = h.acknowledgments.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].commit_status, CommitStatus::OnProgress);
    assert_eq!(records[0].reserved_holder_name, "ChargeCard");
    assert_eq!(records[0].request_id, h.call_logs.snapshot()[0].id);
}

#[tokio::test]
async fn calls_after_the_decision_do_not_register() {
    let h = harness();
    h.transport.enqueue_ok(200, r#"{"id": 3}"#);
    let scope = RequestScope::new(Actor::User(7));
    scope.set_decision(Decision::Commit);

    let _: Option<serde_json::Value> = h
        .client
        .call(&scope, "/charges", Method::Post, Some(charge()), true)
        .await
        .unwrap();

    assert_eq!(scope.pending_count(), 0);
    assert!(h.acknowledgments.is_empty());
}

#[tokio::test]
async fn repeated_failures_open_the_circuit() {
    let mut config = HttpClientConfig::new("http://payments.internal", "payments");
    config.use_normal_sleep = true;
    config.breaker = CircuitBreakerConfig::builder()
        .failure_threshold(2)
        .window(Duration::from_secs(60))
        .open_timeout(Duration::from_secs(60))
        .build();
    let h = harness_with_config(config);
    let scope = RequestScope::new(Actor::System);

    h.transport.enqueue_ok(500, "");
    h.transport.enqueue_ok(500, "");
    for _ in 0..2 {
        let result: Result<Option<serde_json::Value>, _> = h
            .client
            .call_with_breaker(&scope, "/charges", Method::Post, None, false)
            .await;
        assert!(matches!(result, Err(CallError::Status { .. })));
    }

    let rejected: Result<Option<serde_json::Value>, _> = h
        .client
        .call_with_breaker(&scope, "/charges", Method::Post, None, false)
        .await;

    assert!(matches!(rejected, Err(CallError::CircuitOpen(ref name)) if name == "payments"));
    // The rejected call never reached the transport.
    assert_eq!(h.transport.attempts(), 2);
}
