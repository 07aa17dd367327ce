//! The reqwest transport against a real local HTTP server.
#![allow(clippy::unwrap_used)] // Test code can use unwrap

use std::sync::Arc;
use storefront_kit_client::{
    AuthScheme, HttpClient, HttpClientConfig, ReqwestTransport, ResponseCacheService,
};
use storefront_kit_core::call_log::{CallStatus, Method};
use storefront_kit_core::error::CallError;
use storefront_kit_core::payload::Payload;
use storefront_kit_core::scope::{Actor, RequestScope};
use storefront_kit_testing::{
    MemoryAcknowledgeStore, MemoryCachePolicyStore, MemoryCallLogStore, MemoryResponseCacheStore,
};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(uri: &str) -> (HttpClient, Arc<MemoryCallLogStore>) {
    let mut config = HttpClientConfig::new(uri, "payments");
    config.use_normal_sleep = true;
    let transport = Arc::new(ReqwestTransport::new(config.timeout).unwrap());
    let call_logs = Arc::new(MemoryCallLogStore::default());
    let cache = Arc::new(ResponseCacheService::new(
        Arc::new(MemoryCachePolicyStore::default()),
        Arc::new(MemoryResponseCacheStore::default()),
    ));
    let client = HttpClient::new(
        config,
        transport,
        call_logs.clone(),
        Arc::new(MemoryAcknowledgeStore::default()),
        cache,
    );
    (client, call_logs)
}

#[tokio::test]
async fn posts_carry_auth_headers_and_json_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/charges"))
        .and(header("Authorization", "Bearer t0k3n"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(
            serde_json::json!({"order_id": 1, "amount_cents": 500}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id": 8}"#))
        .mount(&server)
        .await;

    let (client, call_logs) = client_for(&server.uri());
    client.add_authentication(AuthScheme::bearer("t0k3n".to_string()));
    let scope = RequestScope::new(Actor::User(1));
    let body = Payload::of(&serde_json::json!({"order_id": 1, "amount_cents": 500})).unwrap();

    let response: Option<serde_json::Value> = client
        .call(&scope, "/charges", Method::Post, Some(body), false)
        .await
        .unwrap();

    assert_eq!(response.unwrap()["id"], 8);
    let rows = call_logs.snapshot();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, CallStatus::Success);
    assert_eq!(rows[0].http_status_code, 200);
    assert_eq!(rows[0].transaction_id, 8);
}

#[tokio::test]
async fn api_keys_are_sent_as_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/charges/1"))
        .and(query_param("APIKey", "k1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"state": "charged"}"#))
        .mount(&server)
        .await;

    let (client, _) = client_for(&server.uri());
    client.add_authentication(AuthScheme::api_key("k1".to_string()));
    let scope = RequestScope::new(Actor::System);

    let response: Option<serde_json::Value> = client
        .call(&scope, "/charges/1", Method::Get, None, false)
        .await
        .unwrap();

    assert_eq!(response.unwrap()["state"], "charged");
}

#[tokio::test]
async fn non_2xx_answers_become_status_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/charges/9"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_string(r#"{"code": "not_found", "message": "gone"}"#),
        )
        .mount(&server)
        .await;

    let (client, _) = client_for(&server.uri());
    let scope = RequestScope::new(Actor::System);

    let result: Result<Option<serde_json::Value>, _> =
        client.call(&scope, "/charges/9", Method::Get, None, false).await;

    match result {
        Err(CallError::Status { status, code, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(code, "not_found");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}
