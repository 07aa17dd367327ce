//! Instrumented outbound HTTP client for storefront-kit.
//!
//! This crate is the outbound edge of the toolkit: an [`HttpClient`] that
//! audits non-GET calls, retries transport failures with backoff, can break
//! the circuit on a struggling dependency or fall back to the last cached
//! response, and registers calls for the commit/rollback acknowledge
//! protocol driven by the transaction manager in `storefront-kit-core`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storefront_kit_client::{AuthScheme, HttpClient, HttpClientConfig, ReqwestTransport};
//! use storefront_kit_client::cache::ResponseCacheService;
//! use storefront_kit_core::call_log::Method;
//! use storefront_kit_core::payload::Payload;
//! use storefront_kit_core::scope::{Actor, RequestScope};
//! # use storefront_kit_core::store::{AcknowledgeStore, CallLogStore, CachePolicyStore, ResponseCacheStore};
//! # async fn example(
//! #     call_logs: Arc<dyn CallLogStore>,
//! #     acks: Arc<dyn AcknowledgeStore>,
//! #     policies: Arc<dyn CachePolicyStore>,
//! #     entries: Arc<dyn ResponseCacheStore>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = HttpClientConfig::new("http://payments.internal", "payments");
//! let transport = Arc::new(ReqwestTransport::new(config.timeout)?);
//! let cache = Arc::new(ResponseCacheService::new(policies, entries));
//! let client = HttpClient::new(config, transport, call_logs, acks, cache);
//! client.add_authentication(AuthScheme::bearer("token".to_string()));
//!
//! let scope = RequestScope::new(Actor::System);
//! let charge = Payload::of(&serde_json::json!({"amount": 1200}))?;
//! let response: Option<serde_json::Value> = client
//!     .call(&scope, "charges", Method::Post, Some(charge), true)
//!     .await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

pub mod acknowledge;
pub mod auth;
pub mod cache;
pub mod client;
pub mod transport;

pub use acknowledge::AcknowledgeService;
pub use auth::{AuthKind, AuthScheme};
pub use cache::ResponseCacheService;
pub use client::{HttpClient, HttpClientConfig};
pub use transport::ReqwestTransport;
