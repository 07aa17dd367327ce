//! The outbound call coordinator.
//!
//! [`HttpClient`] wraps a [`Transport`] with everything a storefront service
//! needs around a dependency call: audit logging, bounded retry on transport
//! failures, circuit breaking, response-cache fallback, and registration for
//! the commit/rollback acknowledge protocol. All collaborators are injected;
//! the client holds no global state.
//!
//! Non-GET calls are audited: a call-log row is written in `calling` state
//! before dispatch and moved to `success` or `failed` exactly once when the
//! call completes. GETs are never audited and never acknowledged.

use crate::auth::AuthScheme;
use crate::cache::ResponseCacheService;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use storefront_kit_core::acknowledge::{AcknowledgeRecord, CommitStatus, Decision};
use storefront_kit_core::call_log::{CallLog, CallStatus, Method};
use storefront_kit_core::error::CallError;
use storefront_kit_core::payload::Payload;
use storefront_kit_core::scope::{AcknowledgeTarget, RequestScope};
use storefront_kit_core::store::{AcknowledgeStore, CallLogStore};
use storefront_kit_core::transport::{Transport, TransportResponse};
use storefront_kit_runtime::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError,
};
use storefront_kit_runtime::retry::{RetryPolicy, retry_with_predicate};

/// Configuration for one outbound client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL joined with the path of every relative call.
    pub base_url: String,
    /// Name this client writes on cache entries and metrics.
    pub client_name: String,
    /// Retries after the first attempt on transport failures.
    pub max_network_retries: usize,
    /// Skip backoff delays. For tests and local runs.
    pub use_normal_sleep: bool,
    /// Per-request timeout handed to the transport.
    pub timeout: Duration,
    /// Circuit breaker settings for [`HttpClient::call_with_breaker`].
    pub breaker: CircuitBreakerConfig,
}

impl HttpClientConfig {
    /// Configuration with default resilience settings.
    #[must_use]
    pub fn new(base_url: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client_name: client_name.into(),
            max_network_retries: 3,
            use_normal_sleep: false,
            timeout: crate::transport::DEFAULT_TIMEOUT,
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// How one call moves through the shared pipeline.
#[derive(Debug, Clone, Copy)]
struct CallOptions {
    needs_ack: bool,
    audit: bool,
    use_cache: bool,
    raw_error: bool,
}

/// External transaction id surfaced by dependencies in their response body.
#[derive(Debug, Default, Deserialize)]
struct TxnId {
    #[serde(default)]
    id: i64,
}

/// Structured error body convention shared by internal dependencies. Some
/// partners answer with `status`/`info` instead, which take precedence when
/// present.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    code: String,
    message: String,
    status: u16,
    info: String,
}

struct ClientInner {
    config: HttpClientConfig,
    auth: Mutex<Vec<AuthScheme>>,
    transport: Arc<dyn Transport>,
    call_logs: Arc<dyn CallLogStore>,
    acknowledgments: Arc<dyn AcknowledgeStore>,
    cache: Arc<ResponseCacheService>,
    retry: RetryPolicy,
}

/// Instrumented outbound HTTP client. Cloning is cheap; clones share auth
/// state and the circuit breaker.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
    breaker: CircuitBreaker,
}

impl HttpClient {
    /// Build a client from its configuration and injected collaborators.
    #[must_use]
    pub fn new(
        config: HttpClientConfig,
        transport: Arc<dyn Transport>,
        call_logs: Arc<dyn CallLogStore>,
        acknowledgments: Arc<dyn AcknowledgeStore>,
        cache: Arc<ResponseCacheService>,
    ) -> Self {
        let retry = RetryPolicy::builder()
            .max_retries(config.max_network_retries)
            .normal_sleep(config.use_normal_sleep)
            .build();
        let breaker = CircuitBreaker::new(config.breaker.clone());

        Self {
            inner: Arc::new(ClientInner {
                config,
                auth: Mutex::new(Vec::new()),
                transport,
                call_logs,
                acknowledgments,
                cache,
                retry,
            }),
            breaker,
        }
    }

    /// Name this client was configured with.
    #[must_use]
    pub fn client_name(&self) -> &str {
        &self.inner.config.client_name
    }

    /// Attach or refresh a credential.
    ///
    /// At most one scheme per kind is kept; adding a second scheme of an
    /// existing kind replaces its token.
    pub fn add_authentication(&self, scheme: AuthScheme) {
        let mut auth = self.inner.auth_lock();
        if let Some(existing) = auth.iter_mut().find(|s| s.kind() == scheme.kind()) {
            existing.set_token(scheme.token().to_string());
        } else {
            auth.push(scheme);
        }
    }

    /// Call `path` relative to the configured base URL.
    ///
    /// Returns the decoded response body, or `None` when the dependency
    /// answered with an empty body.
    ///
    /// # Errors
    ///
    /// See [`CallError`]; a non-2xx answer is [`CallError::Status`].
    pub async fn call<R: DeserializeOwned>(
        &self,
        scope: &RequestScope,
        path: &str,
        method: Method,
        body: Option<Payload>,
        needs_ack: bool,
    ) -> Result<Option<R>, CallError> {
        let url = self.inner.join(path)?;
        self.dispatch(
            scope,
            url,
            method,
            body,
            CallOptions {
                needs_ack,
                audit: true,
                use_cache: false,
                raw_error: false,
            },
        )
        .await
    }

    /// Like [`Self::call`], with last-known-good fallback for endpoints that
    /// carry a cache policy: on failure a fresh enough cached response is
    /// substituted and the error suppressed, on success the cache is
    /// refreshed.
    ///
    /// # Errors
    ///
    /// See [`CallError`]. A suppressed failure is not an error.
    pub async fn call_with_cache<R: DeserializeOwned>(
        &self,
        scope: &RequestScope,
        path: &str,
        method: Method,
        body: Option<Payload>,
        needs_ack: bool,
    ) -> Result<Option<R>, CallError> {
        let url = self.inner.join(path)?;
        self.dispatch(
            scope,
            url,
            method,
            body,
            CallOptions {
                needs_ack,
                audit: true,
                use_cache: true,
                raw_error: false,
            },
        )
        .await
    }

    /// Like [`Self::call`], behind this client's circuit breaker.
    ///
    /// # Errors
    ///
    /// [`CallError::CircuitOpen`] when the breaker rejects the call without
    /// touching the transport; otherwise see [`CallError`].
    pub async fn call_with_breaker<R: DeserializeOwned>(
        &self,
        scope: &RequestScope,
        path: &str,
        method: Method,
        body: Option<Payload>,
        needs_ack: bool,
    ) -> Result<Option<R>, CallError> {
        let url = self.inner.join(path)?;
        let options = CallOptions {
            needs_ack,
            audit: true,
            use_cache: false,
            raw_error: false,
        };

        match self
            .breaker
            .call(|| self.dispatch(scope, url, method, body, options))
            .await
        {
            Ok(result) => Ok(result),
            Err(CircuitBreakerError::Open) => Err(CallError::CircuitOpen(
                self.inner.config.client_name.clone(),
            )),
            Err(CircuitBreakerError::Inner(err)) => Err(err),
        }
    }

    /// Like [`Self::call`], without audit logging or acknowledge
    /// registration. For chatty endpoints whose calls are not worth a row.
    ///
    /// # Errors
    ///
    /// See [`CallError`].
    pub async fn call_without_log<R: DeserializeOwned>(
        &self,
        scope: &RequestScope,
        path: &str,
        method: Method,
        body: Option<Payload>,
    ) -> Result<Option<R>, CallError> {
        let url = self.inner.join(path)?;
        self.dispatch(
            scope,
            url,
            method,
            body,
            CallOptions {
                needs_ack: false,
                audit: false,
                use_cache: false,
                raw_error: false,
            },
        )
        .await
    }

    /// Call an absolute URL, bypassing the configured base URL. Not audited.
    ///
    /// # Errors
    ///
    /// See [`CallError`].
    pub async fn call_with_base_url<R: DeserializeOwned>(
        &self,
        scope: &RequestScope,
        url: &str,
        method: Method,
        body: Option<Payload>,
    ) -> Result<Option<R>, CallError> {
        reqwest::Url::parse(url).map_err(|e| CallError::InvalidUrl(format!("{url}: {e}")))?;
        self.dispatch(
            scope,
            url.to_string(),
            method,
            body,
            CallOptions {
                needs_ack: false,
                audit: false,
                use_cache: false,
                raw_error: false,
            },
        )
        .await
    }

    /// Call `path` with explicit query parameters, returning a non-2xx body
    /// verbatim as the error message instead of parsing the structured error
    /// convention. For partners with their own error formats.
    ///
    /// # Errors
    ///
    /// See [`CallError`]; the [`CallError::Status`] message is the raw body.
    pub async fn call_with_raw_error<R: DeserializeOwned>(
        &self,
        scope: &RequestScope,
        path: &str,
        method: Method,
        query: &[(String, String)],
        body: Option<Payload>,
        needs_ack: bool,
    ) -> Result<Option<R>, CallError> {
        let mut url = self.inner.join(path)?;
        for (name, value) in query {
            push_query_pair(&mut url, name, value);
        }
        self.dispatch(
            scope,
            url,
            method,
            body,
            CallOptions {
                needs_ack,
                audit: true,
                use_cache: false,
                raw_error: true,
            },
        )
        .await
    }

    /// Shared call pipeline behind every public variant.
    async fn dispatch<R: DeserializeOwned>(
        &self,
        scope: &RequestScope,
        url: String,
        method: Method,
        body: Option<Payload>,
        options: CallOptions,
    ) -> Result<Option<R>, CallError> {
        let inner = &self.inner;
        metrics::counter!("outbound.calls", "client" => inner.config.client_name.clone())
            .increment(1);

        let (headers, url) = inner.apply_auth(url);

        // Non-GET cache keys include the body so distinct payloads to one
        // endpoint are distinct cacheable results.
        let cache_key = match (&body, method.is_get()) {
            (Some(payload), false) => format!("{url}{}", payload.as_str()),
            _ => url.clone(),
        };

        let audited = options.audit && !method.is_get();
        let mut log = if audited {
            let row = inner
                .call_logs
                .insert(CallLog {
                    id: 0,
                    client_id: scope.actor().id(),
                    client_type: scope.actor().kind().to_string(),
                    transaction_id: 0,
                    method,
                    url: url.clone(),
                    header: format!("{headers:?}"),
                    request: body.as_ref().map(|p| p.view.clone()).unwrap_or_default(),
                    status: CallStatus::Calling,
                    http_status_code: 0,
                    reference_id: scope.reference_id().unwrap_or(0),
                })
                .await?;
            Some(row)
        } else {
            None
        };

        let eligible = if options.use_cache {
            inner.cache.is_eligible(&url, method).await
        } else {
            false
        };

        let outcome = inner.send_with_retry(method, &url, &headers, body.as_ref()).await;

        let result = match outcome {
            Err(err) => Err(err),
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => Err(status_error(&url, &response, options.raw_error)),
        };

        match result {
            Err(err) => {
                metrics::counter!("outbound.failures", "client" => inner.config.client_name.clone())
                    .increment(1);

                if let Some(mut row) = log.take() {
                    row.status = CallStatus::Failed;
                    row.http_status_code = err.http_status();
                    if let Err(store_err) = inner.call_logs.update(row).await {
                        tracing::warn!(url, error = %store_err, "failed to finalize call log");
                    }
                }

                if eligible {
                    if let Some(cached) = inner.cache.recover(&url, &cache_key, method).await {
                        let body = serde_json::Value::Object(cached).to_string();
                        return decode(&body);
                    }
                }

                Err(err)
            }
            Ok(response) => {
                if eligible {
                    let view = serde_json::from_str::<serde_json::Value>(&response.body)
                        .ok()
                        .and_then(|v| match v {
                            serde_json::Value::Object(map) => Some(map),
                            _ => None,
                        })
                        .unwrap_or_default();
                    inner
                        .cache
                        .record(
                            &cache_key,
                            method,
                            scope.actor().id(),
                            &inner.config.client_name,
                            view,
                        )
                        .await;
                }

                if let Some(mut row) = log.take() {
                    row.transaction_id = serde_json::from_str::<TxnId>(&response.body)
                        .unwrap_or_default()
                        .id;
                    row.status = CallStatus::Success;
                    row.http_status_code = response.status;

                    let row = match inner.call_logs.update(row.clone()).await {
                        Ok(updated) => updated,
                        Err(store_err) => {
                            tracing::warn!(url, error = %store_err, "failed to finalize call log");
                            row
                        }
                    };

                    // Once a decision was broadcast, late calls no longer
                    // join the acknowledge round.
                    if options.needs_ack && scope.decision().is_none() {
                        scope.register_pending(
                            Arc::clone(inner) as Arc<dyn AcknowledgeTarget>,
                            row.clone(),
                        );

                        let record = AcknowledgeRecord {
                            id: 0,
                            request_id: row.id,
                            commit_status: CommitStatus::OnProgress,
                            reserved_holder: row.request.clone(),
                            reserved_holder_name: body
                                .as_ref()
                                .map(|p| p.name.clone())
                                .unwrap_or_default(),
                            message: String::new(),
                        };
                        if let Err(store_err) = inner.acknowledgments.insert(record).await {
                            tracing::warn!(
                                url,
                                error = %store_err,
                                "failed to record on_progress acknowledge row"
                            );
                        }
                    }
                }

                decode(&response.body)
            }
        }
    }
}

impl ClientInner {
    fn auth_lock(&self) -> MutexGuard<'_, Vec<AuthScheme>> {
        self.auth.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join(&self, path: &str) -> Result<String, CallError> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        reqwest::Url::parse(&url).map_err(|e| CallError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(url)
    }

    /// Render auth schemes into headers, applying API keys to the URL.
    fn apply_auth(&self, mut url: String) -> (Vec<(String, String)>, String) {
        let mut headers = Vec::new();
        for scheme in self.auth_lock().iter() {
            if scheme.applies_as_query() {
                let value = scheme.header_value();
                push_query_pair(&mut url, scheme.header_name(), &value);
            } else {
                headers.push((scheme.header_name().to_string(), scheme.header_value()));
            }
        }
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
        (headers, url)
    }

    async fn send_with_retry(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<&Payload>,
    ) -> Result<TransportResponse, CallError> {
        retry_with_predicate(
            self.retry.clone(),
            || {
                self.transport.send(
                    method,
                    url.to_string(),
                    headers.to_vec(),
                    body.map(|p| p.bytes.clone()),
                )
            },
            |_| true,
        )
        .await
        .map_err(|err| CallError::Transport(err.to_string()))
    }
}

impl AcknowledgeTarget for ClientInner {
    fn acknowledge<'a>(
        &'a self,
        log: &'a CallLog,
        decision: Decision,
    ) -> Pin<Box<dyn Future<Output = Result<(), CallError>> + Send + 'a>> {
        Box::pin(async move {
            // Re-invoke the original endpoint with the decision as the `s`
            // query parameter, same method and payload. Broadcast calls are
            // not themselves audited.
            let url = format!("{}?s={}", log.url, decision);
            let (headers, url) = self.apply_auth(url);

            let payload;
            let body = if log.request.is_empty() {
                None
            } else {
                payload = Payload::of(&log.request)?;
                Some(&payload)
            };

            let response = self.send_with_retry(log.method, &url, &headers, body).await?;
            if response.is_success() {
                metrics::counter!("outbound.broadcasts", "decision" => decision.as_str())
                    .increment(1);
                Ok(())
            } else {
                Err(status_error(&url, &response, false))
            }
        })
    }
}

impl AcknowledgeTarget for HttpClient {
    fn acknowledge<'a>(
        &'a self,
        log: &'a CallLog,
        decision: Decision,
    ) -> Pin<Box<dyn Future<Output = Result<(), CallError>> + Send + 'a>> {
        self.inner.acknowledge(log, decision)
    }
}

/// Append `name=value` to the query string, percent-encoding both sides so
/// reserved characters in a value cannot corrupt the URL.
fn push_query_pair(url: &mut String, name: &str, value: &str) {
    let separator = if url.contains('?') { '&' } else { '?' };
    url.push(separator);
    url.push_str(&urlencoding::encode(name));
    url.push('=');
    url.push_str(&urlencoding::encode(value));
}

/// Map a non-2xx response to a [`CallError::Status`].
fn status_error(url: &str, response: &TransportResponse, raw: bool) -> CallError {
    if raw {
        return CallError::Status {
            url: url.to_string(),
            status: response.status,
            code: response.status.to_string(),
            message: response.body.clone(),
        };
    }

    let parsed = serde_json::from_str::<ErrorBody>(&response.body).unwrap_or_default();
    let status = if parsed.status == 0 {
        response.status
    } else {
        parsed.status
    };
    let message = if parsed.info.is_empty() {
        parsed.message
    } else {
        parsed.info
    };
    let code = if parsed.code.is_empty() {
        response.status.to_string()
    } else {
        parsed.code
    };

    CallError::Status {
        url: url.to_string(),
        status,
        code,
        message,
    }
}

fn decode<R: DeserializeOwned>(body: &str) -> Result<Option<R>, CallError> {
    if body.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| CallError::Decode(e.to_string()))
}
