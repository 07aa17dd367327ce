//! Scripted transport double.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use storefront_kit_core::call_log::Method;
use storefront_kit_core::transport::{Transport, TransportError, TransportResponse};

/// One request as the mock transport saw it.
#[derive(Debug, Clone)]
pub struct SentRequest {
    /// HTTP method.
    pub method: Method,
    /// Full URL, query string included.
    pub url: String,
    /// Headers in application order.
    pub headers: Vec<(String, String)>,
    /// Raw request body.
    pub body: Option<Vec<u8>>,
}

impl SentRequest {
    /// Body as UTF-8, empty when there was none.
    #[must_use]
    pub fn body_str(&self) -> String {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

/// A [`Transport`] that replays scripted outcomes and records every request.
///
/// Outcomes are consumed front to back; once the script runs dry every call
/// answers `200 {}`.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<SentRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    /// Script a response for the next unscripted call.
    pub fn enqueue_ok(&self, status: u16, body: &str) {
        lock(&self.script).push_back(Ok(TransportResponse {
            status,
            body: body.to_string(),
        }));
    }

    /// Script a connectivity failure for the next unscripted call.
    pub fn enqueue_err(&self, message: &str) {
        lock(&self.script).push_back(Err(TransportError(message.to_string())));
    }

    /// Everything dispatched so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<SentRequest> {
        lock(&self.requests).clone()
    }

    /// Number of dispatch attempts, retries included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        lock(&self.requests).len()
    }
}

impl Transport for MockTransport {
    fn send(
        &self,
        method: Method,
        url: String,
        headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + '_>> {
        Box::pin(async move {
            lock(&self.requests).push(SentRequest {
                method,
                url,
                headers,
                body,
            });

            lock(&self.script).pop_front().unwrap_or(Ok(TransportResponse {
                status: 200,
                body: "{}".to_string(),
            }))
        })
    }
}
