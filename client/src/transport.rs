//! reqwest-backed [`Transport`] implementation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use storefront_kit_core::call_log::Method;
use storefront_kit_core::transport::{Transport, TransportError, TransportResponse};

/// Default per-request timeout, matching long-running payment captures.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(80);

/// Sends requests over the network with reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the underlying TLS backend cannot be
    /// initialized.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing reqwest client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

const fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        method: Method,
        url: String,
        headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + '_>> {
        Box::pin(async move {
            let mut request = self.client.request(to_reqwest_method(method), &url);
            for (name, value) in &headers {
                request = request.header(name, value);
            }
            if let Some(bytes) = body {
                request = request.body(bytes);
            }

            let response = request
                .send()
                .await
                .map_err(|e| TransportError(e.to_string()))?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError(e.to_string()))?;

            Ok(TransportResponse { status, body })
        })
    }
}
