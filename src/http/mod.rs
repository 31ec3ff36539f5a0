use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;

use crate::error::GemError;

/// Minimal POST request shared by the buffered and streaming paths.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Builds a POST request with a JSON request body.
    ///
    /// # Examples
    ///
    /// ```
    /// use mygem::http::HttpRequest;
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec());
    /// assert_eq!(request.headers.get("Content-Type"), Some(&"application/json".to_string()));
    /// assert!(request.timeout.is_none());
    /// ```
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            body,
            timeout: None,
        }
    }

    /// Merges `headers` into the request, replacing existing names.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Bounds the whole exchange, from connecting until the body is read.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// HTTP response that carries a lazily consumed body.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: HttpBodyStream,
}

/// Raw chunk sequence produced by [`HttpTransport::send_stream`].
///
/// The sequence is finite and ends when the server closes the connection. Dropping it
/// releases the underlying connection.
pub type HttpBodyStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, GemError>> + Send>>;

/// Case-insensitive header lookup.
pub fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Extracts the `Retry-After` header (in seconds) if present.
///
/// HTTP-date values are ignored; the API only uses the numeric form.
pub fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    header(headers, "retry-after")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Transport abstraction decoupling the client from the concrete HTTP stack.
///
/// Implementations issue exactly one request per call and never retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and resolves when the full response is available.
    ///
    /// # Examples
    ///
    /// ```
    /// # use async_trait::async_trait;
    /// # use mygem::http::{HttpTransport, HttpRequest, HttpResponse, HttpStreamResponse};
    /// # use mygem::error::GemError;
    /// # use futures_util::stream;
    /// struct MemoryTransport;
    ///
    /// #[async_trait]
    /// impl HttpTransport for MemoryTransport {
    ///     async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GemError> {
    ///         Ok(HttpResponse { status: 200, headers: request.headers, body: b"ok".to_vec() })
    ///     }
    ///     async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, GemError> {
    ///         Ok(HttpStreamResponse { status: 200, headers: request.headers, body: Box::pin(stream::empty()) })
    ///     }
    /// }
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let response = MemoryTransport
    ///     .send(HttpRequest::post_json("https://example.com", br"{}".to_vec()))
    ///     .await
    ///     .unwrap();
    /// assert_eq!(response.status, 200);
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// Implementations map connection, DNS and timeout failures to
    /// [`GemError::Network`].
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GemError>;

    /// Sends a request and returns as soon as the response headers arrive.
    ///
    /// # Errors
    ///
    /// Same as [`HttpTransport::send`]; failures while reading the body surface as
    /// `Err` items of the returned stream.
    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, GemError>;
}

/// Thread-safe handle to a transport implementation.
pub type DynHttpTransport = Arc<dyn HttpTransport>;

/// Serializes `body` to JSON and builds a POST request carrying `headers`.
///
/// # Errors
///
/// Returns [`GemError::Protocol`] when serialization fails.
pub fn json_request<T: Serialize>(
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
) -> Result<HttpRequest, GemError> {
    let payload = serde_json::to_vec(body)
        .map_err(|err| GemError::protocol(format!("failed to serialize request: {err}")))?;
    Ok(HttpRequest::post_json(url, payload).with_headers(headers))
}

pub mod reqwest;
