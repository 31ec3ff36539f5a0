use std::collections::HashMap;
use std::time::Duration;

use futures_util::stream;
use tracing::debug;

use crate::error::GemError;
use crate::http::{
    DynHttpTransport, HttpBodyStream, HttpResponse, HttpStreamResponse, header, json_request,
    retry_after_from_headers,
};

use super::error::parse_gemini_error;
use super::request::RequestPayload;
use super::stream::{Framing, StreamDecoder, collect_stream_text};

/// Public Generative Language endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Matches the timeout the CLI has always used for a single exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Successful response whose body has not been consumed yet.
///
/// Streaming responses yield chunks lazily as the server flushes them; buffered
/// responses expose the full body as a single chunk.
pub struct RawResponse {
    pub framing: Framing,
    pub body: HttpBodyStream,
}

impl RawResponse {
    /// Hands the body to a [`StreamDecoder`]. The handle is consumed.
    pub fn decode(self) -> StreamDecoder {
        StreamDecoder::new(self.body, self.framing)
    }
}

/// Google Gemini GenerateContent client.
///
/// Every [`GeminiClient::send`] issues exactly one POST and never retries; retry
/// policy belongs to [`crate::provider::retry::RetryController`].
pub struct GeminiClient {
    transport: DynHttpTransport,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiClient {
    /// Creates a client that targets the default Google Generative Language endpoint.
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the base URL, making it easier to point at proxies or test servers.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the endpoint URL for `model` (already prefixed with `models/`).
    pub fn endpoint(&self, model: &str, streaming: bool) -> String {
        let base = self.base_url.trim_end_matches('/');
        let prefix = if base.ends_with("/v1beta") {
            base.to_string()
        } else {
            format!("{base}/v1beta")
        };
        if streaming {
            format!("{prefix}/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("{prefix}/{model}:generateContent")
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        HashMap::from([("x-goog-api-key".to_string(), self.api_key.clone())])
    }

    /// Issues one POST for `payload`.
    ///
    /// # Errors
    ///
    /// - [`GemError::Network`] for connection, DNS and timeout failures;
    /// - [`GemError::Http`] for non-2xx statuses, carrying the parsed error envelope;
    /// - [`GemError::Protocol`] when the response content type is not the expected one.
    pub async fn send(
        &self,
        payload: &RequestPayload,
        streaming: bool,
    ) -> Result<RawResponse, GemError> {
        let url = self.endpoint(&payload.model, streaming);
        debug!(%url, streaming, "sending request");
        if let Ok(body) = serde_json::to_string_pretty(&payload.body) {
            debug!("request body: {body}");
        }
        let request = json_request(url, self.build_headers(), &payload.body)?
            .with_timeout(self.timeout);

        if streaming {
            let HttpStreamResponse {
                status,
                headers,
                body,
            } = self.transport.send_stream(request).await?;
            if !(200..300).contains(&status) {
                // The status decides retryability, so an unreadable body must not
                // turn a fatal response into a network failure.
                let text = collect_stream_text(body).await.unwrap_or_else(|err| {
                    debug!(status, error = %err, "error body could not be read");
                    String::new()
                });
                return Err(parse_gemini_error(
                    status,
                    &text,
                    retry_after_from_headers(&headers),
                ));
            }
            expect_content_type(&headers, "text/event-stream")?;
            Ok(RawResponse {
                framing: Framing::Sse,
                body,
            })
        } else {
            let HttpResponse {
                status,
                headers,
                body,
            } = self.transport.send(request).await?;
            if !(200..300).contains(&status) {
                return Err(parse_gemini_error(
                    status,
                    &String::from_utf8_lossy(&body),
                    retry_after_from_headers(&headers),
                ));
            }
            expect_content_type(&headers, "application/json")?;
            let single: HttpBodyStream = Box::pin(stream::once(async move { Ok(body) }));
            Ok(RawResponse {
                framing: Framing::WholeBody,
                body: single,
            })
        }
    }
}

/// Rejects responses that declare an unexpected media type. A missing header is tolerated.
fn expect_content_type(
    headers: &HashMap<String, String>,
    expected: &str,
) -> Result<(), GemError> {
    match header(headers, "content-type") {
        Some(value) => {
            let media_type = value.split(';').next().unwrap_or_default().trim();
            if media_type.eq_ignore_ascii_case(expected) {
                Ok(())
            } else {
                Err(GemError::protocol(format!(
                    "expected {expected} response, got {value}"
                )))
            }
        }
        None => Ok(()),
    }
}
