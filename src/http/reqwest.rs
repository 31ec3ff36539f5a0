use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::GemError;

use super::{
    DynHttpTransport, HttpBodyStream, HttpRequest, HttpResponse, HttpStreamResponse,
    HttpTransport,
};

/// Default [`HttpTransport`] backed by reqwest.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Wraps a caller-configured reqwest client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a transport with reqwest's default settings.
    pub fn default_client() -> Result<Self, GemError> {
        Client::builder()
            .build()
            .map(Self::new)
            .map_err(|err| GemError::network(format!("failed to create reqwest client: {err}")))
    }

    fn build_request(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder, GemError> {
        let HttpRequest {
            url,
            headers,
            body,
            timeout,
        } = request;
        let mut builder = self.client.post(&url);

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| GemError::config("header", format!("invalid name {name}: {err}")))?;
            let header_value = HeaderValue::from_str(&value).map_err(|err| {
                GemError::config("header", format!("invalid value for {header_name}: {err}"))
            })?;
            builder = builder.header(header_name, header_value);
        }

        Ok(builder.body(body))
    }

    fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}

fn network_error(err: reqwest::Error) -> GemError {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_body() || err.is_decode() {
        "body read failed"
    } else {
        "request failed"
    };
    GemError::network(format!("{kind}: {err}"))
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GemError> {
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let body = response.bytes().await.map_err(network_error)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, GemError> {
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(network_error));
        let body: HttpBodyStream = Box::pin(stream);

        Ok(HttpStreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Convenience constructor for a shareable reqwest-backed transport.
pub fn default_dyn_transport() -> Result<DynHttpTransport, GemError> {
    Ok(Arc::new(ReqwestTransport::default_client()?))
}
