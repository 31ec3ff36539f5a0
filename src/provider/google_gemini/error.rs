use std::time::Duration;

use serde::Deserialize;

use crate::error::GemError;

use super::types::GeminiErrorEnvelope;

/// Parses a non-2xx response body into [`GemError::Http`].
///
/// The status always comes from the HTTP layer; the envelope only enriches the
/// message. Unparseable bodies are kept verbatim.
pub(crate) fn parse_gemini_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> GemError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiErrorEnvelope>,
    }

    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: Some(envelope),
        }) => describe(&envelope),
        _ if body.trim().is_empty() => "empty response body".to_string(),
        _ => body.trim().to_string(),
    };

    GemError::Http {
        status,
        message,
        retry_after,
    }
}

/// Converts an error envelope found inside a successful response.
pub(crate) fn envelope_to_error(envelope: &GeminiErrorEnvelope) -> GemError {
    GemError::Api {
        code: envelope.code.unwrap_or_default(),
        status: envelope.status.clone().filter(|s| !s.is_empty()),
        message: envelope
            .message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string()),
    }
}

fn describe(envelope: &GeminiErrorEnvelope) -> String {
    let message = envelope
        .message
        .clone()
        .unwrap_or_else(|| "unknown error".to_string());
    match envelope.status.as_deref() {
        Some(status) if !status.is_empty() => format!("{message} ({status})"),
        _ => message,
    }
}
