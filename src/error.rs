use std::time::Duration;

use thiserror::Error;

/// HTTP statuses that signal a transient condition worth retrying.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Google RPC status names that accompany transient in-stream errors.
const TRANSIENT_RPC_STATUSES: [&str; 4] = [
    "RESOURCE_EXHAUSTED",
    "UNAVAILABLE",
    "INTERNAL",
    "DEADLINE_EXCEEDED",
];

/// Aggregates every failure mode exposed by the request pipeline.
///
/// Only the retry controller inspects the variant to decide whether another attempt
/// is worthwhile; everything above it observes a single terminal error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GemError {
    /// Raised when a parameter or environment value is outside its valid range.
    #[error("invalid configuration for {field}: {reason}")]
    Config {
        /// Name of the offending setting, such as `temperature`.
        field: String,
        /// Additional context explaining why the value is invalid.
        reason: String,
    },
    /// Connection, DNS, timeout or body-read failures.
    #[error("network error: {message}")]
    Network { message: String },
    /// Non-2xx response from the API.
    #[error("http error {status}: {message}")]
    Http {
        status: u16,
        /// Message extracted from the error envelope, or the raw body.
        message: String,
        /// Wait duration suggested by the server via `Retry-After`.
        retry_after: Option<Duration>,
    },
    /// The response could not be framed or parsed as expected.
    #[error("protocol error: {message}")]
    Protocol { message: String },
    /// Error envelope delivered inside an otherwise successful response.
    #[error("gemini error {code}: {message}")]
    Api {
        code: i64,
        /// Google RPC status name, for example `UNAVAILABLE`.
        status: Option<String>,
        message: String,
    },
    /// The prompt was rejected before any candidate was produced.
    #[error("prompt blocked: {reason}")]
    Blocked { reason: String },
    /// Every permitted attempt failed with a retryable error.
    #[error("giving up after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: Box<GemError> },
    /// Conversation invariant violated; indicates a defect in the caller.
    #[error("conversation state error: {message}")]
    State { message: String },
    /// The caller cancelled the in-flight request.
    #[error("request aborted: {message}")]
    Aborted { message: String },
}

impl GemError {
    /// Creates a [`GemError::Config`] for the given field.
    ///
    /// # Examples
    ///
    /// ```
    /// use mygem::error::GemError;
    ///
    /// let err = GemError::config("temperature", "must be within [0, 1]");
    /// assert!(matches!(err, GemError::Config { .. }));
    /// assert!(!err.is_retryable());
    /// ```
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`GemError::Network`] from a textual description.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a [`GemError::Protocol`] from a textual description.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a [`GemError::State`] from a textual description.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Returns `true` when another attempt may succeed.
    ///
    /// Truncated or garbled streams count as transient because intermediate proxies
    /// occasionally cut long-lived connections.
    ///
    /// # Examples
    ///
    /// ```
    /// use mygem::error::GemError;
    ///
    /// let unavailable = GemError::Http { status: 503, message: "overloaded".into(), retry_after: None };
    /// let unauthorized = GemError::Http { status: 401, message: "bad key".into(), retry_after: None };
    /// assert!(unavailable.is_retryable());
    /// assert!(!unauthorized.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Protocol { .. } => true,
            Self::Http { status, .. } => RETRYABLE_STATUSES.contains(status),
            Self::Api { code, status, .. } => {
                matches!(code, 429 | 500 | 503 | 504)
                    || status
                        .as_deref()
                        .is_some_and(|s| TRANSIENT_RPC_STATUSES.contains(&s))
            }
            Self::Config { .. }
            | Self::Blocked { .. }
            | Self::ExhaustedRetries { .. }
            | Self::State { .. }
            | Self::Aborted { .. } => false,
        }
    }

    /// Server-suggested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Maps the error onto the process exit status used by the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::Http { .. } | Self::Api { .. } | Self::Blocked { .. } => 1,
            Self::ExhaustedRetries { last, .. } => last.exit_code(),
            Self::Aborted { .. } => 130,
            Self::Network { .. } | Self::Protocol { .. } | Self::State { .. } => 2,
        }
    }
}
