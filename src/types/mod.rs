//! Shared data structures for conversations, generation settings and decoded output.

use serde::{Deserialize, Serialize};

use crate::error::GemError;

/// Model used when neither `--model` nor `MYGEM_MODEL` is supplied.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// Sampling temperature used when none is supplied.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Originating side of a [`Turn`], serialized the way Gemini expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One message of a conversation.
///
/// # Examples
///
/// ```
/// # use mygem::types::{Role, Turn};
/// let turn = Turn::user("hello");
/// assert_eq!(turn.role, Role::User);
/// assert_eq!(turn.text, "hello");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Generation parameters applied to a single request.
///
/// The value is assembled once from merged CLI/environment defaults and is not
/// modified while a request (including its retries) is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    /// Model identifier, with or without the `models/` prefix.
    pub model: String,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f32,
    /// Upper bound on generated tokens; must be positive when set.
    pub max_output_tokens: Option<u32>,
    /// Free-form response style mapped onto a system instruction.
    pub style: Option<String>,
}

impl GenerationConfig {
    /// Creates a config for `model` using the default temperature.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: None,
            style: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Checks the ranges the request builder relies on.
    ///
    /// # Errors
    ///
    /// Returns [`GemError::Config`] when the model is blank, the temperature is not
    /// a finite value in `[0, 1]`, or `max_output_tokens` is zero.
    pub fn validate(&self) -> Result<(), GemError> {
        if self.model.trim().is_empty() {
            return Err(GemError::config("model", "must not be empty"));
        }
        if !self.temperature.is_finite() || !(0.0..=1.0).contains(&self.temperature) {
            return Err(GemError::config(
                "temperature",
                format!("{} is outside [0.0, 1.0]", self.temperature),
            ));
        }
        if self.max_output_tokens == Some(0) {
            return Err(GemError::config("max_output_tokens", "must be positive"));
        }
        Ok(())
    }

    /// Returns the style when it carries non-whitespace content.
    pub fn effective_style(&self) -> Option<&str> {
        self.style
            .as_deref()
            .map(str::trim)
            .filter(|style| !style.is_empty())
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

/// Normalized output unit of the stream decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    /// Incremental text fragment, in arrival order.
    TextDelta(String),
    /// The body ended without an error.
    Done,
    /// Terminal failure; no further events follow.
    Error(GemError),
}
