//! Command-line client for Google Gemini: streamed responses, multi-turn chat and
//! bounded retries.

pub mod cli;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod http;
pub mod logging;
pub mod provider;
pub mod render;
pub mod session;
pub mod types;

pub use config::Settings;
pub use conversation::Conversation;
pub use error::GemError;
pub use provider::google_gemini::GeminiClient;
pub use provider::retry::{Completion, RetryController, RetryPolicy};
pub use session::Session;
pub use types::*;
