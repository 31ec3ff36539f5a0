//! Google Gemini GenerateContent protocol: request building, the single-call client
//! and the incremental response decoder.

mod error;
mod provider;
mod request;
mod stream;
mod types;

pub use provider::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, GeminiClient, RawResponse};
pub use request::{CONTENT_SEPARATOR, RequestPayload, build_request, join_prompt};
pub use stream::{Framing, StreamDecoder};
pub use types::{Content, GenerateContentRequest, GenerationParams, TextPart};
