use serde::{Deserialize, Serialize};

/// Body of `generateContent` / `streamGenerateContent`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// Ordered turn list, oldest first.
    pub contents: Vec<Content>,
    /// Style directive; never part of `contents`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub generation_config: GenerationParams,
}

/// One role-tagged turn on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<TextPart>,
}

impl Content {
    pub(crate) fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![TextPart { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPart {
    pub text: String,
}

/// `generationConfig` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// GenerateContentResponse; shared by buffered bodies and individual stream events.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiGenerateContentResponse {
    #[serde(default)]
    pub(crate) candidates: Vec<GeminiCandidate>,
    #[serde(default, rename = "promptFeedback")]
    pub(crate) prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default, rename = "usageMetadata")]
    pub(crate) usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default, rename = "modelVersion")]
    pub(crate) model_version: Option<String>,
    /// Error envelope occasionally embedded in a 200 stream.
    #[serde(default)]
    pub(crate) error: Option<GeminiErrorEnvelope>,
}

impl GeminiGenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    pub(crate) fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    pub(crate) fn finish_reason(&self) -> Option<&str> {
        self.candidates
            .iter()
            .find_map(|candidate| candidate.finish_reason.as_deref())
    }

    /// Block reason when the prompt was rejected outright.
    pub(crate) fn block_reason(&self) -> Option<&str> {
        if !self.candidates.is_empty() {
            return None;
        }
        self.prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiCandidate {
    #[serde(default)]
    pub(crate) content: Option<GeminiContent>,
    #[serde(default, rename = "finishReason")]
    pub(crate) finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(default)]
    pub(crate) parts: Vec<GeminiPart>,
}

/// Content part; only `text` is read, other part kinds are skipped.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiPart {
    #[serde(default)]
    pub(crate) text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiPromptFeedback {
    #[serde(default, rename = "blockReason")]
    pub(crate) block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    pub(crate) prompt_token_count: Option<u64>,
    #[serde(rename = "candidatesTokenCount", default)]
    pub(crate) candidates_token_count: Option<u64>,
    #[serde(rename = "totalTokenCount", default)]
    pub(crate) total_token_count: Option<u64>,
}

/// `{"error": {...}}` payload used by both HTTP error bodies and in-stream errors.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiErrorEnvelope {
    #[serde(default)]
    pub(crate) code: Option<i64>,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<String>,
}
