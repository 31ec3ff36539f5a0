use crate::error::GemError;
use crate::types::{GenerationConfig, Turn};

use super::types::{Content, GenerateContentRequest, GenerationParams};

/// Separator placed between the prompt and attached file/stdin material.
pub const CONTENT_SEPARATOR: &str = "\n\n";

/// Fully built request for one logical call.
///
/// The payload is rebuilt for every attempt; it carries the new user turn so the
/// caller can append it to the conversation once the call succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPayload {
    /// Model path used in the endpoint, always prefixed with `models/`.
    pub model: String,
    /// User turn introduced by this request.
    pub user_turn: Turn,
    pub body: GenerateContentRequest,
}

/// Builds the Gemini GenerateContent request body.
///
/// The model travels in the URL path (`POST /v1beta/models/{model}:generateContent`),
/// so it is returned alongside the body rather than inside it. `history` is replayed
/// verbatim before the new user turn; the style becomes a system instruction.
///
/// # Errors
///
/// Returns [`GemError::Config`] when `config` fails [`GenerationConfig::validate`].
///
/// # Examples
///
/// ```
/// use mygem::provider::google_gemini::build_request;
/// use mygem::types::GenerationConfig;
///
/// let payload = build_request("Summarize", &[], &GenerationConfig::default(), Some("notes")).unwrap();
/// assert_eq!(payload.user_turn.text, "Summarize\n\nnotes");
/// assert_eq!(payload.body.contents.len(), 1);
/// ```
pub fn build_request(
    prompt: &str,
    history: &[Turn],
    config: &GenerationConfig,
    extra_content: Option<&str>,
) -> Result<RequestPayload, GemError> {
    config.validate()?;

    let user_turn = Turn::user(join_prompt(prompt, extra_content));

    let contents = history
        .iter()
        .chain(std::iter::once(&user_turn))
        .map(|turn| Content::text(Some(turn.role.as_str()), turn.text.clone()))
        .collect();

    let system_instruction = config
        .effective_style()
        .map(|style| Content::text(None, format!("Respond in a {style} style.")));

    let body = GenerateContentRequest {
        contents,
        system_instruction,
        generation_config: GenerationParams {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        },
    };

    Ok(RequestPayload {
        model: normalize_model(&config.model),
        user_turn,
        body,
    })
}

/// Combines prompt text with attached material, skipping empty pieces.
pub fn join_prompt(prompt: &str, extra_content: Option<&str>) -> String {
    let extra = extra_content.unwrap_or_default();
    match (prompt.is_empty(), extra.is_empty()) {
        (false, false) => format!("{prompt}{CONTENT_SEPARATOR}{extra}"),
        (false, true) => prompt.to_string(),
        (true, _) => extra.to_string(),
    }
}

fn normalize_model(model: &str) -> String {
    let model = model.trim();
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_history_and_new_turn_in_order() {
        let history = vec![Turn::user("hi"), Turn::model("hello!")];
        let config = GenerationConfig::new("gemini-1.5-pro")
            .with_temperature(0.7)
            .with_max_output_tokens(256);

        let payload = build_request("and now?", &history, &config, None).expect("valid config");
        assert_eq!(payload.model, "models/gemini-1.5-pro");
        assert_eq!(payload.user_turn, Turn::user("and now?"));

        let body = serde_json::to_value(&payload.body).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "hi"}]},
                    {"role": "model", "parts": [{"text": "hello!"}]},
                    {"role": "user", "parts": [{"text": "and now?"}]}
                ],
                "generationConfig": {"temperature": 0.7f32, "maxOutputTokens": 256}
            })
        );
    }

    #[test]
    fn style_becomes_system_instruction_not_turn() {
        let config = GenerationConfig::default().with_style("technical");
        let payload = build_request("explain TCP", &[], &config, None).unwrap();

        assert_eq!(payload.body.contents.len(), 1);
        let body = serde_json::to_value(&payload.body).unwrap();
        assert_eq!(
            body["systemInstruction"],
            json!({"parts": [{"text": "Respond in a technical style."}]})
        );
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn joins_extra_content_with_separator() {
        assert_eq!(join_prompt("review", Some("fn main() {}")), "review\n\nfn main() {}");
        assert_eq!(join_prompt("", Some("only stdin")), "only stdin");
        assert_eq!(join_prompt("only prompt", Some("")), "only prompt");
        assert_eq!(join_prompt("only prompt", None), "only prompt");
    }

    #[test]
    fn keeps_existing_model_prefix() {
        let config = GenerationConfig::new("models/gemini-1.5-flash");
        let payload = build_request("x", &[], &config, None).unwrap();
        assert_eq!(payload.model, "models/gemini-1.5-flash");
    }

    #[test]
    fn rejects_invalid_config() {
        let err = build_request("x", &[], &GenerationConfig::default().with_temperature(1.5), None)
            .unwrap_err();
        assert!(matches!(err, GemError::Config { .. }));

        let err = build_request("x", &[], &GenerationConfig::new(""), None).unwrap_err();
        assert!(matches!(err, GemError::Config { .. }));
    }

    #[test]
    fn never_fails_for_valid_configs() {
        let history = vec![Turn::user("a"), Turn::model("b")];
        for step in 0..=20 {
            let temperature = step as f32 / 20.0;
            for max in [None, Some(1), Some(8192)] {
                let mut config = GenerationConfig::new("gemini-2.0-flash").with_temperature(temperature);
                config.max_output_tokens = max;
                assert!(build_request("prompt", &history, &config, Some("extra")).is_ok());
                assert!(build_request("", &[], &config, None).is_ok());
            }
        }
    }
}
