use agentforge_common::{ChatMessage, Role};
use serde_json::Value;

/// Outcome of one chat-completion call that reached the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamReply {
    /// 2xx with `choices[0].message` holding text content.
    Completion { payload: Value, message: ChatMessage },
    /// 2xx without any choices.
    EmptyChoices { payload: Value },
    /// 2xx with a first choice whose message cannot be read.
    MalformedChoice { payload: Value },
    /// Non-2xx status, with the user-facing detail already derived.
    ProviderError { status: u16, detail: String },
    /// 2xx whose body is not a JSON object.
    Undecodable { reason: String },
}

/// Outcome of one image-generation call that reached the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageReply {
    Generated { data: Value, url: Option<String> },
    ProviderError { status: u16, detail: String },
    Undecodable { reason: String },
}

pub fn classify_chat(model: &str, status: u16, body: &str) -> UpstreamReply {
    if !(200..300).contains(&status) {
        return UpstreamReply::ProviderError {
            status,
            detail: chat_error_detail(model, body),
        };
    }

    let payload = match decode_object(body) {
        Ok(payload) => payload,
        Err(reason) => return UpstreamReply::Undecodable { reason },
    };

    let first = match payload.get("choices").and_then(Value::as_array) {
        Some(choices) if !choices.is_empty() => &choices[0],
        _ => return UpstreamReply::EmptyChoices { payload },
    };

    match first
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
    {
        Some(content) => {
            let message = ChatMessage::new(Role::Assistant, content);
            UpstreamReply::Completion { payload, message }
        }
        None => UpstreamReply::MalformedChoice { payload },
    }
}

pub fn classify_image(model: &str, status: u16, body: &str) -> ImageReply {
    if !(200..300).contains(&status) {
        let detail = match provider_message(body) {
            Some(message) => format!("Error with image model {model}: {message}"),
            None => format!("Error calling Together API with image model {model}: {body}"),
        };
        return ImageReply::ProviderError { status, detail };
    }

    let payload = match decode_object(body) {
        Ok(payload) => payload,
        Err(reason) => return ImageReply::Undecodable { reason },
    };

    match payload.get("data") {
        Some(Value::Array(items)) if !items.is_empty() => {
            let url = items[0]
                .get("url")
                .and_then(Value::as_str)
                .map(str::to_string);
            ImageReply::Generated {
                data: Value::Array(items.clone()),
                url,
            }
        }
        _ => ImageReply::Undecodable {
            reason: "image response has no data".to_string(),
        },
    }
}

/// User-facing detail for a non-2xx chat response.
pub fn chat_error_detail(model: &str, body: &str) -> String {
    let Some(message) = provider_message(body) else {
        return format!("Error calling Together API with model {model}: {body}");
    };

    let lower = message.to_lowercase();
    if lower.contains("quota") || lower.contains("rate") {
        format!("API rate limit or quota exceeded for {model}. Please try again later.")
    } else if lower.contains("not found") || lower.contains("unavailable") {
        format!("The model {model} appears to be unavailable. Please try a different model.")
    } else {
        format!("Error with model {model}: {message}")
    }
}

/// `error.message` from a structured provider error body. A body with an
/// `error` object but no message reads as "Unknown error".
fn provider_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string(),
    )
}

fn decode_object(body: &str) -> std::result::Result<Value, String> {
    match serde_json::from_str::<Value>(body) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(format!("expected a JSON object, got {other}")),
        Err(e) => Err(format!("invalid JSON from provider: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MODEL: &str = "mistralai/Mixtral-8x7B-Instruct-v0.1";

    #[test]
    fn well_formed_completion() {
        let body = json!({
            "id": "cmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi!"}}]
        })
        .to_string();
        match classify_chat(MODEL, 200, &body) {
            UpstreamReply::Completion { payload, message } => {
                assert_eq!(message, ChatMessage::assistant("Hi!"));
                assert_eq!(payload["id"], "cmpl-1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_or_empty_choices() {
        assert!(matches!(
            classify_chat(MODEL, 200, r#"{"id": "x"}"#),
            UpstreamReply::EmptyChoices { .. }
        ));
        assert!(matches!(
            classify_chat(MODEL, 200, r#"{"choices": []}"#),
            UpstreamReply::EmptyChoices { .. }
        ));
    }

    #[test]
    fn choice_without_text_is_malformed() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        assert!(matches!(
            classify_chat(MODEL, 200, body),
            UpstreamReply::MalformedChoice { .. }
        ));
    }

    #[test]
    fn non_json_success_is_undecodable() {
        assert!(matches!(
            classify_chat(MODEL, 200, "<html>busy</html>"),
            UpstreamReply::Undecodable { .. }
        ));
        assert!(matches!(
            classify_chat(MODEL, 200, "[1, 2]"),
            UpstreamReply::Undecodable { .. }
        ));
    }

    #[test]
    fn provider_errors_are_classified_by_message() {
        let cases = [
            (
                r#"{"error": {"message": "Rate limit reached"}}"#,
                format!("API rate limit or quota exceeded for {MODEL}. Please try again later."),
            ),
            (
                r#"{"error": {"message": "Model not found"}}"#,
                format!("The model {MODEL} appears to be unavailable. Please try a different model."),
            ),
            (
                r#"{"error": {"message": "bad input"}}"#,
                format!("Error with model {MODEL}: bad input"),
            ),
            (
                r#"{"error": {}}"#,
                format!("Error with model {MODEL}: Unknown error"),
            ),
            (
                "gateway timeout",
                format!("Error calling Together API with model {MODEL}: gateway timeout"),
            ),
        ];
        for (body, expected) in cases {
            assert_eq!(
                classify_chat(MODEL, 429, body),
                UpstreamReply::ProviderError {
                    status: 429,
                    detail: expected
                }
            );
        }
    }

    #[test]
    fn image_outcomes() {
        let ok = r#"{"data": [{"url": "https://img.example/a.png"}]}"#;
        match classify_image("sd", 200, ok) {
            ImageReply::Generated { url, data } => {
                assert_eq!(url.as_deref(), Some("https://img.example/a.png"));
                assert_eq!(data.as_array().map(Vec::len), Some(1));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            classify_image("sd", 200, r#"{"data": []}"#),
            ImageReply::Undecodable { .. }
        ));

        assert_eq!(
            classify_image("sd", 400, r#"{"error": {"message": "NSFW"}}"#),
            ImageReply::ProviderError {
                status: 400,
                detail: "Error with image model sd: NSFW".to_string()
            }
        );
    }
}
