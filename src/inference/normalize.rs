//! Response normalization.
//!
//! Chat completions are reshaped into [`ChatCompletion`] with every missing
//! field defaulted, so callers never see raw provider JSON for that task.
//! Other task kinds keep the decoded JSON, with only light reshaping for text
//! generation and the model listing.

use serde_json::Value;

use super::errors::InferenceError;
use super::types::{ChatChoice, ChatCompletion, ChoiceMessage, GeneratedText, ModelSummary};

static NULL: Value = Value::Null;

/// Decode a response body that must be JSON.
pub fn decode_json(body: &[u8]) -> Result<Value, InferenceError> {
    serde_json::from_slice(body).map_err(|e| InferenceError::DecodeFailed {
        reason: e.to_string(),
    })
}

/// String form of a scalar; `None` for null.
fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn string_field(raw: &Value, key: &str, default: &str) -> String {
    raw.get(key)
        .and_then(coerce_string)
        .unwrap_or_else(|| default.to_string())
}

/// Present and non-null.
fn present<'a>(raw: &'a Value, key: &str) -> Option<&'a Value> {
    raw.get(key).filter(|v| !v.is_null())
}

// ─── Chat ────────────────────────────────────────────────────────────────────

/// Map a decoded chat response (or one streamed frame) onto the normalized shape.
///
/// Never fails: anything absent or of the wrong type falls back to its default.
pub fn normalize_chat(raw: &Value) -> ChatCompletion {
    let created = present(raw, "created")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    let choices: Vec<ChatChoice> = raw
        .get("choices")
        .and_then(Value::as_array)
        .map(|choices| choices.iter().map(normalize_choice).collect())
        .unwrap_or_default();

    ChatCompletion {
        id: string_field(raw, "id", ""),
        object: string_field(raw, "object", "chat.completion"),
        created,
        model: string_field(raw, "model", ""),
        choices,
        usage: present(raw, "usage").cloned(),
    }
}

fn normalize_choice(choice: &Value) -> ChatChoice {
    // Streamed frames from OpenAI-compatible backends carry `delta` instead of `message`.
    let message = present(choice, "message")
        .or_else(|| present(choice, "delta"))
        .unwrap_or(&NULL);

    ChatChoice {
        index: choice.get("index").and_then(Value::as_u64).unwrap_or(0),
        message: ChoiceMessage {
            role: string_field(message, "role", "assistant"),
            content: string_field(message, "content", ""),
            tool_calls: present(message, "tool_calls").cloned(),
        },
        finish_reason: choice.get("finish_reason").and_then(coerce_string),
    }
}

// ─── Other task kinds ────────────────────────────────────────────────────────

fn items(raw: Value, what: &str) -> Result<Vec<Value>, InferenceError> {
    match raw {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![raw]),
        other => Err(InferenceError::DecodeFailed {
            reason: format!("expected a list of {what}, got {other}"),
        }),
    }
}

/// Reduce each generation result to `{generated_text}`.
///
/// A single object is treated as a one-element list.
pub fn normalize_text_generation(raw: Value) -> Result<Vec<GeneratedText>, InferenceError> {
    Ok(items(raw, "generations")?
        .iter()
        .map(|item| GeneratedText {
            generated_text: string_field(item, "generated_text", ""),
        })
        .collect())
}

/// Reduce each hub listing entry to `{id}`.
pub fn normalize_model_list(raw: Value) -> Result<Vec<ModelSummary>, InferenceError> {
    Ok(items(raw, "models")?
        .iter()
        .map(|item| ModelSummary {
            id: string_field(item, "id", ""),
        })
        .collect())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_chat_fills_defaults() {
        let before = chrono::Utc::now().timestamp();
        let chat = normalize_chat(&json!({
            "choices": [{"message": {"content": "This is a chat response."}}]
        }));

        assert_eq!(chat.id, "");
        assert_eq!(chat.object, "chat.completion");
        assert!(chat.created >= before);
        assert_eq!(chat.model, "");
        assert!(chat.usage.is_none());

        let choice = &chat.choices[0];
        assert_eq!(choice.index, 0);
        assert_eq!(choice.message.role, "assistant");
        assert_eq!(choice.message.content, "This is a chat response.");
        assert!(choice.message.tool_calls.is_none());
        assert!(choice.finish_reason.is_none());
    }

    #[test]
    fn test_normalize_chat_keeps_present_fields() {
        let chat = normalize_chat(&json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "meta-llama/Llama-3.1-8B-Instruct",
            "choices": [{
                "index": 2,
                "message": {"role": "assistant", "content": null},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}
        }));

        assert_eq!(chat.id, "chatcmpl-1");
        assert_eq!(chat.created, 1_700_000_000);
        assert_eq!(chat.choices[0].index, 2);
        assert_eq!(chat.choices[0].message.content, "");
        assert_eq!(chat.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(chat.usage.unwrap()["total_tokens"], 12);
    }

    #[test]
    fn test_normalize_chat_tool_calls_passthrough() {
        let chat = normalize_chat(&json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "get_weather",
                            "arguments": "{\"location\": \"New York\", \"unit\": \"celsius\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }));

        let calls = chat.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0]["function"]["name"], "get_weather");
        assert_eq!(
            calls[0]["function"]["arguments"],
            "{\"location\": \"New York\", \"unit\": \"celsius\"}"
        );
    }

    #[test]
    fn test_normalize_chat_reads_delta() {
        let chat = normalize_chat(&json!({
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hi"}}]
        }));
        assert_eq!(chat.object, "chat.completion.chunk");
        assert_eq!(chat.first_content(), Some("Hi"));
    }

    #[test]
    fn test_normalize_chat_non_object() {
        let chat = normalize_chat(&json!("unexpected"));
        assert!(chat.choices.is_empty());
        assert_eq!(chat.object, "chat.completion");
    }

    #[test]
    fn test_normalize_text_generation() {
        let out = normalize_text_generation(json!([
            {"generated_text": "This is a generated text."},
            {"other": 1}
        ]))
        .unwrap();
        assert_eq!(out[0].generated_text, "This is a generated text.");
        assert_eq!(out[1].generated_text, "");
    }

    #[test]
    fn test_normalize_text_generation_rejects_scalar() {
        let result = normalize_text_generation(json!(3));
        assert!(matches!(result, Err(InferenceError::DecodeFailed { .. })));
    }

    #[test]
    fn test_normalize_model_list() {
        let out = normalize_model_list(json!([{"id": "model1"}, {"id": "model2"}])).unwrap();
        assert_eq!(
            out,
            vec![
                ModelSummary { id: "model1".into() },
                ModelSummary { id: "model2".into() }
            ]
        );
    }

    #[test]
    fn test_decode_json_failure() {
        let err = decode_json(b"<html>oops</html>").unwrap_err();
        assert!(err.to_string().starts_with("failed to decode response"));
    }
}
