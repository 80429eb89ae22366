//! Request building.
//!
//! Turns a [`TaskRequest`] plus the state of the current attempt into a
//! transport-agnostic [`HttpRequest`]: URL, headers and a JSON or multipart
//! body.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::config::ClientConfig;
use super::errors::InferenceError;
use super::retry::RetryState;
use super::transport::{HttpRequest, Method, MultipartPart, PartContents, RequestBody};
use super::types::{
    BinaryInput, ChatInput, ChatMode, ChatParameter, Parameters, TaskInput, TaskKind, TaskRequest,
};

pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_ACCEPT: &str = "Accept";
pub const HEADER_USE_CACHE: &str = "x-use-cache";
pub const HEADER_WAIT_FOR_MODEL: &str = "x-wait-for-model";

// ─── Headers ─────────────────────────────────────────────────────────────────

/// Build the header set for one attempt.
///
/// The bearer credential is always present. The cache directive appears only
/// when caching is off, the wait directive only when it is on for this
/// attempt, and `Content-Type` only for JSON bodies.
pub fn prepare_headers(
    access_token: &str,
    use_cache: bool,
    wait_for_model: bool,
    json_body: bool,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert(
        HEADER_AUTHORIZATION.to_string(),
        format!("Bearer {access_token}"),
    );
    if json_body {
        headers.insert(HEADER_CONTENT_TYPE.to_string(), "application/json".to_string());
    }
    if !use_cache {
        headers.insert(HEADER_USE_CACHE.to_string(), "false".to_string());
    }
    if wait_for_model {
        headers.insert(HEADER_WAIT_FOR_MODEL.to_string(), "true".to_string());
    }
    headers
}

// ─── Payloads ────────────────────────────────────────────────────────────────

/// Keep only the chat options the service accepts. Null values count as unset.
pub fn filter_chat_parameters(parameters: &Parameters) -> Parameters {
    parameters
        .iter()
        .filter(|(name, value)| !value.is_null() && ChatParameter::from_name(name).is_some())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn chat_payload(
    input: &ChatInput,
    mode: ChatMode,
    parameters: &Parameters,
) -> Result<Value, InferenceError> {
    let messages = serde_json::to_value(&input.messages).map_err(|e| {
        InferenceError::InvalidInput {
            reason: format!("failed to serialize messages: {e}"),
        }
    })?;

    let mut payload = Parameters::new();
    payload.insert("messages".into(), messages);
    payload.extend(filter_chat_parameters(parameters));

    if let Some(ref tools) = input.tools {
        let tools = serde_json::to_value(tools).map_err(|e| InferenceError::InvalidInput {
            reason: format!("failed to serialize tools: {e}"),
        })?;
        payload.insert(ChatParameter::Tools.as_str().into(), tools);
    }
    if let Some(ref choice) = input.tool_choice {
        payload.insert(ChatParameter::ToolChoice.as_str().into(), json!(choice));
    }
    if let Some(ref prompt) = input.tool_prompt {
        payload.insert(ChatParameter::ToolPrompt.as_str().into(), json!(prompt));
    }

    // Written last so the call mode always wins over a `stream` parameter.
    payload.insert(
        ChatParameter::Stream.as_str().into(),
        json!(mode == ChatMode::Stream),
    );

    Ok(Value::Object(payload))
}

fn inputs_payload(kind: TaskKind, inputs: Value, parameters: &Parameters) -> Value {
    let mut payload = Parameters::new();
    payload.insert("inputs".into(), inputs);
    // Text generation always carries `parameters`, even when empty.
    if kind == TaskKind::TextGeneration || !parameters.is_empty() {
        payload.insert("parameters".into(), Value::Object(parameters.clone()));
    }
    Value::Object(payload)
}

fn multipart_parts(
    part_name: &str,
    binary: &BinaryInput,
    parameters: &Parameters,
) -> Result<Vec<MultipartPart>, InferenceError> {
    let mut parts = vec![MultipartPart {
        name: part_name.to_string(),
        contents: PartContents::File {
            file_name: binary.file_name.clone(),
            data: binary.data.clone(),
        },
    }];

    if !parameters.is_empty() {
        let encoded = serde_json::to_string(parameters).map_err(|e| {
            InferenceError::InvalidInput {
                reason: format!("failed to encode parameters: {e}"),
            }
        })?;
        parts.push(MultipartPart {
            name: "parameters".into(),
            contents: PartContents::Text(encoded),
        });
    }

    Ok(parts)
}

// ─── Builders ────────────────────────────────────────────────────────────────

/// Build the HTTP request for one attempt of a task call.
pub fn build_request(
    config: &ClientConfig,
    request: &TaskRequest,
    state: RetryState,
) -> Result<HttpRequest, InferenceError> {
    let kind = request.kind();
    let parameters = request.parameters();

    let (body, streaming) = match (kind, request.input()) {
        (TaskKind::ChatCompletion, TaskInput::Chat { input, mode }) => (
            RequestBody::Json(chat_payload(input, *mode, parameters)?),
            *mode == ChatMode::Stream,
        ),
        (TaskKind::QuestionAnswering, TaskInput::QuestionAnswering { question, context }) => {
            let inputs = json!({ "question": question, "context": context });
            (RequestBody::Json(inputs_payload(kind, inputs, parameters)), false)
        }
        (
            TaskKind::TextGeneration
            | TaskKind::FeatureExtraction
            | TaskKind::Summarization
            | TaskKind::TextToImage,
            TaskInput::Text(text),
        ) => (
            RequestBody::Json(inputs_payload(kind, json!(text), parameters)),
            false,
        ),
        (_, TaskInput::Binary(binary)) => {
            let part_name = kind.binary_part_name().ok_or_else(|| InferenceError::InvalidInput {
                reason: format!("{kind} does not accept a binary payload"),
            })?;
            (
                RequestBody::Multipart(multipart_parts(part_name, binary, parameters)?),
                false,
            )
        }
        (_, _) => {
            return Err(InferenceError::InvalidInput {
                reason: format!("input does not match task kind {kind}"),
            })
        }
    };

    let json_body = matches!(body, RequestBody::Json(_));
    let mut headers = prepare_headers(
        &config.access_token,
        request.use_cache(),
        state.wait_for_model,
        json_body,
    );
    if streaming {
        headers.insert(HEADER_ACCEPT.to_string(), "text/event-stream".to_string());
    }

    Ok(HttpRequest {
        method: Method::Post,
        url: config.model_url(request.model_id()),
        headers,
        query: Vec::new(),
        body,
    })
}

/// Build the model listing request. Only the bearer header is sent.
pub fn build_list_models_request(config: &ClientConfig, search: &str, limit: u32) -> HttpRequest {
    let mut headers = BTreeMap::new();
    headers.insert(
        HEADER_AUTHORIZATION.to_string(),
        format!("Bearer {}", config.access_token),
    );

    HttpRequest {
        method: Method::Get,
        url: config.hub_url.clone(),
        headers,
        query: vec![
            ("search".to_string(), search.to_string()),
            ("limit".to_string(), limit.to_string()),
        ],
        body: RequestBody::Empty,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
