//! Shared types for the inference client.
//!
//! Request-side types describe one task call before it is turned into an
//! HTTP request. Response-side types are the normalised shapes handed back
//! to callers.

use std::fmt;
use std::path::Path;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use super::errors::InferenceError;

/// Open option mapping sent as the `parameters` object of a task payload.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

// ─── Task Kinds ──────────────────────────────────────────────────────────────

/// The fixed set of operations the inference API exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    TextGeneration,
    ChatCompletion,
    AutomaticSpeechRecognition,
    FeatureExtraction,
    ImageClassification,
    ImageToImage,
    ObjectDetection,
    QuestionAnswering,
    Summarization,
    TextToImage,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::TextGeneration => "text-generation",
            TaskKind::ChatCompletion => "chat-completion",
            TaskKind::AutomaticSpeechRecognition => "automatic-speech-recognition",
            TaskKind::FeatureExtraction => "feature-extraction",
            TaskKind::ImageClassification => "image-classification",
            TaskKind::ImageToImage => "image-to-image",
            TaskKind::ObjectDetection => "object-detection",
            TaskKind::QuestionAnswering => "question-answering",
            TaskKind::Summarization => "summarization",
            TaskKind::TextToImage => "text-to-image",
        }
    }

    /// Multipart field name of the binary upload, for binary-payload kinds.
    pub fn binary_part_name(self) -> Option<&'static str> {
        match self {
            TaskKind::AutomaticSpeechRecognition => Some("audio"),
            TaskKind::ImageClassification | TaskKind::ImageToImage | TaskKind::ObjectDetection => {
                Some("image")
            }
            _ => None,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Chat Types ──────────────────────────────────────────────────────────────

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

/// A single message in the conversation.
///
/// The conversation is owned by the caller and extended between turns; the
/// client only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,
}

impl ChatMessage {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            name: None,
            tool_calls: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// A function-result message, appended after the model asked for a call.
    pub fn function(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::with_role(Role::Function, content)
        }
    }
}

/// Tool definition sent in the request. Passed through unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function definition within a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Caller-supplied chat options that are forwarded to the remote service.
///
/// Anything not listed here is dropped from the chat payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatParameter {
    MaxTokens,
    Temperature,
    TopP,
    FrequencyPenalty,
    PresencePenalty,
    Stop,
    Stream,
    Logprobs,
    Tools,
    ToolChoice,
    ToolPrompt,
    ResponseFormat,
}

impl ChatParameter {
    pub const ALL: [ChatParameter; 12] = [
        ChatParameter::MaxTokens,
        ChatParameter::Temperature,
        ChatParameter::TopP,
        ChatParameter::FrequencyPenalty,
        ChatParameter::PresencePenalty,
        ChatParameter::Stop,
        ChatParameter::Stream,
        ChatParameter::Logprobs,
        ChatParameter::Tools,
        ChatParameter::ToolChoice,
        ChatParameter::ToolPrompt,
        ChatParameter::ResponseFormat,
    ];

    /// Wire name of the option.
    pub fn as_str(self) -> &'static str {
        match self {
            ChatParameter::MaxTokens => "max_tokens",
            ChatParameter::Temperature => "temperature",
            ChatParameter::TopP => "top_p",
            ChatParameter::FrequencyPenalty => "frequency_penalty",
            ChatParameter::PresencePenalty => "presence_penalty",
            ChatParameter::Stop => "stop",
            ChatParameter::Stream => "stream",
            ChatParameter::Logprobs => "logprobs",
            ChatParameter::Tools => "tools",
            ChatParameter::ToolChoice => "tool_choice",
            ChatParameter::ToolPrompt => "tool_prompt",
            ChatParameter::ResponseFormat => "response_format",
        }
    }

    /// The allow-listed option with this wire name, if any.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

/// Whether a chat call returns one value or a stream of chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatMode {
    #[default]
    Complete,
    Stream,
}

/// The conversation plus the dedicated tool arguments of a chat call.
///
/// `tools`, `tool_choice` and `tool_prompt` set here win over the same keys
/// inside the parameter mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatInput {
    pub messages: Vec<ChatMessage>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: Option<String>,
    pub tool_prompt: Option<String>,
}

impl ChatInput {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: impl Into<String>) -> Self {
        self.tool_choice = Some(tool_choice.into());
        self
    }

    pub fn with_tool_prompt(mut self, tool_prompt: impl Into<String>) -> Self {
        self.tool_prompt = Some(tool_prompt.into());
        self
    }
}

// ─── Task Requests ───────────────────────────────────────────────────────────

/// A binary upload (audio clip or image) for multipart task kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryInput {
    pub file_name: String,
    pub data: Bytes,
}

impl BinaryInput {
    pub fn from_bytes(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }

    /// Read the upload from disk.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| InferenceError::InvalidInput {
                reason: format!("failed to read {}: {e}", path.display()),
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::from_bytes(file_name, data))
    }
}

/// Kind-specific inputs of a task call.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskInput {
    Text(String),
    QuestionAnswering { question: String, context: String },
    Chat { input: ChatInput, mode: ChatMode },
    Binary(BinaryInput),
}

/// One fully described task call. Immutable once built; the retry
/// coordinator carries the per-attempt `wait_for_model` flag separately.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    kind: TaskKind,
    model_id: String,
    input: TaskInput,
    parameters: Parameters,
    use_cache: bool,
    wait_for_model: bool,
}

impl TaskRequest {
    fn new(kind: TaskKind, model_id: impl Into<String>, input: TaskInput) -> Self {
        Self {
            kind,
            model_id: model_id.into(),
            input,
            parameters: Parameters::new(),
            use_cache: true,
            wait_for_model: false,
        }
    }

    pub fn text_generation(model_id: impl Into<String>, inputs: impl Into<String>) -> Self {
        Self::new(TaskKind::TextGeneration, model_id, TaskInput::Text(inputs.into()))
    }

    pub fn chat_completion(model_id: impl Into<String>, input: ChatInput, mode: ChatMode) -> Self {
        Self::new(TaskKind::ChatCompletion, model_id, TaskInput::Chat { input, mode })
    }

    pub fn automatic_speech_recognition(model_id: impl Into<String>, audio: BinaryInput) -> Self {
        Self::new(
            TaskKind::AutomaticSpeechRecognition,
            model_id,
            TaskInput::Binary(audio),
        )
    }

    pub fn feature_extraction(model_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(TaskKind::FeatureExtraction, model_id, TaskInput::Text(text.into()))
    }

    pub fn image_classification(model_id: impl Into<String>, image: BinaryInput) -> Self {
        Self::new(TaskKind::ImageClassification, model_id, TaskInput::Binary(image))
    }

    pub fn image_to_image(model_id: impl Into<String>, image: BinaryInput) -> Self {
        Self::new(TaskKind::ImageToImage, model_id, TaskInput::Binary(image))
    }

    pub fn object_detection(model_id: impl Into<String>, image: BinaryInput) -> Self {
        Self::new(TaskKind::ObjectDetection, model_id, TaskInput::Binary(image))
    }

    pub fn question_answering(
        model_id: impl Into<String>,
        question: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::new(
            TaskKind::QuestionAnswering,
            model_id,
            TaskInput::QuestionAnswering {
                question: question.into(),
                context: context.into(),
            },
        )
    }

    pub fn summarization(model_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(TaskKind::Summarization, model_id, TaskInput::Text(text.into()))
    }

    pub fn text_to_image(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(TaskKind::TextToImage, model_id, TaskInput::Text(prompt.into()))
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_wait_for_model(mut self, wait_for_model: bool) -> Self {
        self.wait_for_model = wait_for_model;
        self
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn input(&self) -> &TaskInput {
        &self.input
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn wait_for_model(&self) -> bool {
        self.wait_for_model
    }
}

/// Per-call knobs accepted by the [`InferenceClient`](super::InferenceClient)
/// task methods. `None` falls back to the client configuration.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub parameters: Parameters,
    pub use_cache: Option<bool>,
    pub wait_for_model: Option<bool>,
}

impl RequestOptions {
    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = Some(use_cache);
        self
    }

    pub fn with_wait_for_model(mut self, wait_for_model: bool) -> Self {
        self.wait_for_model = Some(wait_for_model);
        self
    }
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// Normalised chat completion. Every field has a safe default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    /// Unix timestamp; the local clock when the service omits it.
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<serde_json::Value>,
}

impl ChatCompletion {
    /// Content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// A single choice within a chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u64,
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

/// The message of a choice. `tool_calls` is present only when the service sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,
}

/// One streamed chat chunk; one per SSE frame, same shape as a full completion.
pub type StreamChunk = ChatCompletion;

/// Forward-only sequence of streamed chunks. Ends early on the first error.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, InferenceError>> + Send>>;

/// Result of [`InferenceClient::chat`](super::InferenceClient::chat), chosen by [`ChatMode`].
pub enum ChatResponse {
    Value(ChatCompletion),
    Stream(ChatStream),
}

impl fmt::Debug for ChatResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatResponse::Value(completion) => f.debug_tuple("Value").field(completion).finish(),
            ChatResponse::Stream(_) => f.debug_tuple("Stream").finish_non_exhaustive(),
        }
    }
}

/// One text-generation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedText {
    pub generated_text: String,
}

/// One entry of the hub model listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub id: String,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
