//! Serverless inference client.
//!
//! One async method per task kind. Each call builds its request, runs it
//! through the model-loading retry, and normalizes what comes back.
//! Chat completion can also be streamed, and text generation and chat
//! completion can be scheduled onto a [`TaskPool`].

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use uuid::Uuid;

use super::config::{load_client_config, ClientConfig};
use super::errors::InferenceError;
use super::normalize::{decode_json, normalize_chat, normalize_model_list, normalize_text_generation};
use super::pool::{TaskHandle, TaskPool};
use super::request::{build_list_models_request, build_request};
use super::retry::{self, RetryState};
use super::streaming::parse_sse_stream;
use super::transport::{ByteStream, HttpTransport, Transport};
use super::types::{
    BinaryInput, ChatCompletion, ChatInput, ChatMode, ChatResponse, ChatStream, GeneratedText,
    ModelSummary, RequestOptions, TaskRequest,
};

type Decoder<T> = fn(Bytes) -> Result<T, InferenceError>;

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for the serverless inference API.
///
/// Cheap to clone. Clones share the transport and configuration.
#[derive(Clone)]
pub struct InferenceClient {
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
}

impl InferenceClient {
    /// Create a client that talks HTTP through `reqwest`.
    pub fn from_config(config: ClientConfig) -> Result<Self, InferenceError> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Self {
            transport: Arc::new(transport),
            config: Arc::new(config),
        })
    }

    /// Load the YAML config at `path` and create an HTTP client from it.
    pub fn from_config_file(path: &Path) -> Result<Self, InferenceError> {
        Self::from_config(load_client_config(path)?)
    }

    /// Create a client over a caller-supplied transport.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, InferenceError> {
        config.validate()?;
        Ok(Self {
            transport,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ─── Text tasks ──────────────────────────────────────────────────────

    /// Generate a continuation of `inputs`.
    pub async fn text_generation(
        &self,
        model_id: &str,
        inputs: &str,
        options: RequestOptions,
    ) -> Result<Vec<GeneratedText>, InferenceError> {
        let request = self.prepare(TaskRequest::text_generation(model_id, inputs), options);
        self.call(&request, |body| normalize_text_generation(decode_json(&body)?))
            .await
    }

    pub async fn feature_extraction(
        &self,
        model_id: &str,
        text: &str,
        options: RequestOptions,
    ) -> Result<Value, InferenceError> {
        let request = self.prepare(TaskRequest::feature_extraction(model_id, text), options);
        self.call(&request, decode_value).await
    }

    pub async fn question_answering(
        &self,
        model_id: &str,
        question: &str,
        context: &str,
        options: RequestOptions,
    ) -> Result<Value, InferenceError> {
        let request = self.prepare(
            TaskRequest::question_answering(model_id, question, context),
            options,
        );
        self.call(&request, decode_value).await
    }

    pub async fn summarization(
        &self,
        model_id: &str,
        text: &str,
        options: RequestOptions,
    ) -> Result<Value, InferenceError> {
        let request = self.prepare(TaskRequest::summarization(model_id, text), options);
        self.call(&request, decode_value).await
    }

    /// Generate an image from a prompt. Returns the encoded image bytes.
    pub async fn text_to_image(
        &self,
        model_id: &str,
        prompt: &str,
        options: RequestOptions,
    ) -> Result<Bytes, InferenceError> {
        let request = self.prepare(TaskRequest::text_to_image(model_id, prompt), options);
        self.call(&request, Ok).await
    }

    // ─── Binary tasks ────────────────────────────────────────────────────

    pub async fn automatic_speech_recognition(
        &self,
        model_id: &str,
        audio: BinaryInput,
        options: RequestOptions,
    ) -> Result<Value, InferenceError> {
        let request = self.prepare(
            TaskRequest::automatic_speech_recognition(model_id, audio),
            options,
        );
        self.call(&request, decode_value).await
    }

    pub async fn image_classification(
        &self,
        model_id: &str,
        image: BinaryInput,
        options: RequestOptions,
    ) -> Result<Value, InferenceError> {
        let request = self.prepare(TaskRequest::image_classification(model_id, image), options);
        self.call(&request, decode_value).await
    }

    pub async fn object_detection(
        &self,
        model_id: &str,
        image: BinaryInput,
        options: RequestOptions,
    ) -> Result<Value, InferenceError> {
        let request = self.prepare(TaskRequest::object_detection(model_id, image), options);
        self.call(&request, decode_value).await
    }

    /// Transform an image. Returns the encoded image bytes.
    pub async fn image_to_image(
        &self,
        model_id: &str,
        image: BinaryInput,
        options: RequestOptions,
    ) -> Result<Bytes, InferenceError> {
        let request = self.prepare(TaskRequest::image_to_image(model_id, image), options);
        self.call(&request, Ok).await
    }

    // ─── Chat Completion ─────────────────────────────────────────────────

    /// Send a non-streaming chat completion request.
    ///
    /// Only allow-listed chat options in `options.parameters` are sent.
    pub async fn chat_completion(
        &self,
        model_id: &str,
        input: ChatInput,
        options: RequestOptions,
    ) -> Result<ChatCompletion, InferenceError> {
        let request = self.prepare(
            TaskRequest::chat_completion(model_id, input, ChatMode::Complete),
            options,
        );
        self.call(&request, |body| Ok(normalize_chat(&decode_json(&body)?)))
            .await
    }

    /// Send a streaming chat completion request.
    ///
    /// The model-loading retry applies to opening the stream. Once chunks
    /// flow, the first error ends the stream.
    pub async fn chat_completion_stream(
        &self,
        model_id: &str,
        input: ChatInput,
        options: RequestOptions,
    ) -> Result<ChatStream, InferenceError> {
        let request = self.prepare(
            TaskRequest::chat_completion(model_id, input, ChatMode::Stream),
            options,
        );
        let request_id = Uuid::new_v4();
        let request = &request;

        let body = retry::execute(request.wait_for_model(), move |state| async move {
            self.open_stream(request, state, request_id).await
        })
        .await?;

        Ok(Box::pin(parse_sse_stream(body)))
    }

    /// Chat completion in the given mode.
    pub async fn chat(
        &self,
        model_id: &str,
        input: ChatInput,
        mode: ChatMode,
        options: RequestOptions,
    ) -> Result<ChatResponse, InferenceError> {
        match mode {
            ChatMode::Complete => self
                .chat_completion(model_id, input, options)
                .await
                .map(ChatResponse::Value),
            ChatMode::Stream => self
                .chat_completion_stream(model_id, input, options)
                .await
                .map(ChatResponse::Stream),
        }
    }

    // ─── Model listing ───────────────────────────────────────────────────

    /// Search the hub for models. Not retried on 503.
    pub async fn list_models(
        &self,
        search: &str,
        limit: u32,
    ) -> Result<Vec<ModelSummary>, InferenceError> {
        let http = build_list_models_request(&self.config, search, limit);
        tracing::info!(
            url = %http.url,
            search = %search,
            limit = limit,
            "listing models"
        );

        let result: Result<Vec<ModelSummary>, InferenceError> = async {
            let response = self.transport.send(http).await?;
            if !response.is_success() {
                return Err(InferenceError::HttpError {
                    status: response.status,
                    body: String::from_utf8_lossy(&response.body).into_owned(),
                });
            }
            normalize_model_list(decode_json(&response.body)?)
        }
        .await;

        result.map_err(|e| InferenceError::ModelListFailed {
            status: e.status(),
            source: Box::new(e),
        })
    }

    // ─── Pooled variants ─────────────────────────────────────────────────

    /// Schedule [`text_generation`](Self::text_generation) on `pool`.
    pub fn submit_text_generation(
        &self,
        pool: &TaskPool,
        model_id: impl Into<String>,
        inputs: impl Into<String>,
        options: RequestOptions,
    ) -> TaskHandle<Vec<GeneratedText>> {
        let client = self.clone();
        let model_id = model_id.into();
        let inputs = inputs.into();
        pool.submit(async move { client.text_generation(&model_id, &inputs, options).await })
    }

    /// Schedule [`chat_completion`](Self::chat_completion) on `pool`.
    pub fn submit_chat_completion(
        &self,
        pool: &TaskPool,
        model_id: impl Into<String>,
        input: ChatInput,
        options: RequestOptions,
    ) -> TaskHandle<ChatCompletion> {
        let client = self.clone();
        let model_id = model_id.into();
        pool.submit(async move { client.chat_completion(&model_id, input, options).await })
    }

    // ─── Internals ───────────────────────────────────────────────────────

    /// Apply per-call options over the configured defaults.
    fn prepare(&self, request: TaskRequest, options: RequestOptions) -> TaskRequest {
        request
            .with_parameters(options.parameters)
            .with_use_cache(options.use_cache.unwrap_or(self.config.use_cache))
            .with_wait_for_model(options.wait_for_model.unwrap_or(self.config.wait_for_model))
    }

    /// Run a buffered task call with the model-loading retry.
    ///
    /// Decoding happens inside the retried section so decode failures are
    /// reported the same way as transport failures.
    async fn call<T>(&self, request: &TaskRequest, decode: Decoder<T>) -> Result<T, InferenceError> {
        let request_id = Uuid::new_v4();
        retry::execute(request.wait_for_model(), move |state| async move {
            let body = self.send_once(request, state, request_id).await?;
            decode(body)
        })
        .await
    }

    async fn send_once(
        &self,
        request: &TaskRequest,
        state: RetryState,
        request_id: Uuid,
    ) -> Result<Bytes, InferenceError> {
        let http = build_request(&self.config, request, state)?;
        tracing::info!(
            request_id = %request_id,
            url = %http.url,
            model = %request.model_id(),
            task = %request.kind(),
            attempt = state.attempt,
            wait_for_model = state.wait_for_model,
            "inference request"
        );

        let response = self.transport.send(http).await?;
        tracing::debug!(request_id = %request_id, status = response.status, "inference response");

        if !response.is_success() {
            return Err(InferenceError::HttpError {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }
        Ok(response.body)
    }

    async fn open_stream(
        &self,
        request: &TaskRequest,
        state: RetryState,
        request_id: Uuid,
    ) -> Result<ByteStream, InferenceError> {
        let http = build_request(&self.config, request, state)?;
        tracing::info!(
            request_id = %request_id,
            url = %http.url,
            model = %request.model_id(),
            task = %request.kind(),
            attempt = state.attempt,
            wait_for_model = state.wait_for_model,
            stream = true,
            "inference request"
        );

        let response = self.transport.send_streaming(http).await?;
        if !(200..300).contains(&response.status) {
            let body = collect_body(response.body).await;
            return Err(InferenceError::HttpError {
                status: response.status,
                body,
            });
        }
        Ok(response.body)
    }
}

fn decode_value(body: Bytes) -> Result<Value, InferenceError> {
    decode_json(&body)
}

/// Best-effort read of an error body. Read failures keep what arrived so far.
async fn collect_body(mut body: ByteStream) -> String {
    let mut bytes = Vec::new();
    while let Some(Ok(chunk)) = body.next().await {
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
