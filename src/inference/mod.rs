//! Serverless inference: request building, model-loading retry, response
//! normalization, SSE streaming and pooled execution.
//!
//! The [`InferenceClient`] is the entry point. Everything below it is usable on
//! its own: the request builder and normalizer are pure, the retry coordinator
//! takes any attempt closure, and the [`Transport`] trait is the only place
//! network I/O happens.

pub mod client;
pub mod config;
pub mod errors;
pub mod normalize;
pub mod pool;
pub mod request;
pub mod retry;
pub mod streaming;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use client::InferenceClient;
pub use config::{find_config_path, load_client_config, ClientConfig};
pub use errors::InferenceError;
pub use pool::{TaskHandle, TaskPool};
pub use transport::{HttpTransport, Transport, TransportError};
pub use types::{
    BinaryInput, ChatCompletion, ChatInput, ChatMessage, ChatMode, ChatParameter, ChatResponse,
    ChatStream, GeneratedText, ModelSummary, Parameters, RequestOptions, Role, StreamChunk,
    TaskKind, TaskRequest, ToolDefinition,
};
