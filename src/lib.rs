//! Client for the Hugging Face serverless inference API.
//!
//! The [`inference`] module holds everything needed to call a hosted model:
//! request building, the model-loading retry, response normalization, the SSE
//! parser for streamed chat, and a small task pool for fire-and-forget calls.
//!
//! ```no_run
//! use hf_serverless::{ChatInput, ChatMessage, ClientConfig, InferenceClient, RequestOptions};
//!
//! # async fn run() -> Result<(), hf_serverless::InferenceError> {
//! let client = InferenceClient::from_config(ClientConfig::new("hf_xxx"))?;
//! let chat = client
//!     .chat_completion(
//!         "meta-llama/Llama-3.1-8B-Instruct",
//!         ChatInput::new(vec![ChatMessage::user("Hello")]),
//!         RequestOptions::default(),
//!     )
//!     .await?;
//! println!("{}", chat.first_content().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod inference;
pub mod logging;

pub use inference::{
    BinaryInput, ChatCompletion, ChatInput, ChatMessage, ChatMode, ChatResponse, ChatStream,
    ClientConfig, InferenceClient, InferenceError, RequestOptions, TaskHandle, TaskPool,
};
pub use logging::{init_tracing, LogFormat};
