//! Model backend implementations for KubeSage.
//!
//! Every backend implements `kubesage_core::ChatBackend`. The agent's
//! factory decides which one a model identifier maps to.

mod http;

pub mod anthropic;
pub mod gemini;
pub mod openai_compat;

pub use anthropic::AnthropicBackend;
pub use gemini::GeminiBackend;
pub use openai_compat::{LLAMA_STACK_DEFAULT_URL, OpenAiCompatBackend};
