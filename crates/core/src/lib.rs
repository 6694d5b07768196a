//! # KubeSage Core
//!
//! Domain types, traits, and error definitions for the KubeSage
//! observability assistant. This crate has **no HTTP dependencies**: it
//! defines the model that the backend, tool, and agent crates implement
//! against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the orchestration loop is a trait here:
//! - [`ChatBackend`] for model backends
//! - [`ToolExecutor`] for the tool catalog (in-process or remote)
//! - [`ProgressSink`] for best-effort status reporting
//!
//! Implementations live in their own crates, and tests swap in stubs.

pub mod error;
pub mod message;
pub mod progress;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Role, Transcript, Turn};
pub use progress::{FnProgress, ProgressEntry, ProgressLog, ProgressSink, Tee};
pub use provider::{ChatBackend, ModelReply, ProviderRequest, ToolDeclarations};
pub use tool::{Tool, ToolCallRequest, ToolCallResult, ToolExecutor, ToolHandler, ToolRegistry};
