//! Chat orchestration for KubeSage.
//!
//! A [`Bot`] answers one question at a time:
//!
//! 1. **Build** the system prompt (shared base plus a per-variant addendum)
//! 2. **Send** the transcript and tool catalog to the backend
//! 3. **If tool calls**: normalize correlation queries, execute each call,
//!    truncate the result, append it, and loop back to step 2
//! 4. **If text**: strip wrapping code fences and return it
//!
//! The loop stops at the variant's iteration cap. Models without reliable
//! tool calling are routed by [`factory::classify`] to the keyword-matching
//! [`deterministic`] responder instead.

pub mod bot;
pub mod deterministic;
pub mod factory;
pub mod loop_runner;
pub mod normalize;
pub mod prompt;
pub mod truncate;
pub mod variant;

#[cfg(test)]
mod test_helpers;

pub use bot::{Bot, BotSettings, ChatReport};
pub use factory::{classify, create_bot};
pub use loop_runner::{INCOMPLETE_ANALYSIS, ToolCallingLoop, strip_code_fence};
pub use normalize::normalize_query;
pub use prompt::build_system_prompt;
pub use truncate::{TRUNCATION_MARKER, truncate_result};
pub use variant::BotVariant;
