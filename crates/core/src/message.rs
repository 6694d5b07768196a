//! Conversation turns and the per-request transcript.
//!
//! The transcript is the literal history replayed to a model backend on
//! every iteration: `[system, user(question), assistant(tool_calls), tool_result, ...]`.
//! Order matters, and every `ToolResult` must answer a tool call emitted
//! earlier in the same transcript.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use crate::tool::{ToolCallRequest, ToolCallResult};

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution result
    Tool,
}

/// One entry of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    ToolResult {
        request_id: String,
        /// Name of the tool that produced this result. Gemini correlates
        /// function responses by name rather than id.
        name: String,
        text: String,
    },
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// An assistant turn requesting tool calls, with optional accompanying text.
    pub fn assistant(text: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self::Assistant {
            text: text.filter(|t| !t.is_empty()),
            tool_calls,
        }
    }

    pub fn tool_result(
        request_id: impl Into<String>,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::ToolResult {
            request_id: request_id.into(),
            name: name.into(),
            text: text.into(),
        }
    }

    /// The turn recording `result`, produced by tool `name`.
    pub fn from_result(name: impl Into<String>, result: ToolCallResult) -> Self {
        Self::ToolResult {
            request_id: result.request_id,
            name: name.into(),
            text: result.text,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::ToolResult { .. } => Role::Tool,
        }
    }
}

/// Leading turns that survive every trim: the system prompt and the question.
const PINNED: usize = 2;

/// The smallest cap [`Transcript::trim_to`] can honor: the pinned turns plus
/// one call and its result. Smaller caps behave as this value.
pub const MIN_HISTORY_CAP: usize = PINNED + 2;

/// The ordered turn history for one chat request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Seed a transcript with `[system, user(question)]`.
    pub fn new(system_prompt: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt), Turn::user(question)],
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The system prompt at index 0, if the transcript has one.
    pub fn system_prompt(&self) -> Option<&str> {
        match self.turns.first() {
            Some(Turn::System { content }) => Some(content),
            _ => None,
        }
    }

    /// Bound the transcript to at most `cap` turns.
    ///
    /// Index 0 (system) and index 1 (the question) are always kept. The
    /// remainder is kept as whole exchange groups (an assistant turn plus
    /// the tool results answering it), newest first, so no tool result is
    /// ever separated from the call it answers. When the newest group alone
    /// is larger than the remaining budget, its oldest calls are dropped
    /// together with their results.
    ///
    /// Returns the number of turns removed.
    pub fn trim_to(&mut self, cap: usize) -> usize {
        let before = self.turns.len();
        if before <= cap {
            return 0;
        }

        let pinned = PINNED.min(before);
        let budget = cap.max(MIN_HISTORY_CAP) - pinned;

        let tail = self.turns.split_off(pinned);
        let mut groups: Vec<Vec<Turn>> = Vec::new();
        for turn in tail {
            if matches!(turn, Turn::ToolResult { .. }) {
                // A result with no preceding call cannot be replayed.
                if let Some(group) = groups.last_mut() {
                    group.push(turn);
                }
            } else {
                groups.push(vec![turn]);
            }
        }

        let mut kept: Vec<Vec<Turn>> = Vec::new();
        let mut remaining = budget;
        while let Some(group) = groups.pop() {
            if group.len() <= remaining {
                remaining -= group.len();
                kept.push(group);
            } else {
                if kept.is_empty() {
                    kept.push(shrink_group(group, remaining));
                }
                break;
            }
        }

        for group in kept.into_iter().rev() {
            self.turns.extend(group);
        }
        before - self.turns.len()
    }

    /// Request ids of tool results that do not answer an earlier tool call.
    pub fn dangling_results(&self) -> Vec<&str> {
        let mut issued: HashSet<&str> = HashSet::new();
        let mut dangling = Vec::new();
        for turn in &self.turns {
            match turn {
                Turn::Assistant { tool_calls, .. } => {
                    issued.extend(tool_calls.iter().map(|c| c.id.as_str()));
                }
                Turn::ToolResult { request_id, .. } if !issued.contains(request_id.as_str()) => {
                    dangling.push(request_id.as_str());
                }
                _ => {}
            }
        }
        dangling
    }
}

/// Cut an oversized `[assistant, result...]` group down to `budget` turns,
/// keeping the newest results and only the calls they answer.
fn shrink_group(mut group: Vec<Turn>, budget: usize) -> Vec<Turn> {
    let keep_results = budget.saturating_sub(1);
    let results = group.split_off(1);
    let skip = results.len().saturating_sub(keep_results);
    let results: Vec<Turn> = results.into_iter().skip(skip).collect();

    let answered: HashSet<String> = results
        .iter()
        .filter_map(|t| match t {
            Turn::ToolResult { request_id, .. } => Some(request_id.clone()),
            _ => None,
        })
        .collect();

    if let Some(Turn::Assistant { tool_calls, .. }) = group.first_mut() {
        tool_calls.retain(|c| answered.contains(&c.id));
    }
    group.extend(results);
    group
}
