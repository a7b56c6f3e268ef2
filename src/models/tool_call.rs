//! Tool invocation model.

use serde::{Deserialize, Serialize};

/// Classification of a tool invocation by the capability it exercises.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Reads file or resource content.
    Read,
    /// Writes or edits file content.
    Write,
    /// Executes a command or program.
    Execute,
    /// Searches files or external sources.
    Search,
    /// Unclassified or provider-specific capability.
    #[serde(other)]
    Other,
}

/// One tool invocation reported by the agent process.
///
/// Produced by the reader from `tool_call_update` frames and embedded in
/// permission control requests; the id is unique within one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ToolCallUpdate {
    /// Tool-call identifier, unique within the session.
    pub id: String,
    /// Human-readable title for display.
    #[serde(default)]
    pub title: Option<String>,
    /// Capability classification.
    #[serde(default = "default_kind")]
    pub kind: ToolKind,
    /// Raw structured input parameters, preserved verbatim.
    #[serde(default)]
    pub input: serde_json::Value,
    /// Provider-reported status (`pending`, `in_progress`, `completed`, …).
    #[serde(default)]
    pub status: Option<String>,
}

fn default_kind() -> ToolKind {
    ToolKind::Other
}
