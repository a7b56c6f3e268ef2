//! Permission prompt model.
//!
//! A `control_request` frame with subtype `permission` asks the operator to
//! gate one tool call. The request carries an ordered list of mutually
//! exclusive options; an empty list is legal and degrades to cancel-only.

use serde::{Deserialize, Serialize};

use crate::models::tool_call::ToolCallUpdate;

/// Outcome class of a permission option.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    /// Allow this one invocation.
    AllowOnce,
    /// Allow this and all future invocations of the tool.
    AllowAlways,
    /// Reject this one invocation.
    RejectOnce,
    /// Reject this and all future invocations of the tool.
    RejectAlways,
}

impl PermissionOptionKind {
    /// Whether this option grants the gated tool call.
    #[must_use]
    pub fn is_allow(self) -> bool {
        matches!(self, Self::AllowOnce | Self::AllowAlways)
    }
}

/// One selectable outcome offered for a pending tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PermissionOption {
    /// Option identifier echoed back in the response.
    pub id: String,
    /// Display name for the operator.
    pub name: String,
    /// Outcome class.
    pub kind: PermissionOptionKind,
}

/// A pending permission ask decoded from the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct PermissionRequest {
    /// Wire correlation id; the response must echo it.
    pub request_id: String,
    /// The tool call this request gates.
    pub tool_call: ToolCallUpdate,
    /// Ordered, mutually exclusive options. May be empty.
    #[serde(default)]
    pub options: Vec<PermissionOption>,
}

impl PermissionRequest {
    /// Whether `option_id` names one of the offered options.
    #[must_use]
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|opt| opt.id == option_id)
    }

    /// Kind of the offered option named `option_id`, if any.
    #[must_use]
    pub fn option_kind(&self, option_id: &str) -> Option<PermissionOptionKind> {
        self.options
            .iter()
            .find(|opt| opt.id == option_id)
            .map(|opt| opt.kind)
    }
}

/// Operator decision for a pending permission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    /// One of the offered options was chosen.
    Selected(String),
    /// The prompt was dismissed; sent to the agent as a formal cancellation.
    Cancelled,
}
