//! Domain data types exchanged between the protocol layer and its consumers.

pub mod event;
pub mod permission;
pub mod state;
pub mod tool_call;
pub mod usage;

pub use event::SessionEvent;
pub use permission::{
    PermissionDecision, PermissionOption, PermissionOptionKind, PermissionRequest,
};
pub use state::SessionState;
pub use tool_call::{ToolCallUpdate, ToolKind};
pub use usage::{ModelUsage, UsageInfo, UsageTotals};
