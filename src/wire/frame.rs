//! Frame model for the NDJSON wire protocol.
//!
//! One decoded line is one [`Frame`]. Inbound lines are parsed by matching
//! the envelope's `type` string; unknown types and malformed JSON degrade to
//! [`Frame::Unknown`] and [`Frame::Malformed`] so a single corrupt line never
//! terminates the stream.
//!
//! # Known inbound types
//!
//! | `type`             | Maps to                      |
//! |--------------------|------------------------------|
//! | `assistant_text`   | [`Frame::AssistantText`]     |
//! | `tool_call_update` | [`Frame::ToolCallUpdate`]    |
//! | `control_request`  | [`Frame::ControlRequest`]    |
//! | `control_response` | [`Frame::ControlResponse`]   |
//! | `lifecycle`        | [`Frame::Lifecycle`]         |
//! | `usage`            | [`Frame::Usage`]             |
//! | `error`            | [`Frame::Error`]             |
//! | *(any other)*      | [`Frame::Unknown`]           |

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::models::permission::PermissionDecision;
use crate::models::tool_call::ToolCallUpdate;
use crate::models::usage::UsageInfo;
use crate::models::PermissionRequest;

// ── Inbound frame model ───────────────────────────────────────────────────────

/// One decoded unit of inbound protocol traffic. Immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Assistant text output.
    AssistantText {
        /// Text content.
        text: String,
        /// Producing model, if reported.
        model: Option<String>,
    },
    /// Tool invocation report or status update.
    ToolCallUpdate(ToolCallUpdate),
    /// Control request from the process that expects a correlated response.
    ControlRequest(ControlRequest),
    /// Reply to a control request this side originated.
    ControlResponse {
        /// Correlation id originally assigned by this side.
        request_id: String,
        /// Opaque response payload.
        response: Value,
    },
    /// Lifecycle marker. The marker set is extensible; unknown markers are
    /// surfaced to consumers rather than failing decode.
    Lifecycle {
        /// Marker name (`session_started`, `session_ended`,
        /// `context_compacted`, …).
        marker: String,
        /// Session identifier, present on `session_started`.
        session_id: Option<String>,
    },
    /// Token usage report.
    Usage {
        /// Model name the report applies to.
        model: String,
        /// Reported counts and cost.
        usage: UsageInfo,
    },
    /// Error reported by the agent process.
    Error {
        /// Error description.
        message: String,
    },
    /// Syntactically valid JSON with an unrecognised `type`.
    Unknown {
        /// Raw line content, preserved verbatim.
        raw: String,
    },
    /// Line that is not valid JSON. The session continues.
    Malformed {
        /// Raw line content, preserved verbatim.
        raw: String,
    },
}

/// Payload of an inbound `control_request` frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    /// Permission ask gating one tool call.
    Permission(PermissionRequest),
    /// Recognised envelope with an unrecognised `subtype`.
    Unknown {
        /// Wire correlation id.
        request_id: String,
        /// Raw request payload.
        raw: Value,
    },
}

// ── Envelope types ────────────────────────────────────────────────────────────

/// Top-level wire envelope (process → session).
#[derive(Debug, Deserialize)]
struct Envelope {
    /// Frame type discriminator.
    #[serde(rename = "type")]
    frame_type: String,
    /// Remaining fields, parsed per frame type.
    #[serde(flatten)]
    rest: Value,
}

#[derive(Debug, Deserialize)]
struct AssistantTextBody {
    text: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolCallBody {
    tool_call: ToolCallUpdate,
}

#[derive(Debug, Deserialize)]
struct ControlRequestBody {
    request_id: String,
    request: Value,
}

#[derive(Debug, Deserialize)]
struct ControlResponseBody {
    request_id: String,
    #[serde(default)]
    response: Value,
}

#[derive(Debug, Deserialize)]
struct LifecycleBody {
    marker: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageBody {
    model: String,
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse one NDJSON line into a [`Frame`].
///
/// Returns `None` only for blank lines. Malformed JSON yields
/// [`Frame::Malformed`]; a valid object with an unknown `type`, or a known
/// type with a structurally invalid body, yields [`Frame::Unknown`] — decode
/// problems are isolated to the single line.
#[must_use]
pub fn parse_line(session_id: &str, line: &str) -> Option<Frame> {
    if line.trim().is_empty() {
        return None;
    }

    let envelope: Envelope = match serde_json::from_str(line) {
        Ok(env) => env,
        Err(err) => {
            debug!(session_id, error = %err, "wire: malformed inbound line");
            return Some(Frame::Malformed {
                raw: line.to_owned(),
            });
        }
    };

    let frame = match envelope.frame_type.as_str() {
        "assistant_text" => from_body(envelope.rest, line, |b: AssistantTextBody| {
            Frame::AssistantText {
                text: b.text,
                model: b.model,
            }
        }),
        "tool_call_update" => from_body(envelope.rest, line, |b: ToolCallBody| {
            Frame::ToolCallUpdate(b.tool_call)
        }),
        "control_request" => parse_control_request(envelope.rest, line),
        "control_response" => from_body(envelope.rest, line, |b: ControlResponseBody| {
            Frame::ControlResponse {
                request_id: b.request_id,
                response: b.response,
            }
        }),
        "lifecycle" => from_body(envelope.rest, line, |b: LifecycleBody| Frame::Lifecycle {
            marker: b.marker,
            session_id: b.session_id,
        }),
        "usage" => from_body(envelope.rest, line, |b: UsageBody| Frame::Usage {
            model: b.model,
            usage: b.usage,
        }),
        "error" => from_body(envelope.rest, line, |b: ErrorBody| Frame::Error {
            message: b.message,
        }),
        other => {
            debug!(
                session_id,
                frame_type = other,
                "wire: unknown inbound frame type"
            );
            Frame::Unknown {
                raw: line.to_owned(),
            }
        }
    };

    Some(frame)
}

/// Deserialize a frame body, falling back to [`Frame::Unknown`] when a known
/// type carries a structurally invalid payload.
fn from_body<B, F>(rest: Value, line: &str, build: F) -> Frame
where
    B: for<'de> Deserialize<'de>,
    F: FnOnce(B) -> Frame,
{
    match serde_json::from_value::<B>(rest) {
        Ok(body) => build(body),
        Err(err) => {
            debug!(error = %err, "wire: invalid body for known frame type");
            Frame::Unknown {
                raw: line.to_owned(),
            }
        }
    }
}

/// Parse a `control_request` body, classifying by `request.subtype`.
fn parse_control_request(rest: Value, line: &str) -> Frame {
    let body: ControlRequestBody = match serde_json::from_value(rest) {
        Ok(body) => body,
        Err(err) => {
            debug!(error = %err, "wire: invalid control_request envelope");
            return Frame::Unknown {
                raw: line.to_owned(),
            };
        }
    };

    let subtype = body
        .request
        .get("subtype")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    if subtype == "permission" {
        #[derive(Debug, Deserialize)]
        struct PermissionAsk {
            tool_call: ToolCallUpdate,
            #[serde(default)]
            options: Vec<crate::models::PermissionOption>,
        }

        match serde_json::from_value::<PermissionAsk>(body.request.clone()) {
            Ok(ask) => {
                return Frame::ControlRequest(ControlRequest::Permission(PermissionRequest {
                    request_id: body.request_id,
                    tool_call: ask.tool_call,
                    options: ask.options,
                }));
            }
            Err(err) => {
                debug!(error = %err, "wire: invalid permission control_request body");
            }
        }
    }

    Frame::ControlRequest(ControlRequest::Unknown {
        request_id: body.request_id,
        raw: body.request,
    })
}

// ── Outbound frame builders ───────────────────────────────────────────────────

/// Build a `user_message` frame.
#[must_use]
pub fn user_message(text: &str) -> Value {
    json!({
        "type": "user_message",
        "text": text,
    })
}

/// Build a `control_response` frame answering a permission ask.
///
/// A selected option reports `allow` or `deny` according to the kind the
/// request offered it under, echoing the chosen `option_id` either way; an
/// option the request never offered maps to `deny`. A cancelled prompt
/// reports `cancel` with no option.
#[must_use]
pub fn permission_response(request: &PermissionRequest, decision: &PermissionDecision) -> Value {
    let response = match decision {
        PermissionDecision::Selected(option_id) => {
            let behavior = match request.option_kind(option_id) {
                Some(kind) if kind.is_allow() => "allow",
                _ => "deny",
            };
            json!({
                "behavior": behavior,
                "option_id": option_id,
            })
        }
        PermissionDecision::Cancelled => json!({
            "behavior": "cancel",
        }),
    };

    json!({
        "type": "control_response",
        "request_id": request.request_id,
        "response": response,
    })
}

/// Build a `control_response` frame formally rejecting a permission ask.
///
/// Used when the session is cancelled or terminated while the prompt is
/// outstanding — the agent process must never be left waiting.
#[must_use]
pub fn permission_rejection(request_id: &str) -> Value {
    json!({
        "type": "control_response",
        "request_id": request_id,
        "response": { "behavior": "deny" },
    })
}

/// Build an outbound `control_request` frame with subtype `interrupt`.
#[must_use]
pub fn interrupt_request(request_id: &str) -> Value {
    json!({
        "type": "control_request",
        "request_id": request_id,
        "request": { "subtype": "interrupt" },
    })
}

/// Build a `terminate` frame.
#[must_use]
pub fn terminate_request() -> Value {
    json!({ "type": "terminate" })
}
