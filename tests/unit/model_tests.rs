//! Unit tests for domain model types.

use serde_json::json;

use agent_conduit::models::{
    PermissionOption, PermissionOptionKind, PermissionRequest, SessionEvent, SessionState,
    ToolCallUpdate, ToolKind, UsageTotals,
};

fn tool_call(id: &str) -> ToolCallUpdate {
    ToolCallUpdate {
        id: id.to_owned(),
        title: Some("run tests".to_owned()),
        kind: ToolKind::Execute,
        input: json!({"command": "just test"}),
        status: None,
    }
}

// ── Permission model ─────────────────────────────────────────────────────────

/// `has_option` matches only offered option ids.
#[test]
fn has_option_matches_offered_ids_only() {
    let request = PermissionRequest {
        request_id: "perm_1".to_owned(),
        tool_call: tool_call("tc_1"),
        options: vec![PermissionOption {
            id: "opt_allow".to_owned(),
            name: "Allow once".to_owned(),
            kind: PermissionOptionKind::AllowOnce,
        }],
    };

    assert!(request.has_option("opt_allow"));
    assert!(!request.has_option("opt_deny"));
    assert!(!request.has_option(""));
}

/// Option kinds use snake_case on the wire.
#[test]
fn option_kinds_serialise_snake_case() {
    let kinds = [
        (PermissionOptionKind::AllowOnce, "\"allow_once\""),
        (PermissionOptionKind::AllowAlways, "\"allow_always\""),
        (PermissionOptionKind::RejectOnce, "\"reject_once\""),
        (PermissionOptionKind::RejectAlways, "\"reject_always\""),
    ];

    for (kind, expected) in kinds {
        let serialised = serde_json::to_string(&kind).expect("serialise");
        assert_eq!(serialised, expected);
    }
}

// ── Tool-call model ──────────────────────────────────────────────────────────

/// Tool input is preserved verbatim through deserialisation, including
/// nested structure.
#[test]
fn tool_input_is_preserved_verbatim() {
    let raw = json!({
        "id": "tc_5",
        "kind": "search",
        "input": {"query": "fn main", "globs": ["src/**/*.rs"], "limit": 10},
    });

    let call: ToolCallUpdate = serde_json::from_value(raw).expect("deserialise");

    assert_eq!(call.kind, ToolKind::Search);
    assert_eq!(call.input["globs"][0], "src/**/*.rs");
    assert_eq!(call.input["limit"], 10);
}

// ── Event model ──────────────────────────────────────────────────────────────

/// `seq` is extracted uniformly from every event variant.
#[test]
fn event_seq_accessor_covers_every_variant() {
    let events = [
        SessionEvent::TextOutput {
            seq: 0,
            text: "hi".to_owned(),
            model: None,
        },
        SessionEvent::ToolUse {
            seq: 1,
            tool_call: tool_call("tc_1"),
            permission_pending: false,
        },
        SessionEvent::PermissionNeeded {
            seq: 2,
            request: PermissionRequest {
                request_id: "perm_1".to_owned(),
                tool_call: tool_call("tc_1"),
                options: Vec::new(),
            },
        },
        SessionEvent::UsageChanged {
            seq: 3,
            totals: UsageTotals::default(),
        },
        SessionEvent::LifecycleChanged {
            seq: 4,
            state: SessionState::Running,
            reason: None,
        },
        SessionEvent::Error {
            seq: 5,
            message: "boom".to_owned(),
        },
        SessionEvent::Unrecognized {
            seq: 6,
            raw: "???".to_owned(),
        },
    ];

    for (expected, event) in events.iter().enumerate() {
        assert_eq!(event.seq(), u64::try_from(expected).expect("fits"));
    }
}

/// Session states serialise as snake_case, matching the wire markers.
#[test]
fn session_state_serialises_snake_case() {
    let serialised = serde_json::to_string(&SessionState::Terminating).expect("serialise");
    assert_eq!(serialised, "\"terminating\"");
}
