//! Unit tests for the pending permission registry.

use agent_conduit::models::{PermissionRequest, ToolCallUpdate, ToolKind};
use agent_conduit::session::PermissionRegistry;

fn request(tool_call_id: &str, request_id: &str) -> PermissionRequest {
    PermissionRequest {
        request_id: request_id.to_owned(),
        tool_call: ToolCallUpdate {
            id: tool_call_id.to_owned(),
            title: None,
            kind: ToolKind::Write,
            input: serde_json::Value::Null,
            status: None,
        },
        options: Vec::new(),
    }
}

/// Inserting registers the entry under its tool-call id.
#[tokio::test]
async fn insert_registers_pending_entry() {
    let registry = PermissionRegistry::new();

    assert!(registry.insert(request("tc_1", "perm_1")).await);

    assert!(registry.has_pending("tc_1").await);
    assert_eq!(registry.len().await, 1);
}

/// A second ask for the same tool-call id is refused; the original entry
/// stays pending.
#[tokio::test]
async fn duplicate_insert_is_refused() {
    let registry = PermissionRegistry::new();

    assert!(registry.insert(request("tc_1", "perm_1")).await);
    assert!(
        !registry.insert(request("tc_1", "perm_2")).await,
        "second ask for the same tool call must be refused"
    );

    let entry = registry.take("tc_1").await.expect("entry pending");
    assert_eq!(
        entry.request_id, "perm_1",
        "the original ask must be the one retained"
    );
}

/// Take removes the entry; a second take finds nothing, making resolution
/// first-wins by construction.
#[tokio::test]
async fn take_is_idempotent() {
    let registry = PermissionRegistry::new();
    registry.insert(request("tc_1", "perm_1")).await;

    assert!(registry.take("tc_1").await.is_some());
    assert!(
        registry.take("tc_1").await.is_none(),
        "second take must find no entry"
    );
    assert!(registry.is_empty().await);
}

/// Drain empties the registry and returns every pending entry for the
/// rejection sweep.
#[tokio::test]
async fn drain_returns_all_pending_entries() {
    let registry = PermissionRegistry::new();
    registry.insert(request("tc_1", "perm_1")).await;
    registry.insert(request("tc_2", "perm_2")).await;

    let drained = registry.drain().await;

    assert_eq!(drained.len(), 2);
    assert!(registry.is_empty().await);

    let mut ids: Vec<&str> = drained.iter().map(|r| r.tool_call.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["tc_1", "tc_2"]);
}
