use std::sync::Arc;
use std::time::Duration;

use mcphub_core::ErrorKind;
use mcphub_script::{execute, ExecutionContext};
use mcphub_test_support::MockUpstream;
use serde_json::json;

fn caller(mock: MockUpstream) -> Arc<dyn mcphub_core::ToolCaller> {
    Arc::new(mock)
}

#[tokio::test]
async fn chains_two_tool_calls_through_a_script() {
    let mock = MockUpstream::new()
        .with_response("search", "find", json!({"content": [{"type": "text", "text": "{\"id\": 42}"}]}))
        .with_response("tickets", "create", json!({"content": [{"type": "text", "text": "{\"ok\": true}"}]}));

    let code = r#"
        let found = mcp.callTool("search__find", #{query: "widgets"});
        let created = mcp.callTool("tickets__create", #{issueId: found.id});
        created
    "#;

    let ctx = ExecutionContext::new(caller(mock));
    let result = execute(code.to_string(), ctx).await;
    match result.error {
        Some(e) => panic!("unexpected error: {e}"),
        None => assert_eq!(result.value, json!({"ok": true})),
    }
}

#[tokio::test]
async fn script_deadline_is_enforced() {
    let ctx = ExecutionContext {
        deadline: Duration::from_millis(50),
        ..ExecutionContext::new(caller(MockUpstream::new()))
    };

    let result = execute("while (true) { let x = 1 + 1; }".to_string(), ctx).await;
    match result.error {
        Some(e) => assert_eq!(e.kind(), ErrorKind::ScriptTimeout),
        None => panic!("expected a timeout error"),
    }
}

#[tokio::test]
async fn upstream_error_surfaces_as_script_runtime_error() {
    let mock = MockUpstream::new().with_error("search", "find", mcphub_core::HubError::not_found("no such tool"));
    let ctx = ExecutionContext::new(caller(mock));
    let result = execute("mcp.callTool(\"search__find\")".to_string(), ctx).await;
    match result.error {
        Some(e) => assert_eq!(e.kind(), ErrorKind::ScriptRuntime),
        None => panic!("expected the script to fail"),
    }
}
