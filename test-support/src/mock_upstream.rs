//! In-process stand-in for a connected upstream session (§9: the script
//! runtime and the built-in tools are written against the `ToolCaller`
//! trait precisely so tests don't need a real child process or HTTP
//! server). Grounded on the teacher's own pattern of test-support crates
//! that implement the production trait with canned, inspectable behavior
//! rather than spinning up a real transport.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use mcphub_core::error::{ErrorKind, HubError};
use mcphub_core::ToolCaller;
use serde_json::Value;

pub type Response = Result<Value, HubError>;

/// One recorded invocation, for assertions like "the script called
/// `github__search_repos` exactly once with these params".
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub server_id: String,
    pub tool_name: String,
    pub params: Value,
}

/// A `ToolCaller` whose responses are configured up front per
/// `(server_id, tool_name)` pair; anything not configured returns a
/// `NotFound` error, mirroring `ConnectionManager::call_tool`'s behavior for
/// an unknown upstream.
pub struct MockUpstream {
    responses: Mutex<HashMap<(String, String), Response>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, server_id: &str, tool_name: &str, value: Value) -> Self {
        self.set_response(server_id, tool_name, Ok(value));
        self
    }

    pub fn with_error(self, server_id: &str, tool_name: &str, err: HubError) -> Self {
        self.set_response(server_id, tool_name, Err(err));
        self
    }

    fn set_response(&self, server_id: &str, tool_name: &str, response: Response) {
        let mut guard = self.responses.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert((server_id.to_string(), tool_name.to_string()), response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolCaller for MockUpstream {
    async fn call_tool(&self, server_id: &str, tool_name: &str, params: Value) -> Result<Value, HubError> {
        self.calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(RecordedCall {
            server_id: server_id.to_string(),
            tool_name: tool_name.to_string(),
            params: params.clone(),
        });

        let key = (server_id.to_string(), tool_name.to_string());
        match self.responses.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(&key) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(err)) => Err(HubError::new(err.kind(), err.message.clone())),
            None => Err(HubError::new(ErrorKind::NotFound, format!("no mock response configured for `{server_id}__{tool_name}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_replays_configured_response() {
        let mock = MockUpstream::new().with_response("github", "search_repos", serde_json::json!({"ok": true}));
        let result = mock.call_tool("github", "search_repos", serde_json::json!({"q": "rust"})).await;
        match result {
            Ok(value) => assert_eq!(value, serde_json::json!({"ok": true})),
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn unconfigured_tool_is_not_found() {
        let mock = MockUpstream::new();
        match mock.call_tool("github", "search_repos", Value::Null).await {
            Ok(_) => panic!("expected an error"),
            Err(e) => assert_eq!(e.kind(), ErrorKind::NotFound),
        }
    }
}
