//! The minimal capability the script runtime consumes (§9, "dynamic
//! dispatch for tool callers in the script runtime"): both the production
//! `ConnectionManager` and the test harness's in-process mock satisfy this
//! trait, which keeps the runtime decoupled from session types.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HubError;

#[async_trait]
pub trait ToolCaller: Send + Sync {
    async fn call_tool(&self, server_id: &str, tool_name: &str, params: Value) -> Result<Value, HubError>;
}
