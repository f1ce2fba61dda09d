//! The hub's inbound `rmcp::ServerHandler` (§4.5, §4.7). Implemented by hand
//! rather than via the `#[tool_router]` macro (contrast with the rhai
//! tool-orchestrator example this crate is otherwise closest to) because the
//! tool set is not fixed at compile time: it is the union of whatever the
//! connected upstreams currently expose plus the four built-ins, and that
//! union can change as upstreams reconnect.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorData, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::ServerHandler;
use serde_json::Value;

use mcphub_core::connection_manager::ConnectionManager;
use mcphub_core::error::HubError;
use mcphub_core::name_mapper::parse_namespaced;
use mcphub_core::sanitize::sanitize_tool_error;

use crate::builtin::{self, BuiltinTools};

#[derive(Clone)]
pub struct HubHandler {
    connections: Arc<ConnectionManager>,
    builtins: Arc<BuiltinTools>,
}

impl HubHandler {
    pub fn new(connections: Arc<ConnectionManager>, builtins: Arc<BuiltinTools>) -> Self {
        Self { connections, builtins }
    }

    async fn dispatch(&self, name: &str, arguments: Value) -> Result<Value, HubError> {
        if builtin::is_builtin(name) {
            return self.builtins.dispatch(name, arguments).await;
        }
        let (server_id, tool_name) = parse_namespaced(name)
            .ok_or_else(|| HubError::not_found(format!("unknown tool `{name}`")))?;
        self.connections.call_tool(server_id, tool_name, arguments).await
    }
}

fn hub_error_to_result(err: HubError) -> CallToolResult {
    let message = sanitize_tool_error(&err.message);
    CallToolResult::error(vec![Content::text(format!("{}: {message}", err.kind().as_str()))])
}

fn value_to_result(value: Value) -> CallToolResult {
    let text = serde_json::to_string(&value).unwrap_or_else(|_| value.to_string());
    CallToolResult::success(vec![Content::text(text)])
}

impl ServerHandler for HubHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mcphub".to_string(),
                title: Some("MCP Aggregating Hub".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Aggregates tools from multiple upstream MCP servers under `server__tool` names. \
                 Use `list`/`inspect` to discover tools, `invoke` to call one directly, or `exec` \
                 to run a short Rhai script that chains several calls together."
                    .to_string(),
            ),
        }
    }

    fn call_tool<'a>(
        &'a self,
        params: CallToolRequestParam,
        _ctx: RequestContext<RoleServer>,
    ) -> Pin<Box<dyn Future<Output = Result<CallToolResult, ErrorData>> + Send + 'a>> {
        Box::pin(async move {
            let arguments = params.arguments.map(Value::Object).unwrap_or(Value::Null);
            match self.dispatch(&params.name, arguments).await {
                Ok(value) => Ok(value_to_result(value)),
                Err(err) => Ok(hub_error_to_result(err)),
            }
        })
    }

    fn list_tools<'a>(
        &'a self,
        _params: Option<PaginatedRequestParam>,
        _ctx: RequestContext<RoleServer>,
    ) -> Pin<Box<dyn Future<Output = Result<ListToolsResult, ErrorData>> + Send + 'a>> {
        Box::pin(async move {
            let mut tools: Vec<rmcp::model::Tool> = self
                .connections
                .list_all()
                .await
                .into_values()
                .map(|entry| to_rmcp_tool(entry.wire_name, entry.description, entry.input_schema))
                .collect();

            for (name, description, schema) in builtin::descriptors() {
                tools.push(to_rmcp_tool(name.to_string(), Some(description.to_string()), schema));
            }

            tools.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(ListToolsResult::with_all_items(tools))
        })
    }
}

fn to_rmcp_tool(name: String, description: Option<String>, schema: Value) -> rmcp::model::Tool {
    let schema_obj = match schema {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    rmcp::model::Tool::new(name, description.unwrap_or_default(), Arc::new(schema_obj))
}
