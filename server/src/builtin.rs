//! The four always-present built-in tools (§4.5): `list`, `inspect`,
//! `invoke`, `exec`. These sit alongside the aggregated upstream catalog in
//! every `listTools` response and are dispatched here rather than forwarded
//! to a `ConnectionManager` session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcphub_core::connection_manager::ConnectionManager;
use mcphub_core::error::{ErrorKind, HubError};
use mcphub_core::name_mapper::{is_namespaced, parse_namespaced};
use mcphub_core::sanitize::sanitize_tool_error;
use mcphub_script::{execute, ExecutionContext};
use serde_json::{json, Value};

pub const LIST: &str = "list";
pub const INSPECT: &str = "inspect";
pub const INVOKE: &str = "invoke";
pub const EXEC: &str = "exec";

const INSPECT_NAME_MAX_CHARS: usize = 500;
const DEFAULT_SCRIPT_DEADLINE: Duration = Duration::from_secs(15);

pub fn is_builtin(name: &str) -> bool {
    matches!(name, LIST | INSPECT | INVOKE | EXEC)
}

/// Tool descriptors for the four built-ins, returned alongside the
/// aggregated upstream catalog from `listTools` (§4.5).
pub fn descriptors() -> Vec<(&'static str, &'static str, Value)> {
    vec![
        (
            LIST,
            "Lists every tool currently available across connected upstream servers.",
            json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        ),
        (
            INSPECT,
            "Returns the full description and input schema for one tool.",
            json!({
                "type": "object",
                "properties": { "name": { "type": "string", "maxLength": INSPECT_NAME_MAX_CHARS } },
                "required": ["name"],
                "additionalProperties": false
            }),
        ),
        (
            INVOKE,
            "Calls one upstream tool by its wire name (`server__tool`, or a bare name in single-upstream mode).",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "params": { "type": "object" }
                },
                "required": ["name"],
                "additionalProperties": false
            }),
        ),
        (
            EXEC,
            "Runs a sandboxed Rhai script that can call upstream tools via `mcp.callTool(name, params)`.",
            json!({
                "type": "object",
                "properties": {
                    "code": { "type": "string" },
                    "timeoutMs": { "type": "integer", "minimum": 1 }
                },
                "required": ["code"],
                "additionalProperties": false
            }),
        ),
    ]
}

/// Policy for the `exec` built-in, resolved from `HubConfig.builtin_tools`
/// (§6). Absent configuration enables `exec` with no allow-list.
#[derive(Debug, Clone, Default)]
pub struct ExecPolicy {
    pub enabled: bool,
    pub tool_allow_list: Option<HashMap<String, Vec<String>>>,
}

impl ExecPolicy {
    pub fn from_config(raw: Option<&Value>) -> Self {
        let Some(raw) = raw else {
            return Self { enabled: true, tool_allow_list: None };
        };
        let enabled = raw.get("enabled").and_then(Value::as_bool).unwrap_or(true);
        let tool_allow_list = raw.get("toolAllowList").and_then(|v| v.as_object()).map(|obj| {
            obj.iter()
                .map(|(server, tools)| {
                    let names = tools
                        .as_array()
                        .into_iter()
                        .flatten()
                        .filter_map(|t| t.as_str().map(str::to_string))
                        .collect();
                    (server.clone(), names)
                })
                .collect()
        });
        Self { enabled, tool_allow_list }
    }
}

pub struct BuiltinTools {
    connections: Arc<ConnectionManager>,
    single_upstream: Option<String>,
    exec_policy: ExecPolicy,
}

impl BuiltinTools {
    pub fn new(connections: Arc<ConnectionManager>, enabled_server_ids: &[String], exec_policy: ExecPolicy) -> Self {
        let single_upstream = match enabled_server_ids {
            [only] => Some(only.clone()),
            _ => None,
        };
        Self { connections, single_upstream, exec_policy }
    }

    pub async fn dispatch(&self, name: &str, args: Value) -> Result<Value, HubError> {
        match name {
            LIST => self.list().await,
            INSPECT => self.inspect(args).await,
            INVOKE => self.invoke(args).await,
            EXEC => self.exec(args).await,
            other => Err(HubError::not_found(format!("unknown built-in tool `{other}`"))),
        }
    }

    async fn list(&self) -> Result<Value, HubError> {
        let mut entries: Vec<Value> = self
            .connections
            .list_all()
            .await
            .into_values()
            .filter(|entry| is_namespaced(&entry.wire_name))
            .map(|entry| json!({ "name": entry.wire_name, "description": entry.description }))
            .collect();
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        Ok(json!({ "tools": entries }))
    }

    async fn inspect(&self, args: Value) -> Result<Value, HubError> {
        let name = string_field(&args, "name")?;
        if name.chars().count() > INSPECT_NAME_MAX_CHARS {
            return Err(HubError::validation(format!("`name` exceeds {INSPECT_NAME_MAX_CHARS} chars")));
        }

        let wire_name = self.resolve_name(&name)?;
        let all = self.connections.list_all().await;
        let entry = all
            .get(&wire_name)
            .ok_or_else(|| HubError::not_found(format!("unknown tool `{name}`")))?;
        Ok(json!({
            "name": entry.wire_name,
            "serverId": entry.server_id,
            "toolName": entry.tool_name,
            "description": entry.description,
            "inputSchema": entry.input_schema,
        }))
    }

    async fn invoke(&self, args: Value) -> Result<Value, HubError> {
        let name = string_field(&args, "name")?;
        let wire_name = self.resolve_name(&name)?;
        let (server_id, tool_name) = parse_namespaced(&wire_name)
            .ok_or_else(|| HubError::validation(format!("`{name}` is not a namespaced tool name")))?;
        let params = args.get("params").cloned().unwrap_or(Value::Null);
        self.connections.call_tool(server_id, tool_name, params).await
    }

    async fn exec(&self, args: Value) -> Result<Value, HubError> {
        if !self.exec_policy.enabled {
            return Err(HubError::new(ErrorKind::Validation, "the `exec` built-in is disabled by configuration"));
        }

        let code = string_field(&args, "code")?;
        let deadline = args
            .get("timeoutMs")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SCRIPT_DEADLINE);

        let tool_caller: Arc<dyn mcphub_core::ToolCaller> = Arc::clone(&self.connections) as Arc<dyn mcphub_core::ToolCaller>;
        let mut ctx = ExecutionContext::new(tool_caller);
        ctx.deadline = deadline;
        ctx.allow_list = self.exec_policy.tool_allow_list.clone();
        ctx.single_upstream = self.single_upstream.clone();

        let result = execute(code, ctx).await;
        match result.error {
            Some(err) => Ok(json!({
                "result": Value::Null,
                "logs": result.logs,
                "error": {
                    "kind": err.kind().as_str(),
                    "message": sanitize_tool_error(&err.message),
                },
            })),
            None => Ok(json!({
                "result": result.value,
                "logs": result.logs,
            })),
        }
    }

    /// Resolves a bare tool name against the single upstream when there is
    /// exactly one enabled server; otherwise requires the full wire name.
    fn resolve_name(&self, name: &str) -> Result<String, HubError> {
        if is_namespaced(name) {
            return Ok(name.to_string());
        }
        match &self.single_upstream {
            Some(server) => Ok(mcphub_core::name_mapper::join_namespaced(server, name)),
            None => Err(HubError::validation(format!(
                "`{name}` is not namespaced and there is no single upstream to default to"
            ))),
        }
    }
}

fn string_field(args: &Value, field: &str) -> Result<String, HubError> {
    args.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HubError::validation(format!("missing required string field `{field}`")))
}
