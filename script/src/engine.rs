//! Sandboxed scripting runtime behind the built-in `exec` tool (§4.6).
//!
//! `rhai` is the engine: it ships with no file-system, process, or network
//! access in its standard package, so the "blocked by policy" list in §4.6
//! is satisfied by simply never registering anything beyond the two
//! injected globals — there is nothing to disable. Each `execute` call gets
//! a fresh `Engine`, fresh `Scope`, and fresh log buffer (§4.6).
//!
//! The script itself runs on a blocking-pool thread (`spawn_blocking`) so a
//! long-running or CPU-bound script does not stall the async runtime the
//! rest of the hub depends on; `mcp.callTool` bridges back into async code
//! from that thread via `Handle::block_on`, matching the "looks
//! synchronous, the runtime may internally await" design note in §9.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use mcphub_core::caller::ToolCaller;
use mcphub_core::error::{classify_tool_error, ErrorKind, HubError};
use mcphub_core::name_mapper::{is_namespaced, parse_namespaced};
use mcphub_core::sanitize::sanitize_tool_error;

use crate::log::{LogBuffer, LogEntry, LogLevel};

pub const MAX_SCRIPT_BYTES: usize = 100 * 1024;
const DEFAULT_DEADLINE: Duration = Duration::from_secs(15);
/// How often `on_progress` re-checks the deadline/cancellation, in engine
/// operation counts; kept small so interruption latency stays bounded.
const PROGRESS_CHECK_EVERY_OPS: u64 = 64;

pub struct ExecutionContext {
    pub tool_caller: Arc<dyn ToolCaller>,
    pub deadline: Duration,
    pub allow_list: Option<HashMap<String, Vec<String>>>,
    /// In single-upstream mode, a bare tool name (no `__`) resolves against
    /// this server id (§4.6).
    pub single_upstream: Option<String>,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(tool_caller: Arc<dyn ToolCaller>) -> Self {
        Self {
            tool_caller,
            deadline: DEFAULT_DEADLINE,
            allow_list: None,
            single_upstream: None,
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug)]
pub struct ExecutionResult {
    pub value: Value,
    pub logs: Vec<LogEntry>,
    pub error: Option<HubError>,
}

/// Shared handle injected into the script as the `mcp` global.
#[derive(Clone)]
struct McpApi {
    tool_caller: Arc<dyn ToolCaller>,
    logs: Arc<LogBuffer>,
    runtime: Handle,
    allow_list: Option<Arc<HashMap<String, Vec<String>>>>,
    single_upstream: Option<String>,
    deadline_at: Instant,
}

impl McpApi {
    fn resolve(&self, full_name: &str) -> Result<(String, String), Box<EvalAltResult>> {
        if is_namespaced(full_name) {
            let (server, tool) = parse_namespaced(full_name).unwrap_or((full_name, full_name));
            return Ok((server.to_string(), tool.to_string()));
        }
        match &self.single_upstream {
            Some(server) => Ok((server.clone(), full_name.to_string())),
            None => Err(format!("`{full_name}` is not namespaced and there is no single upstream").into()),
        }
    }

    fn authorized(&self, server: &str, tool: &str) -> bool {
        match &self.allow_list {
            None => true,
            Some(list) => list.get(server).is_some_and(|tools| tools.iter().any(|t| t == tool)),
        }
    }

    fn call_tool_no_params(&mut self, full_name: &str) -> Result<Dynamic, Box<EvalAltResult>> {
        self.call_tool(full_name, Dynamic::UNIT)
    }

    fn call_tool(&mut self, full_name: &str, params: Dynamic) -> Result<Dynamic, Box<EvalAltResult>> {
        let (server, tool) = self.resolve(full_name)?;
        if !self.authorized(&server, &tool) {
            return Err(format!("call to `{full_name}` is not in the tool allow-list").into());
        }

        let params_value = dynamic_to_params(params)?;
        let remaining = self.deadline_at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err("deadline exceeded".into());
        }

        let tool_caller = Arc::clone(&self.tool_caller);
        let fut = tool_caller.call_tool(&server, &tool, params_value);
        let result = self
            .runtime
            .block_on(async { tokio::time::timeout(remaining, fut).await });

        match result {
            Err(_) => Err("deadline exceeded".into()),
            Ok(Err(err)) => {
                let class = classify_tool_error(&err.message);
                let sanitized = sanitize_tool_error(&err.message);
                Err(format!("{class}: {sanitized}").into())
            }
            Ok(Ok(value)) => Ok(value_to_dynamic(value)),
        }
    }

    fn log(&mut self, level: &str, message: &str, fields: Dynamic) {
        let fields_value = if fields.is_unit() {
            None
        } else {
            rhai::serde::from_dynamic::<Value>(&fields).ok()
        };
        self.logs.push(LogLevel::parse_or_info(level), message, fields_value);
    }

    fn log_without_fields(&mut self, level: &str, message: &str) {
        self.log(level, message, Dynamic::UNIT);
    }
}

/// Shared handle injected into the script as the `console` global.
#[derive(Clone)]
struct ConsoleApi {
    logs: Arc<LogBuffer>,
}

impl ConsoleApi {
    fn emit(&self, level: LogLevel, args: &[Dynamic]) {
        let message = args
            .iter()
            .map(dynamic_to_display_string)
            .collect::<Vec<_>>()
            .join(" ");
        self.logs.push(level, &message, None);
    }

    fn log0(&mut self) {
        self.emit(LogLevel::Info, &[]);
    }
    fn log1(&mut self, a: Dynamic) {
        self.emit(LogLevel::Info, &[a]);
    }
    fn log2(&mut self, a: Dynamic, b: Dynamic) {
        self.emit(LogLevel::Info, &[a, b]);
    }
    fn log3(&mut self, a: Dynamic, b: Dynamic, c: Dynamic) {
        self.emit(LogLevel::Info, &[a, b, c]);
    }

    fn info1(&mut self, a: Dynamic) {
        self.emit(LogLevel::Info, &[a]);
    }
    fn warn1(&mut self, a: Dynamic) {
        self.emit(LogLevel::Warn, &[a]);
    }
    fn error1(&mut self, a: Dynamic) {
        self.emit(LogLevel::Error, &[a]);
    }
    fn debug1(&mut self, a: Dynamic) {
        self.emit(LogLevel::Debug, &[a]);
    }
}

fn dynamic_to_display_string(value: &Dynamic) -> String {
    match value.clone().into_string() {
        Ok(s) => s,
        Err(_) => value.to_string(),
    }
}

fn dynamic_to_params(params: Dynamic) -> Result<Value, Box<EvalAltResult>> {
    if params.is_unit() {
        return Ok(Value::Null);
    }
    if !params.is_map() {
        return Err("mcp.callTool params must be an object or null/undefined".into());
    }
    rhai::serde::from_dynamic(&params).map_err(|e| format!("invalid params: {e}").into())
}

fn value_to_dynamic(value: Value) -> Dynamic {
    // Per §4.6: if the upstream result's first text content block parses
    // as JSON, return the parsed value; the connection manager already
    // hands back the raw `CallToolResult` JSON, so we peel out that first
    // text block here if present, else fall back to the whole value.
    let candidate = extract_first_text_as_json(&value).unwrap_or(value);
    rhai::serde::to_dynamic(&candidate).unwrap_or(Dynamic::UNIT)
}

fn extract_first_text_as_json(value: &Value) -> Option<Value> {
    let text = value.get("content")?.as_array()?.first()?.get("text")?.as_str()?;
    serde_json::from_str(text).ok().or_else(|| Some(Value::String(text.to_string())))
}

fn build_engine(deadline_at: Instant, cancel: CancellationToken) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_string_size(MAX_SCRIPT_BYTES * 4);

    engine.on_progress(move |ops| {
        if ops % PROGRESS_CHECK_EVERY_OPS != 0 {
            return None;
        }
        if Instant::now() >= deadline_at || cancel.is_cancelled() {
            return Some(Dynamic::from("timeout"));
        }
        None
    });

    engine
}

/// Runs one script to completion (or interruption). Never panics: every
/// failure mode becomes `ExecutionResult.error` with logs preserved
/// alongside it, so the caller sees logs plus error kind even on failure
/// (§4.7).
pub async fn execute(code: String, ctx: ExecutionContext) -> ExecutionResult {
    if code.len() > MAX_SCRIPT_BYTES {
        return ExecutionResult {
            value: Value::Null,
            logs: Vec::new(),
            error: Some(HubError::new(
                ErrorKind::ScriptValidation,
                format!("script exceeds {MAX_SCRIPT_BYTES} bytes"),
            )),
        };
    }

    let runtime = Handle::current();
    let deadline_at = Instant::now() + ctx.deadline;
    let logs = Arc::new(LogBuffer::new());
    let allow_list = ctx.allow_list.map(Arc::new);

    let mcp_api = McpApi {
        tool_caller: ctx.tool_caller,
        logs: Arc::clone(&logs),
        runtime: runtime.clone(),
        allow_list,
        single_upstream: ctx.single_upstream,
        deadline_at,
    };
    let console_api = ConsoleApi { logs: Arc::clone(&logs) };
    let cancel = ctx.cancel.clone();

    let join = tokio::task::spawn_blocking(move || run_script_blocking(code, mcp_api, console_api, deadline_at, cancel)).await;

    let logs = match Arc::try_unwrap(logs) {
        Ok(buffer) => buffer.into_entries(),
        Err(shared) => shared.snapshot(),
    };

    match join {
        Ok(Ok(value)) => ExecutionResult { value, logs, error: None },
        Ok(Err(err)) => ExecutionResult { value: Value::Null, logs, error: Some(err) },
        Err(join_err) => ExecutionResult {
            value: Value::Null,
            logs,
            error: Some(HubError::with_source(ErrorKind::ScriptRuntime, "script task panicked", join_err)),
        },
    }
}

fn run_script_blocking(
    code: String,
    mcp_api: McpApi,
    console_api: ConsoleApi,
    deadline_at: Instant,
    cancel: CancellationToken,
) -> Result<Value, HubError> {
    let mut engine = build_engine(deadline_at, cancel);

    engine
        .register_type_with_name::<McpApi>("Mcp")
        .register_fn("callTool", McpApi::call_tool)
        .register_fn("callTool", McpApi::call_tool_no_params)
        .register_fn("log", McpApi::log)
        .register_fn("log", McpApi::log_without_fields);

    engine
        .register_type_with_name::<ConsoleApi>("Console")
        .register_fn("log", ConsoleApi::log0)
        .register_fn("log", ConsoleApi::log1)
        .register_fn("log", ConsoleApi::log2)
        .register_fn("log", ConsoleApi::log3)
        .register_fn("info", ConsoleApi::info1)
        .register_fn("warn", ConsoleApi::warn1)
        .register_fn("error", ConsoleApi::error1)
        .register_fn("debug", ConsoleApi::debug1);

    let ast = engine
        .compile(&code)
        .map_err(|e| HubError::new(ErrorKind::ScriptSyntax, e.to_string()))?;

    let mut scope = Scope::new();
    scope.push_constant("mcp", mcp_api);
    scope.push_constant("console", console_api);

    match engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast) {
        Ok(result) => Ok(rhai::serde::from_dynamic(&result).unwrap_or(Value::Null)),
        Err(err) => {
            let message = err.to_string();
            if message.contains("timeout") || matches!(*err, EvalAltResult::ErrorTerminated(_, _)) {
                Err(HubError::new(ErrorKind::ScriptTimeout, "script execution timed out"))
            } else {
                Err(HubError::new(ErrorKind::ScriptRuntime, message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoCaller;

    #[async_trait]
    impl ToolCaller for EchoCaller {
        async fn call_tool(&self, _server_id: &str, _tool_name: &str, params: Value) -> Result<Value, HubError> {
            Ok(serde_json::json!({"content": [{"type": "text", "text": params.to_string()}]}))
        }
    }

    #[tokio::test]
    async fn evaluates_last_expression() {
        let ctx = ExecutionContext::new(Arc::new(EchoCaller));
        let result = execute("1 + 2".to_string(), ctx).await;
        assert_eq!(result.value, Value::from(3));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn oversized_script_is_rejected_before_engine_startup() {
        let ctx = ExecutionContext::new(Arc::new(EchoCaller));
        let code = "a".repeat(MAX_SCRIPT_BYTES + 1);
        let result = execute(code, ctx).await;
        match result.error {
            Some(err) => assert_eq!(err.kind(), ErrorKind::ScriptValidation),
            None => panic!("expected a validation error"),
        }
    }

    #[tokio::test]
    async fn syntax_error_is_classified() {
        let ctx = ExecutionContext::new(Arc::new(EchoCaller));
        let result = execute("let x = ".to_string(), ctx).await;
        match result.error {
            Some(err) => assert_eq!(err.kind(), ErrorKind::ScriptSyntax),
            None => panic!("expected a syntax error"),
        }
    }

    #[tokio::test]
    async fn infinite_loop_times_out() {
        let mut ctx = ExecutionContext::new(Arc::new(EchoCaller));
        ctx.deadline = Duration::from_millis(100);
        let result = execute("while (true) {}".to_string(), ctx).await;
        match result.error {
            Some(err) => assert_eq!(err.kind(), ErrorKind::ScriptTimeout),
            None => panic!("expected a timeout error"),
        }
    }

    #[tokio::test]
    async fn mcp_call_tool_round_trips_through_echo() {
        let ctx = ExecutionContext::new(Arc::new(EchoCaller));
        let result = execute("mcp.callTool(\"up__echo\", #{a: 1})".to_string(), ctx).await;
        assert!(result.error.is_none());
    }
}
