//! Connection Manager (§4.4): owns every upstream session, supervises
//! reconnection with backoff, and answers `listAll`/`callTool`.
//!
//! Directly grounded on `codex-core`'s `McpConnectionManager` (same
//! map-of-sessions-behind-an-RwLock shape, same spawn-a-supervisor-per-server
//! startup sequence, same "collect per-server errors instead of bailing on
//! the first" posture) with the session-traffic-serialization rule from §4.4
//! added on top (the teacher's sessions are exclusively owned already; this
//! one must additionally tolerate concurrent callers per session).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, ClientInfo};
use rmcp::service::{Peer, RunningService, ServiceExt};
use rmcp::RoleClient;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::caller::ToolCaller;
use crate::config::ServerConfig;
use crate::error::{ErrorKind, HubError};
use crate::name_mapper::{CollisionError, NameMapper};
use crate::registry::ToolEntry;
use crate::transport::{build_transport, Transport};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
const CLOSE_GUARD: Duration = Duration::from_secs(5);
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

pub type ClientStartErrors = HashMap<String, HubError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Reconnecting,
    Failed,
}

struct SessionInner {
    peer: Peer<RoleClient>,
}

/// One upstream connection plus its cached catalog (§3 "Upstream Session").
///
/// The `inner` mutex guards only the peer handle and is held only across the
/// (non-network) moment it takes to clone it out; `rmcp`'s `Peer` itself
/// serializes wire traffic to the upstream, satisfying §4.4's "the Session
/// object must serialize MCP traffic internally". The live `RunningService`
/// is owned exclusively by this session's supervisor task (see
/// `spawn_supervisor`) so the long-lived wait for disconnection never shares
/// a lock with `call_tool`.
pub struct Session {
    server_id: String,
    inner: Mutex<Option<SessionInner>>,
    tools: RwLock<HashMap<String, ToolEntry>>,
    state: Mutex<SessionState>,
    backoff: Mutex<Duration>,
    cancel: CancellationToken,
    supervisor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Session {
    fn new(server_id: String) -> Self {
        Self {
            server_id,
            inner: Mutex::new(None),
            tools: RwLock::new(HashMap::new()),
            state: Mutex::new(SessionState::Reconnecting),
            backoff: Mutex::new(BACKOFF_BASE),
            cancel: CancellationToken::new(),
            supervisor: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    pub async fn tools(&self) -> HashMap<String, ToolEntry> {
        self.tools.read().await.clone()
    }
}

/// Connect-then-discover sequence (§4.4): build a transport, open a
/// session, require an initialize response, then cache `listTools`.
#[allow(clippy::type_complexity)]
async fn connect_then_discover(
    server_id: &str,
    config: &ServerConfig,
) -> Result<(SessionInner, RunningService<RoleClient, ClientInfo>, HashMap<String, ToolEntry>), HubError> {
    let result = tokio::time::timeout(CONNECT_TIMEOUT, async {
        let transport = build_transport(server_id, config).await?;
        let client_info = ClientInfo::default();

        let service = match transport {
            Transport::Stdio(t) => client_info.serve(t).await,
            Transport::Http(t) => client_info.serve(t).await,
            Transport::Sse(t) => client_info.serve(t).await,
        }
        .map_err(|e| HubError::with_source(ErrorKind::Protocol, "failed to initialize upstream session", e))?;

        let peer = service.peer().clone();
        if peer.peer_info().is_none() {
            return Err(HubError::new(
                ErrorKind::Protocol,
                "upstream did not return an initialize response",
            ));
        }

        let tool_list = peer
            .list_all_tools()
            .await
            .map_err(|e| HubError::with_source(ErrorKind::Transport, "failed to list upstream tools", e))?;

        let mut tools = HashMap::with_capacity(tool_list.len());
        for tool in tool_list {
            let entry = ToolEntry::new(
                server_id,
                tool.name.as_ref(),
                serde_json::to_value(&tool.input_schema).unwrap_or(Value::Null),
                tool.description.map(|d| d.to_string()),
            );
            tools.insert(entry.wire_name.clone(), entry);
        }

        Ok((SessionInner { peer }, service, tools))
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(_) => Err(HubError::new(ErrorKind::Transport, "connect-then-discover timed out")),
    }
}

/// Owns every upstream session (§4.4).
pub struct ConnectionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    configs: RwLock<HashMap<String, ServerConfig>>,
}

impl ConnectionManager {
    pub fn empty() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Connects to every enabled server, honoring required/optional policy
    /// (§4.4, §4.7 step 1): a required server's failure aborts startup
    /// (`Fatal`); an optional server's failure is logged and its supervisor
    /// keeps retrying.
    pub async fn start(configs: HashMap<String, ServerConfig>) -> Result<Arc<Self>, HubError> {
        let manager = Arc::new(Self::empty());
        let mut join_set = JoinSet::new();

        for (server_id, config) in configs.iter().filter(|(_, c)| c.enable) {
            let server_id = server_id.clone();
            let config = config.clone();
            let manager = Arc::clone(&manager);
            join_set.spawn(async move {
                let result = manager.connect(server_id.clone(), config.clone()).await;
                (server_id, config.required, result)
            });
        }

        let mut errors: ClientStartErrors = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            let (server_id, required, result) = joined
                .map_err(|e| HubError::with_source(ErrorKind::Fatal, "connection task panicked", e))?;
            if let Err(err) = result {
                if required {
                    return Err(HubError::new(
                        ErrorKind::Fatal,
                        format!("required server `{server_id}` failed to connect: {err}"),
                    ));
                }
                warn!(server = %server_id, error = %err, "optional upstream failed to connect at startup");
                errors.insert(server_id, err);
            }
        }

        *manager.configs.write().await = configs;

        let wire_names: Vec<String> = manager.list_all().await.into_keys().collect();
        if let Err(CollisionError(groups)) = NameMapper::build(wire_names.iter().map(String::as_str)) {
            return Err(HubError::new(
                ErrorKind::Fatal,
                format!("catalog has colliding tool names after camelCase folding: {groups:?}"),
            ));
        }

        Ok(manager)
    }

    /// Idempotent: returns immediately if already connected (§4.4, §8
    /// "repeated connect performs no network work").
    pub async fn connect(&self, server_id: String, config: ServerConfig) -> Result<(), HubError> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&server_id) {
                if session.state().await == SessionState::Connected {
                    return Ok(());
                }
            }
        }

        let session = Arc::new(Session::new(server_id.clone()));
        let (inner, service, tools) = connect_then_discover(&server_id, &config).await?;
        *session.inner.lock().await = Some(inner);
        *session.tools.write().await = tools;
        *session.state.lock().await = SessionState::Connected;
        *session.backoff.lock().await = BACKOFF_BASE;

        self.sessions.write().await.insert(server_id.clone(), Arc::clone(&session));
        self.configs.write().await.insert(server_id.clone(), config.clone());

        let handle = spawn_supervisor(server_id, config, Arc::clone(&session), service);
        *session.supervisor.lock().await = Some(handle);
        Ok(())
    }

    pub async fn call_tool(&self, server_id: &str, tool_name: &str, arguments: Value) -> Result<Value, HubError> {
        let session = {
            let sessions = self.sessions.read().await;
            sessions
                .get(server_id)
                .cloned()
                .ok_or_else(|| HubError::not_found(format!("unknown upstream `{server_id}`")))?
        };

        let peer = {
            let guard = session.inner.lock().await;
            guard
                .as_ref()
                .map(|inner| inner.peer.clone())
                .ok_or_else(|| HubError::new(ErrorKind::Transport, "upstream session is not connected"))?
        };

        let args = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => return Err(HubError::validation(format!("tool arguments must be an object or null, got {other}"))),
        };

        let result = peer
            .call_tool(CallToolRequestParam {
                name: tool_name.to_string().into(),
                arguments: args,
            })
            .await
            .map_err(|e| HubError::with_source(ErrorKind::Upstream, "upstream tool call failed", e))?;

        serde_json::to_value(&result)
            .map_err(|e| HubError::with_source(ErrorKind::Protocol, "failed to encode upstream result", e))
    }

    pub async fn list_tools(&self, server_id: &str) -> Result<HashMap<String, ToolEntry>, HubError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(server_id)
            .ok_or_else(|| HubError::not_found(format!("unknown upstream `{server_id}`")))?;
        Ok(session.tools().await)
    }

    /// Authoritative aggregated view (§4.4): reports whatever is currently
    /// cached per-session, without waiting for not-yet-connected optional
    /// upstreams (§9's "report what is currently available" decision).
    pub async fn list_all(&self) -> HashMap<String, ToolEntry> {
        let sessions = self.sessions.read().await;
        let mut all = HashMap::new();
        for session in sessions.values() {
            all.extend(session.tools().await);
        }
        all
    }

    /// Diagnostic (§4.4): unprefixed tool names present on more than one
    /// server. Namespacing already makes these non-fatal at runtime.
    pub async fn detect_collisions(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut seen: HashMap<String, usize> = HashMap::new();
        for session in sessions.values() {
            for entry in session.tools().await.values() {
                *seen.entry(entry.tool_name.clone()).or_insert(0) += 1;
            }
        }
        seen.into_iter().filter(|(_, count)| *count > 1).map(|(name, _)| name).collect()
    }

    /// Cancels every supervisor and closes every session, each bounded by a
    /// 5 s guard (§4.4). Idempotent after it returns (§8).
    pub async fn disconnect_all(&self) -> Vec<(String, HubError)> {
        let mut sessions = self.sessions.write().await;
        let mut errors = Vec::new();

        for (server_id, session) in sessions.drain() {
            session.cancel.cancel();
            *session.state.lock().await = SessionState::Failed;
            *session.inner.lock().await = None;

            let handle = session.supervisor.lock().await.take();
            let close = tokio::time::timeout(CLOSE_GUARD, async {
                if let Some(handle) = handle {
                    let _ = handle.await;
                }
            })
            .await;
            if close.is_err() {
                errors.push((server_id, HubError::new(ErrorKind::Transport, "session close exceeded 5s guard")));
            }
        }

        errors
    }
}

#[async_trait]
impl ToolCaller for ConnectionManager {
    async fn call_tool(&self, server_id: &str, tool_name: &str, params: Value) -> Result<Value, HubError> {
        ConnectionManager::call_tool(self, server_id, tool_name, params).await
    }
}

/// Supervisor state machine (§4.4 table): `Connected` (clears backoff) →
/// `Reconnecting` (sleeps, retries, doubles backoff on failure, capped at
/// 30s) → terminal `Shutdown` when the session's cancellation fires.
///
/// The `RunningService` returned by the initial connect is moved into this
/// task and lives only in its local `service` variable — never behind
/// `session.inner`'s mutex — so the long wait for disconnection below never
/// contends with `call_tool`'s short peer-handle lookup.
fn spawn_supervisor(
    server_id: String,
    config: ServerConfig,
    session: Arc<Session>,
    mut service: RunningService<RoleClient, ClientInfo>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = session.cancel.cancelled() => {
                    info!(server = %server_id, "supervisor shutting down");
                    return;
                }
                _ = service.waiting() => {}
            }

            *session.inner.lock().await = None;
            *session.state.lock().await = SessionState::Reconnecting;
            loop {
                let backoff = *session.backoff.lock().await;
                tokio::select! {
                    _ = session.cancel.cancelled() => return,
                    _ = tokio::time::sleep(backoff) => {}
                }

                match connect_then_discover(&server_id, &config).await {
                    Ok((inner, new_service, tools)) => {
                        *session.inner.lock().await = Some(inner);
                        service = new_service;
                        *session.tools.write().await = tools;
                        *session.state.lock().await = SessionState::Connected;
                        *session.backoff.lock().await = BACKOFF_BASE;
                        info!(server = %server_id, "upstream reconnected");
                        break;
                    }
                    Err(err) => {
                        warn!(server = %server_id, error = %err, "reconnect attempt failed");
                        let mut backoff_guard = session.backoff.lock().await;
                        *backoff_guard = std::cmp::min(*backoff_guard * 2, BACKOFF_CAP);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sequence_matches_spec() {
        let mut backoff = BACKOFF_BASE;
        let mut sequence = vec![backoff];
        for _ in 0..6 {
            backoff = std::cmp::min(backoff * 2, BACKOFF_CAP);
            sequence.push(backoff);
        }
        let secs: Vec<u64> = sequence.iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 30, 30]);
    }
}
