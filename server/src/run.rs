//! Startup and shutdown lifecycle (§4.7): load config, connect upstreams
//! honoring required/optional policy, bind the inbound transport, and tear
//! everything down cleanly on signal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use rmcp::service::serve_server;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::StreamableHttpService;
use rmcp::transport::{stdio as stdio_transport, SseServer};
use tracing::info;

use mcphub_core::config::load_and_validate;
use mcphub_core::connection_manager::ConnectionManager;

use crate::builtin::{BuiltinTools, ExecPolicy};
use crate::handler::HubHandler;

#[derive(Clone, Copy, Debug)]
pub enum InboundTransport {
    Stdio,
    Http,
    Sse,
}

pub async fn serve(config_path: PathBuf, transport: InboundTransport, host: &str, port: u16) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(&config_path)
        .await
        .with_context(|| format!("reading config file {}", config_path.display()))?;
    let config = load_and_validate(&raw).context("loading config")?;

    let enabled_server_ids: Vec<String> = config
        .mcp_servers
        .iter()
        .filter(|(_, c)| c.enable)
        .map(|(id, _)| id.clone())
        .collect();

    info!(servers = enabled_server_ids.len(), "connecting to configured upstreams");
    let exec_policy = ExecPolicy::from_config(config.builtin_tools.get("exec"));
    let connections = ConnectionManager::start(config.mcp_servers)
        .await
        .context("starting connection manager")?;
    let builtins = Arc::new(BuiltinTools::new(Arc::clone(&connections), &enabled_server_ids, exec_policy));
    let handler = HubHandler::new(Arc::clone(&connections), builtins);

    let result = match transport {
        InboundTransport::Stdio => run_stdio(handler).await,
        InboundTransport::Http => run_http(handler, host, port).await,
        InboundTransport::Sse => run_sse(handler, host, port).await,
    };

    info!("shutting down, closing upstream sessions");
    for (server_id, err) in connections.disconnect_all().await {
        tracing::warn!(server = %server_id, error = %err, "upstream session did not close cleanly");
    }

    result
}

async fn run_stdio(handler: HubHandler) -> anyhow::Result<()> {
    info!("serving over stdio");
    let transport = stdio_transport();
    let running = serve_server(handler, transport).await?;
    tokio::signal::ctrl_c().await?;
    let _ = running.cancel().await;
    Ok(())
}

async fn run_http(handler: HubHandler, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    info!(%addr, "serving over streamable HTTP");
    let service = StreamableHttpService::new(move || Ok(handler.clone()), LocalSessionManager::default().into(), Default::default());
    let router = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, router).with_graceful_shutdown(ctrl_c()).await?;
    Ok(())
}

async fn run_sse(handler: HubHandler, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    info!(%addr, "serving over SSE");
    let socket_addr = addr.parse().with_context(|| format!("parsing bind address {addr}"))?;
    let ct = SseServer::serve(socket_addr).await?.with_service(move || handler.clone());
    tokio::signal::ctrl_c().await?;
    ct.cancel();
    Ok(())
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to install ctrl-c handler");
    }
}
