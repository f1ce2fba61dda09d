//! Transport Factory (§4.2): turns one `ServerConfig` into an `rmcp`
//! transport capable of driving an MCP client session.
//!
//! Modeled as a polymorphic `Transport` enum with one variant per wire
//! protocol (§9's "dynamic dispatch for transports" note) so callers see a
//! single construction surface; the factory function is the only switch
//! point.

use rmcp::transport::child_process::TokioChildProcess;
use rmcp::transport::sse_client::{SseClientConfig, SseClientTransport};
use rmcp::transport::streamable_http_client::{
    StreamableHttpClientTransport, StreamableHttpClientTransportConfig,
};
use tokio::process::Command;
use tracing::warn;

use crate::config::{ServerConfig, TransportKind};
use crate::config_env::expand_from_env;
use crate::error::{ErrorKind, HubError};

/// The materialized transport for one upstream. Each variant is exactly
/// what the corresponding `rmcp::serve_client`/`().serve(...)` call expects.
pub enum Transport {
    Stdio(TokioChildProcess),
    Http(StreamableHttpClientTransport<reqwest::Client>),
    Sse(SseClientTransport<reqwest::Client>),
}

/// Builds a `Transport` for the given server config. The caller supplies
/// the resolved server id only for warning/log context.
pub async fn build_transport(server_id: &str, config: &ServerConfig) -> Result<Transport, HubError> {
    match config.transport {
        TransportKind::Stdio => build_stdio(config),
        TransportKind::Http => build_http(server_id, config),
        TransportKind::Sse => build_sse(server_id, config).await,
    }
}

fn build_stdio(config: &ServerConfig) -> Result<Transport, HubError> {
    let command = config
        .command
        .as_deref()
        .ok_or_else(|| HubError::validation("stdio server missing command"))?;

    let mut cmd = Command::new(command);
    cmd.args(&config.args);
    // Clean environment composed of the process environment plus the
    // config's explicit env map (§4.2).
    for (key, value) in &config.env {
        cmd.env(key, value);
    }

    let child = TokioChildProcess::new(cmd)
        .map_err(|e| HubError::with_source(ErrorKind::Transport, "failed to spawn upstream process", e))?;
    Ok(Transport::Stdio(child))
}

fn expand_headers(config: &ServerConfig) -> std::collections::HashMap<String, String> {
    config
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), expand_from_env(v)))
        .collect()
}

/// `rmcp`'s streamable-HTTP transport config does not accept a caller-built
/// `reqwest::Client` (only a bearer header and the URI), so TLS-skip is not
/// honored on this path; the warning still fires so operators notice a
/// config that asked for it. The SSE path below does accept a client and
/// enforces TLS 1.2 / custom timeouts there.
fn build_http(server_id: &str, config: &ServerConfig) -> Result<Transport, HubError> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| HubError::validation("http server missing url"))?;

    if config.tls_skip_verify {
        warn!(server = server_id, url, "tlsSkipVerify has no effect on the streamable-http transport");
    }

    let headers = expand_headers(config);
    let mut http_config = StreamableHttpClientTransportConfig::with_uri(url.to_string());
    if let Some(auth) = headers.get("Authorization") {
        http_config = http_config.auth_header(auth.clone());
    }

    Ok(Transport::Http(StreamableHttpClientTransport::from_config(
        http_config,
    )))
}

async fn build_sse(server_id: &str, config: &ServerConfig) -> Result<Transport, HubError> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| HubError::validation("sse server missing url"))?;

    if config.tls_skip_verify {
        warn!(server = server_id, url, "TLS verification disabled for upstream");
    }

    // The SSE read stream is long-lived; a request-level timeout would kill
    // it (§4.2, §9) — so, unlike the HTTP client above, no `.timeout(...)`
    // is ever set here regardless of `config.timeout`.
    let client = reqwest::Client::builder()
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .danger_accept_invalid_certs(config.tls_skip_verify)
        .build()
        .map_err(|e| HubError::with_source(ErrorKind::Transport, "failed to build HTTP client", e))?;

    let sse_config = SseClientConfig {
        sse_endpoint: url.to_string().into(),
        ..Default::default()
    };
    let transport = SseClientTransport::start_with_client(client, sse_config)
        .await
        .map_err(|e| HubError::with_source(ErrorKind::Transport, "failed to open SSE stream", e))?;
    Ok(Transport::Sse(transport))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use std::collections::HashMap;

    fn base_config() -> ServerConfig {
        ServerConfig {
            transport: TransportKind::Stdio,
            command: Some("node".to_string()),
            args: vec![],
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            timeout: None,
            tls_skip_verify: false,
            enable: true,
            required: false,
        }
    }

    #[tokio::test]
    async fn stdio_missing_command_is_validation_error() {
        let mut config = base_config();
        config.command = None;
        let result = build_transport("up", &config).await;
        match result {
            Ok(_) => panic!("expected a validation error"),
            Err(e) => assert_eq!(e.kind(), ErrorKind::Validation),
        }
    }

    #[test]
    fn header_expansion_substitutes_env_vars() {
        // SAFETY: single-threaded test, no other code reads this var concurrently.
        unsafe { std::env::set_var("MCPHUB_TEST_TOKEN", "secret") };
        let mut config = base_config();
        config
            .headers
            .insert("Authorization".to_string(), "Bearer ${MCPHUB_TEST_TOKEN}".to_string());
        let headers = expand_headers(&config);
        assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer secret"));
    }
}
