//! Configuration data model and validator (§3, §4.1).
//!
//! The on-disk format is JSON (`spec.md` §6), unlike the TOML cascade the
//! teacher loads for its own `.mcp.toml` projects; the validation rules
//! themselves (metacharacter blocklists, dangerous env vars, SSRF posture)
//! are ported from the same spirit as `core/src/mcp_toml.rs`'s conversion
//! checks, tightened to match §4.1 verbatim.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::{ErrorKind, HubError};

fn server_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap()
    })
}

const MAX_SERVER_NAME_LEN: usize = 255;
const MAX_COMMAND_LEN: usize = 1024;
const MAX_ARG_LEN: usize = 4096;
const MAX_ARGS: usize = 100;

const SHELL_METACHARACTERS: &[char] = &[';', '|', '&', '$', '`', '>', '<', '\n', '\r'];
const SHELL_INTERPRETER_BASENAMES: &[&str] =
    &["sh", "bash", "zsh", "ksh", "csh", "tcsh", "fish", "dash", "ash"];
const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "PATH",
    "PYTHONPATH",
    "NODE_PATH",
    "PERL5LIB",
    "RUBY_LIB",
    "CLASSPATH",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Http,
    Sse,
}

impl Default for TransportKind {
    fn default() -> Self {
        TransportKind::Stdio
    }
}

fn default_true() -> bool {
    true
}

/// One entry in `mcpServers`. Unknown JSON fields are tolerated (`serde`
/// ignores them by default) per §6's forward-compatibility note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub transport: TransportKind,

    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default, rename = "tlsSkipVerify")]
    pub tls_skip_verify: bool,

    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default)]
    pub required: bool,
}

impl ServerConfig {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(30))
    }
}

/// Top-level configuration document (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(rename = "mcpServers")]
    pub mcp_servers: HashMap<String, ServerConfig>,
    #[serde(default, rename = "builtinTools")]
    pub builtin_tools: HashMap<String, serde_json::Value>,
}

/// One validation failure, naming the offending server and rule (§4.1).
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub server: String,
    pub rule: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "server `{}`: {}", self.server, self.rule)
    }
}

/// Parses the JSON document and validates every server entry, collecting
/// every violation rather than stopping at the first (so one bad entry in
/// a large config doesn't hide the rest).
pub fn load_and_validate(raw: &str) -> Result<HubConfig, HubError> {
    let config: HubConfig = serde_json::from_str(raw)
        .map_err(|e| HubError::validation(format!("invalid config JSON: {e}")))?;

    let errors = validate(&config);
    if !errors.is_empty() {
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(HubError::new(ErrorKind::Validation, joined));
    }
    Ok(config)
}

pub fn validate(config: &HubConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.mcp_servers.is_empty() {
        errors.push(ValidationError {
            server: String::new(),
            rule: "at least one server must be defined".to_string(),
        });
    }

    for (name, server) in &config.mcp_servers {
        validate_one(name, server, &mut errors);
    }

    errors
}

fn push(errors: &mut Vec<ValidationError>, server: &str, rule: impl Into<String>) {
    errors.push(ValidationError {
        server: server.to_string(),
        rule: rule.into(),
    });
}

fn validate_one(name: &str, server: &ServerConfig, errors: &mut Vec<ValidationError>) {
    if name.len() > MAX_SERVER_NAME_LEN || !server_name_regex().is_match(name) {
        push(
            errors,
            name,
            "name must match ^[A-Za-z][A-Za-z0-9_]*$ and be <=255 chars",
        );
    }

    match server.transport {
        TransportKind::Stdio => validate_stdio(name, server, errors),
        TransportKind::Http | TransportKind::Sse => validate_http(name, server, errors),
    }
}

fn has_metacharacter(s: &str) -> bool {
    s.chars().any(|c| SHELL_METACHARACTERS.contains(&c)) || s.contains("${") || s.contains("$(")
}

fn validate_stdio(name: &str, server: &ServerConfig, errors: &mut Vec<ValidationError>) {
    if server.url.is_some() {
        push(errors, name, "stdio server must not set `url`");
    }

    let Some(command) = server.command.as_deref() else {
        push(errors, name, "stdio server requires `command`");
        return;
    };

    if command.is_empty() || command.len() > MAX_COMMAND_LEN {
        push(errors, name, "command must be non-empty and <=1024 chars");
    }
    if command.contains("..") || command.starts_with('~') || command.contains('\0') {
        push(errors, name, "command must not contain `..`, `~`, or NUL");
    }
    if has_metacharacter(command) {
        push(errors, name, "command contains a shell metacharacter");
    }
    let basename = command.rsplit(['/', '\\']).next().unwrap_or(command);
    if SHELL_INTERPRETER_BASENAMES.contains(&basename) {
        push(errors, name, "command must not be a shell interpreter");
    }

    if server.args.len() > MAX_ARGS {
        push(errors, name, "at most 100 args are allowed");
    }
    for arg in &server.args {
        if arg.len() > MAX_ARG_LEN {
            push(errors, name, "arg exceeds 4096 chars");
        }
        if arg.contains("..") || has_metacharacter(arg) {
            push(errors, name, "arg contains `..` or a shell metacharacter");
        }
    }

    for (key, value) in &server.env {
        if DANGEROUS_ENV_VARS.contains(&key.to_uppercase().as_str()) {
            push(errors, name, format!("env var `{key}` is not permitted"));
        }
        if has_metacharacter(value) || value.contains('\0') {
            push(
                errors,
                name,
                format!("env var `{key}` value contains a metacharacter or NUL"),
            );
        }
    }
}

fn validate_http(name: &str, server: &ServerConfig, errors: &mut Vec<ValidationError>) {
    if server.command.is_some() {
        push(errors, name, "http/sse server must not set `command`");
    }

    let Some(raw_url) = server.url.as_deref() else {
        push(errors, name, "http/sse server requires `url`");
        return;
    };

    match url::Url::parse(raw_url) {
        Ok(parsed) => {
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                push(errors, name, "url scheme must be http or https");
            }
            match parsed.host_str() {
                Some(host) if !host.is_empty() => {
                    if is_blocked_host(host) {
                        push(
                            errors,
                            name,
                            format!("url host `{host}` resolves to a private/link-local range"),
                        );
                    }
                }
                _ => push(errors, name, "url must have a non-empty host"),
            }
        }
        Err(_) => push(errors, name, "url does not parse"),
    }

    if let Some(timeout) = server.timeout {
        if timeout == 0 {
            push(errors, name, "timeout must be positive");
        }
    }
}

/// §4.1: "the hostnames `localhost` and loopback literals are permitted for
/// development"; all other private/link-local/loopback IP ranges are
/// rejected.
fn is_blocked_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return false;
    }
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return is_blocked_ip(ip) && !ip.is_loopback();
    }
    false
}

fn is_blocked_ip(ip: std::net::IpAddr) -> bool {
    match ip {
        std::net::IpAddr::V4(v4) => {
            v4.is_private() || v4.is_link_local() || v4.is_loopback() || v4.is_unspecified()
        }
        std::net::IpAddr::V6(v6) => {
            v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stdio(command: &str) -> ServerConfig {
        ServerConfig {
            transport: TransportKind::Stdio,
            command: Some(command.to_string()),
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

    #[test]
    fn rejects_empty_config() {
        let config = HubConfig {
            version: None,
            mcp_servers: HashMap::new(),
            builtin_tools: HashMap::new(),
        };
        let errors = validate(&config);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn accepts_valid_stdio_server() {
        let mut servers = HashMap::new();
        servers.insert("up".to_string(), stdio("node"));
        let config = HubConfig {
            version: None,
            mcp_servers: servers,
            builtin_tools: HashMap::new(),
        };
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn rejects_shell_interpreter_command() {
        let mut servers = HashMap::new();
        servers.insert("up".to_string(), stdio("bash"));
        let config = HubConfig {
            version: None,
            mcp_servers: servers,
            builtin_tools: HashMap::new(),
        };
        assert_eq!(validate(&config).len(), 1);
    }

    #[test]
    fn rejects_dangerous_env_var() {
        let mut server = stdio("node");
        server.env.insert("LD_PRELOAD".to_string(), "evil.so".to_string());
        let mut servers = HashMap::new();
        servers.insert("up".to_string(), server);
        let config = HubConfig {
            version: None,
            mcp_servers: servers,
            builtin_tools: HashMap::new(),
        };
        assert_eq!(validate(&config).len(), 1);
    }

    #[test]
    fn rejects_private_ip_url() {
        let mut servers = HashMap::new();
        servers.insert(
            "api".to_string(),
            ServerConfig {
                transport: TransportKind::Http,
                command: None,
                args: vec![],
                env: HashMap::new(),
                url: Some("http://10.0.0.5/mcp".to_string()),
                headers: HashMap::new(),
                timeout: None,
                tls_skip_verify: false,
                enable: true,
                required: false,
            },
        );
        let config = HubConfig {
            version: None,
            mcp_servers: servers,
            builtin_tools: HashMap::new(),
        };
        assert_eq!(validate(&config).len(), 1);
    }

    #[test]
    fn allows_localhost_url() {
        let mut servers = HashMap::new();
        servers.insert(
            "api".to_string(),
            ServerConfig {
                transport: TransportKind::Http,
                command: None,
                args: vec![],
                env: HashMap::new(),
                url: Some("http://localhost:8080/mcp".to_string()),
                headers: HashMap::new(),
                timeout: None,
                tls_skip_verify: false,
                enable: true,
                required: false,
            },
        );
        let config = HubConfig {
            version: None,
            mcp_servers: servers,
            builtin_tools: HashMap::new(),
        };
        assert!(validate(&config).is_empty());
    }
}
