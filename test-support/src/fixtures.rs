//! Canned config documents used across integration tests (§8's concrete
//! end-to-end scenarios).

/// One stdio server, enabled and required.
pub const SINGLE_STDIO_SERVER: &str = r#"{
  "version": 1,
  "mcpServers": {
    "demo": {
      "transport": "stdio",
      "command": "node",
      "args": ["server.js"],
      "required": true
    }
  }
}"#;

/// Two servers: one required, one optional — exercises the startup policy
/// where an optional failure does not abort the hub.
pub const REQUIRED_AND_OPTIONAL_SERVERS: &str = r#"{
  "version": 1,
  "mcpServers": {
    "primary": {
      "transport": "stdio",
      "command": "node",
      "args": ["primary.js"],
      "required": true
    },
    "secondary": {
      "transport": "stdio",
      "command": "node",
      "args": ["secondary.js"],
      "required": false
    }
  }
}"#;

/// A config whose HTTP server URL points at a private address, used to
/// exercise the SSRF validation rule.
pub const PRIVATE_IP_HTTP_SERVER: &str = r#"{
  "version": 1,
  "mcpServers": {
    "internal": {
      "transport": "http",
      "url": "http://10.0.0.5/mcp"
    }
  }
}"#;
