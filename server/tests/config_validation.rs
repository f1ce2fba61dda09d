use mcphub_core::config::load_and_validate;
use mcphub_test_support::fixtures;

#[test]
fn single_stdio_server_loads_cleanly() {
    match load_and_validate(fixtures::SINGLE_STDIO_SERVER) {
        Ok(config) => assert_eq!(config.mcp_servers.len(), 1),
        Err(e) => panic!("unexpected error: {e}"),
    }
}

#[test]
fn required_and_optional_servers_both_load() {
    match load_and_validate(fixtures::REQUIRED_AND_OPTIONAL_SERVERS) {
        Ok(config) => {
            match (config.mcp_servers.get("primary"), config.mcp_servers.get("secondary")) {
                (Some(primary), Some(secondary)) => {
                    assert!(primary.required);
                    assert!(!secondary.required);
                }
                _ => panic!("expected both `primary` and `secondary` servers"),
            }
        }
        Err(e) => panic!("unexpected error: {e}"),
    }
}

#[test]
fn private_ip_http_server_is_rejected() {
    match load_and_validate(fixtures::PRIVATE_IP_HTTP_SERVER) {
        Ok(_) => panic!("expected a validation error for a private-IP url"),
        Err(e) => assert_eq!(e.kind(), mcphub_core::ErrorKind::Validation),
    }
}
