//! Message and field sanitization shared by the log buffer (§4.6) and the
//! error taxonomy (§7): strip terminal control sequences, cap length, and
//! redact absolute filesystem paths before text reaches a script or an
//! inbound protocol channel.

use regex_lite::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const MESSAGE_MAX_CHARS: usize = 10_000;
const TOOL_ERROR_MAX_CHARS: usize = 100;

fn ansi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new("\x1b\\[[0-9;]*[a-zA-Z]").unwrap()
    })
}

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"(?:/[A-Za-z0-9._\-]+){2,}").unwrap()
    })
}

fn strip_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .collect()
}

fn truncate_chars(input: &str, max: usize, suffix: &str) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max).collect();
    out.push_str(suffix);
    out
}

/// Sanitizes a log/error message per §4.6: strip ANSI escapes, strip
/// control characters other than newline/tab, cap at 10 000 chars.
pub fn sanitize_message(raw: &str) -> String {
    let no_ansi = ansi_regex().replace_all(raw, "");
    let no_control = strip_control_chars(&no_ansi);
    truncate_chars(&no_control, MESSAGE_MAX_CHARS, "...")
}

/// Sanitizes a tool-call error surfaced into a script: classify upstream,
/// redact absolute paths, then cap at 100 chars (§4.6).
pub fn sanitize_tool_error(raw: &str) -> String {
    let no_ansi = ansi_regex().replace_all(raw, "");
    let no_control = strip_control_chars(&no_ansi);
    let redacted = path_regex().replace_all(&no_control, "[path]");
    truncate_chars(&redacted, TOOL_ERROR_MAX_CHARS, "...")
}

/// Recursively sanitizes keys and string values of a JSON field map, per
/// §4.6's "fields undergo the same sanitization as the message" rule.
pub fn sanitize_fields(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_message(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_fields).collect()),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(sanitize_message(k), sanitize_fields(v));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ansi_and_control() {
        let raw = "\x1b[31mred\x1b[0m text\x07bell";
        let out = sanitize_message(raw);
        assert_eq!(out, "red textbell");
    }

    #[test]
    fn keeps_newline_and_tab() {
        let raw = "line1\nline2\tindented";
        assert_eq!(sanitize_message(raw), raw);
    }

    #[test]
    fn truncates_long_messages() {
        let raw = "a".repeat(MESSAGE_MAX_CHARS + 50);
        let out = sanitize_message(&raw);
        assert_eq!(out.chars().count(), MESSAGE_MAX_CHARS + 3);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn tool_error_redacts_paths_and_truncates() {
        let raw = "open /etc/passwd/secret failed: permission denied ".to_string() + &"x".repeat(200);
        let out = sanitize_tool_error(&raw);
        assert!(out.contains("[path]"));
        assert!(out.chars().count() <= TOOL_ERROR_MAX_CHARS + 3);
    }

    #[test]
    fn sanitize_fields_recurses() {
        let value = serde_json::json!({"k\x07ey": ["\x1b[1mval\x1b[0m", 3]});
        let out = sanitize_fields(&value);
        assert_eq!(out, serde_json::json!({"key": ["val", 3]}));
    }
}
