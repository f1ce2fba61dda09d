//! `$VAR` / `${VAR}` expansion for HTTP/SSE header values (§4.2, §6).
//!
//! Ported from the byte-walking expander in `core/src/mcp_toml.rs`, but
//! diverging from it in one respect: the teacher's expander treats a
//! missing variable as an error, while §6 here specifies "missing names
//! expand to the empty string" — so this version never fails.

pub fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(close) = find_close_brace(input, i + 2) {
                let name = &input[i + 2..close];
                out.push_str(&lookup(name).unwrap_or_default());
                i = close + 1;
                continue;
            }
        } else if bytes[i] == b'$' && i + 1 < bytes.len() && is_var_start(bytes[i + 1]) {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && is_var_continue(bytes[end]) {
                end += 1;
            }
            let name = &input[start..end];
            out.push_str(&lookup(name).unwrap_or_default());
            i = end;
            continue;
        }

        // Copy one UTF-8 scalar value verbatim.
        let ch = input[i..].chars().next().unwrap_or('\u{0}');
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

fn find_close_brace(input: &str, from: usize) -> Option<usize> {
    input[from..].find('}').map(|pos| from + pos)
}

fn is_var_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_var_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Expands the `$NAME`/`${NAME}` (with optional `${NAME:-default}`) forms
/// against the process environment.
pub fn expand_from_env(input: &str) -> String {
    expand_vars(input, |name| {
        if let Some((var, default)) = name.split_once(":-") {
            std::env::var(var).ok().or_else(|| Some(default.to_string()))
        } else {
            std::env::var(name).ok()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_braced_and_bare() {
        let lookup = |name: &str| match name {
            "TOKEN" => Some("abc123".to_string()),
            _ => None,
        };
        assert_eq!(expand_vars("Bearer ${TOKEN}", lookup), "Bearer abc123");
        assert_eq!(expand_vars("Bearer $TOKEN", lookup), "Bearer abc123");
    }

    #[test]
    fn missing_var_expands_to_empty() {
        let lookup = |_: &str| None;
        assert_eq!(expand_vars("x=${MISSING}", lookup), "x=");
    }

    #[test]
    fn supports_default_fallback_syntax() {
        // SAFETY: single-threaded test, no other code reads this var concurrently.
        unsafe { std::env::remove_var("MCPHUB_TEST_UNSET_VAR") };
        let out = expand_from_env("${MCPHUB_TEST_UNSET_VAR:-fallback}");
        assert_eq!(out, "fallback");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        let lookup = |_: &str| None;
        assert_eq!(expand_vars("no vars here", lookup), "no vars here");
    }
}
