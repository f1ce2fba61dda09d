//! Bidirectional mapping between wire names (`server__tool`) and camelCase
//! script identifiers (`serverTool`), §4.3.

use std::collections::HashMap;

pub const NAMESPACE_DELIMITER: &str = "__";

/// Folds a namespaced or plain wire name into a camelCase script
/// identifier: `_`/`-` are word separators, the first emitted character is
/// lower-cased, and each character immediately following a separator is
/// upper-cased if it is a letter. Leading separators are dropped.
pub fn to_camel_case(wire: &str) -> String {
    let mut out = String::with_capacity(wire.len());
    let mut at_word_start = false;
    let mut emitted_any = false;

    for ch in wire.chars() {
        if ch == '_' || ch == '-' {
            at_word_start = true;
            continue;
        }
        if at_word_start && emitted_any {
            out.extend(ch.to_uppercase());
        } else if !emitted_any {
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
        at_word_start = false;
        emitted_any = true;
    }

    out
}

pub fn is_namespaced(name: &str) -> bool {
    name.contains(NAMESPACE_DELIMITER)
}

/// Splits on the first occurrence of `__`.
pub fn parse_namespaced(name: &str) -> Option<(&str, &str)> {
    name.split_once(NAMESPACE_DELIMITER)
}

pub fn join_namespaced(server_id: &str, tool_name: &str) -> String {
    format!("{server_id}{NAMESPACE_DELIMITER}{tool_name}")
}

#[derive(Debug, thiserror::Error)]
#[error("tool names collide under camelCase folding: {0:?}")]
pub struct CollisionError(pub Vec<Vec<String>>);

/// Bijection between wire names and script names for one aggregated
/// catalog. Construction fails if two distinct wire names fold to the same
/// script name.
pub struct NameMapper {
    wire_to_script: HashMap<String, String>,
    script_to_wire: HashMap<String, String>,
}

impl NameMapper {
    pub fn build<'a>(wire_names: impl IntoIterator<Item = &'a str>) -> Result<Self, CollisionError> {
        let mut by_script: HashMap<String, Vec<String>> = HashMap::new();
        for wire in wire_names {
            let script = to_camel_case(wire);
            by_script.entry(script).or_default().push(wire.to_string());
        }

        let collisions: Vec<Vec<String>> = by_script
            .values()
            .filter(|group| group.len() > 1)
            .cloned()
            .collect();
        if !collisions.is_empty() {
            return Err(CollisionError(collisions));
        }

        let mut wire_to_script = HashMap::with_capacity(by_script.len());
        let mut script_to_wire = HashMap::with_capacity(by_script.len());
        for (script, group) in by_script {
            let wire = group.into_iter().next().unwrap_or_default();
            wire_to_script.insert(wire.clone(), script.clone());
            script_to_wire.insert(script, wire);
        }

        Ok(Self {
            wire_to_script,
            script_to_wire,
        })
    }

    pub fn to_script_name(&self, wire: &str) -> Option<&str> {
        self.wire_to_script.get(wire).map(String::as_str)
    }

    pub fn to_wire_name(&self, script: &str) -> Option<&str> {
        self.script_to_wire.get(script).map(String::as_str)
    }

    /// Resolves either form of a name, returning `(wire_name, found)`.
    pub fn resolve(&self, either: &str) -> (String, bool) {
        if let Some(wire) = self.to_wire_name(either) {
            return (wire.to_string(), true);
        }
        if self.wire_to_script.contains_key(either) {
            return (either.to_string(), true);
        }
        (either.to_string(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_underscores_and_hyphens() {
        assert_eq!(to_camel_case("github__search_repos"), "githubSearchRepos");
        assert_eq!(to_camel_case("my-tool"), "myTool");
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(to_camel_case(""), "");
    }

    #[test]
    fn drops_leading_separators() {
        assert_eq!(to_camel_case("__leading"), "leading");
    }

    #[test]
    fn round_trips_through_mapper() {
        let mapper = match NameMapper::build(["github__search_repos", "jira__create_issue"]) {
            Ok(m) => m,
            Err(e) => panic!("unexpected collision: {e}"),
        };
        let script = match mapper.to_script_name("github__search_repos") {
            Some(s) => s,
            None => panic!("expected a script name"),
        };
        assert_eq!(mapper.to_wire_name(script), Some("github__search_repos"));
    }

    #[test]
    fn detects_collision() {
        match NameMapper::build(["u__my_tool", "u__my-tool"]) {
            Ok(_) => panic!("expected a collision error"),
            Err(e) => {
                assert_eq!(e.0.len(), 1);
                assert_eq!(e.0[0].len(), 2);
            }
        }
    }

    #[test]
    fn namespaced_helpers() {
        assert!(is_namespaced("github__search"));
        assert!(!is_namespaced("list"));
        assert_eq!(parse_namespaced("github__search_repos"), Some(("github", "search_repos")));
        assert_eq!(join_namespaced("github", "search"), "github__search");
    }
}
