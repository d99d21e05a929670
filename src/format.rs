//! Shaping schema issues into the `errors` field of a failure response.

use serde_json::{Map, Value};

use crate::error::ValidationIssue;
use crate::types::{ErrorFormat, PluginConfig};

/// Key used for issues whose path is empty.
pub const ROOT_KEY: &str = "_root";

/// Format `issues` in one of the built-in shapes.
///
/// Object keys keep the order in which paths first appear in `issues`.
pub fn format_issues(issues: &[ValidationIssue], format: ErrorFormat) -> Value {
    match format {
        ErrorFormat::Flat => {
            let mut out = Map::new();
            for issue in issues {
                out.insert(issue_key(issue), Value::String(issue.message.clone()));
            }
            Value::Object(out)
        }
        ErrorFormat::Simple => {
            let mut out = Map::new();
            for issue in issues {
                let entry = out
                    .entry(issue_key(issue))
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(messages) = entry {
                    messages.push(Value::String(issue.message.clone()));
                }
            }
            Value::Object(out)
        }
        ErrorFormat::Detailed => serde_json::to_value(issues).unwrap_or(Value::Null),
    }
}

/// Format `issues` the way `config` asks: the custom formatter when one is
/// set, otherwise the configured built-in shape.
pub fn format_with(issues: &[ValidationIssue], config: &PluginConfig) -> Value {
    match &config.formatter {
        Some(custom) => custom(issues),
        None => format_issues(issues, config.format),
    }
}

fn issue_key(issue: &ValidationIssue) -> String {
    if issue.path.is_root() {
        ROOT_KEY.to_string()
    } else {
        issue.path.dotted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::FieldPath;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn issues() -> Vec<ValidationIssue> {
        vec![
            ValidationIssue::new(FieldPath::root().key("name"), "too short"),
            ValidationIssue::new(FieldPath::root().key("tags").index(1), "not a string"),
            ValidationIssue::new(FieldPath::root().key("name"), "must start with a capital"),
            ValidationIssue::new(FieldPath::root(), "unexpected property"),
        ]
    }

    #[test]
    fn flat_keeps_last_message_per_path() {
        let out = format_issues(&issues(), ErrorFormat::Flat);
        assert_eq!(
            out,
            json!({
                "name": "must start with a capital",
                "tags.1": "not a string",
                "_root": "unexpected property"
            })
        );
    }

    #[test]
    fn simple_collects_all_messages_in_order() {
        let out = format_issues(&issues(), ErrorFormat::Simple);
        assert_eq!(
            out,
            json!({
                "name": ["too short", "must start with a capital"],
                "tags.1": ["not a string"],
                "_root": ["unexpected property"]
            })
        );
    }

    #[test]
    fn detailed_is_raw_issue_list() {
        let out = format_issues(&issues()[..2], ErrorFormat::Detailed);
        assert_eq!(
            out,
            json!([
                { "path": ["name"], "message": "too short" },
                { "path": ["tags", 1], "message": "not a string" }
            ])
        );
    }

    #[test]
    fn flat_and_simple_cover_exactly_the_distinct_paths() {
        let list = issues();
        let expected: BTreeSet<String> = list.iter().map(issue_key).collect();

        for format in [ErrorFormat::Flat, ErrorFormat::Simple] {
            let out = format_issues(&list, format);
            let keys: BTreeSet<String> = out.as_object().unwrap().keys().cloned().collect();
            assert_eq!(keys, expected);
        }
    }

    #[test]
    fn empty_issue_list() {
        assert_eq!(format_issues(&[], ErrorFormat::Simple), json!({}));
        assert_eq!(format_issues(&[], ErrorFormat::Detailed), json!([]));
    }

    #[test]
    fn custom_formatter_overrides_format() {
        let config = PluginConfig::default()
            .format(ErrorFormat::Flat)
            .formatter(|issues| json!({ "count": issues.len() }));
        assert_eq!(format_with(&issues(), &config), json!({ "count": 4 }));
    }
}
