//! Core types for request validation.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ValidationIssue;

/// Default hint placed in the `message` field of failure responses.
pub const DEFAULT_HINT: &str = "Invalid data submitted";

/// Default maximum request body size (2 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Environment variable prefix read by [`PluginConfig::from_env`].
pub const ENV_PREFIX: &str = "ROUTE_GUARD_";

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The request input a schema applies to.
///
/// Sources are always validated in declaration order: body, query, params.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Body,
    Query,
    Params,
}

impl Source {
    /// All sources in validation order.
    pub const ALL: [Source; 3] = [Source::Body, Source::Query, Source::Params];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Body => "body",
            Source::Query => "query",
            Source::Params => "params",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the `errors` field for schema failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorFormat {
    /// Dotted path to the list of all messages for that path.
    #[default]
    Simple,
    /// The raw issue list.
    Detailed,
    /// Dotted path to the last message for that path.
    Flat,
}

impl ErrorFormat {
    /// Parse a format name. Unknown names fall back to [`ErrorFormat::Simple`].
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "detailed" => ErrorFormat::Detailed,
            "flat" => ErrorFormat::Flat,
            _ => ErrorFormat::Simple,
        }
    }
}

impl<'de> Deserialize<'de> for ErrorFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ErrorFormat::parse(&raw))
    }
}

/// Caller-supplied replacement for the built-in error formats.
///
/// Receives the raw issue list; its return value becomes `errors` verbatim.
pub type CustomFormatter = Arc<dyn Fn(&[ValidationIssue]) -> Value + Send + Sync>;

/// Registration-wide settings, captured by every route when it is registered.
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginConfig {
    /// Message placed in every failure response.
    pub hint: String,
    pub format: ErrorFormat,
    /// Emit `tracing` events around each validation.
    pub verbose: bool,
    /// Treat non-conforming schemas as absent instead of failing the request.
    pub soft: bool,
    /// Largest request body the middleware will buffer.
    pub body_limit: usize,
    #[serde(skip)]
    pub formatter: Option<CustomFormatter>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            hint: DEFAULT_HINT.to_string(),
            format: ErrorFormat::Simple,
            verbose: false,
            soft: false,
            body_limit: DEFAULT_BODY_LIMIT,
            formatter: None,
        }
    }
}

impl fmt::Debug for PluginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginConfig")
            .field("hint", &self.hint)
            .field("format", &self.format)
            .field("verbose", &self.verbose)
            .field("soft", &self.soft)
            .field("body_limit", &self.body_limit)
            .field("formatter", &self.formatter.as_ref().map(|_| "<custom>"))
            .finish()
    }
}

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `ROUTE_GUARD_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each
    /// `ROUTE_GUARD_*` name. Unparseable values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(&format!("{}{}", ENV_PREFIX, key));
        let mut config = Self::default();

        if let Some(hint) = var("HINT") {
            config.hint = hint;
        }
        if let Some(format) = var("FORMAT") {
            config.format = ErrorFormat::parse(&format);
        }
        if let Some(verbose) = var("VERBOSE").as_deref().and_then(parse_flag) {
            config.verbose = verbose;
        }
        if let Some(soft) = var("SOFT").as_deref().and_then(parse_flag) {
            config.soft = soft;
        }
        if let Some(limit) = var("BODY_LIMIT").and_then(|v| v.trim().parse().ok()) {
            config.body_limit = limit;
        }
        config
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    pub fn format(mut self, format: ErrorFormat) -> Self {
        self.format = format;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn soft(mut self, soft: bool) -> Self {
        self.soft = soft;
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Replace the built-in formats with `formatter`.
    pub fn formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&[ValidationIssue]) -> Value + Send + Sync + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn error_format_parse_falls_back_to_simple() {
        assert_eq!(ErrorFormat::parse("flat"), ErrorFormat::Flat);
        assert_eq!(ErrorFormat::parse("Detailed"), ErrorFormat::Detailed);
        assert_eq!(ErrorFormat::parse("simple"), ErrorFormat::Simple);
        assert_eq!(ErrorFormat::parse("verbose"), ErrorFormat::Simple);
        assert_eq!(ErrorFormat::parse(""), ErrorFormat::Simple);
    }

    #[test]
    fn plugin_config_defaults() {
        let config = PluginConfig::default();
        assert_eq!(config.hint, "Invalid data submitted");
        assert_eq!(config.format, ErrorFormat::Simple);
        assert!(!config.verbose);
        assert!(!config.soft);
        assert!(config.formatter.is_none());
    }

    #[test]
    fn plugin_config_deserializes_with_lenient_format() {
        let config: PluginConfig =
            serde_json::from_value(json!({ "hint": "Nope", "format": "fancy", "soft": true }))
                .unwrap();
        assert_eq!(config.hint, "Nope");
        assert_eq!(config.format, ErrorFormat::Simple);
        assert!(config.soft);
        assert_eq!(config.body_limit, DEFAULT_BODY_LIMIT);
    }

    #[test]
    fn plugin_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("ROUTE_GUARD_HINT", "Bad input"),
            ("ROUTE_GUARD_FORMAT", "flat"),
            ("ROUTE_GUARD_VERBOSE", "yes"),
            ("ROUTE_GUARD_SOFT", "maybe"),
            ("ROUTE_GUARD_BODY_LIMIT", "1024"),
        ]
        .into_iter()
        .collect();

        let config = PluginConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.hint, "Bad input");
        assert_eq!(config.format, ErrorFormat::Flat);
        assert!(config.verbose);
        // unparseable flag keeps the default
        assert!(!config.soft);
        assert_eq!(config.body_limit, 1024);
    }

    #[test]
    fn source_order_and_names() {
        let names: Vec<_> = Source::ALL.iter().map(Source::as_str).collect();
        assert_eq!(names, ["body", "query", "params"]);
    }
}
