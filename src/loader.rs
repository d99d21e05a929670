//! Schema loading from various sources.
//!
//! Handles loading schemas from files, strings, and HTTP URLs, and reading
//! route config files that name a schema per request source.

use std::path::Path;

use serde_json::Value;

use crate::error::LoadError;
use crate::schema::{SchemaConfig, SchemaSlot};
use crate::types::Source;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a schema from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_schema(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load a schema from a JSON string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_schema_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load a schema from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default). Uses a blocking
/// client: call it while setting up routes, not from inside a request.
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails or the response
/// isn't valid JSON.
#[cfg(feature = "remote")]
pub fn load_schema_url(url: &str) -> Result<Value, LoadError> {
    let network_error = |source| LoadError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network_error)?;

    client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.json())
        .map_err(network_error)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a schema from a file path or URL.
///
/// Automatically detects whether the source is a URL or file path.
/// URL loading requires the `remote` feature.
///
/// # Errors
///
/// Returns appropriate errors based on the source type.
pub fn load_schema_auto(source: &str) -> Result<Value, LoadError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_schema_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_schema(Path::new(source))
    }
}

/// Navigate a JSON Pointer fragment (e.g., "#/$defs/User").
///
/// Returns `None` when any step of the pointer is missing.
pub fn navigate_fragment(schema: &Value, fragment: &str) -> Option<Value> {
    let path = fragment.trim_start_matches('#').trim_start_matches('/');
    if path.is_empty() {
        return Some(schema.clone());
    }

    let mut current = schema;
    for part in path.split('/') {
        // Unescape JSON Pointer encoding (~1 = /, ~0 = ~)
        let key = part.replace("~1", "/").replace("~0", "~");
        current = match current {
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i))?,
            other => other.get(&key)?,
        };
    }
    Some(current.clone())
}

/// Load a route config file.
///
/// The file is a JSON object with optional `body`, `query` and `params`
/// keys. Each value is either an inline schema or a string naming where to
/// load one from: a URL or a path relative to the config file, optionally
/// followed by a `#/pointer` fragment. `null` means no schema.
///
/// Values that are not usable schemas are kept as
/// [`SchemaSlot::NonConforming`], so the route's `soft` setting decides what
/// happens to them.
///
/// # Errors
///
/// Returns `LoadError` if the file or a referenced schema cannot be loaded,
/// or the config has an unknown key or is not an object.
pub fn load_schema_config(path: &Path) -> Result<SchemaConfig, LoadError> {
    let raw = load_schema(path)?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    parse_schema_config(&raw, base_dir, path)
}

/// Build a [`SchemaConfig`] from an already-parsed route config value.
/// Relative schema paths resolve against `base_dir`.
///
/// # Errors
///
/// Same as [`load_schema_config`].
pub fn schema_config_from_value(raw: &Value, base_dir: &Path) -> Result<SchemaConfig, LoadError> {
    parse_schema_config(raw, base_dir, base_dir)
}

fn parse_schema_config(raw: &Value, base_dir: &Path, origin: &Path) -> Result<SchemaConfig, LoadError> {
    let invalid = |message: String| LoadError::InvalidConfig {
        path: origin.to_path_buf(),
        message,
    };

    let Value::Object(entries) = raw else {
        return Err(invalid("expected a JSON object".to_string()));
    };

    let mut config = SchemaConfig::new();
    for (key, value) in entries {
        let source = match key.as_str() {
            "body" => Source::Body,
            "query" => Source::Query,
            "params" => Source::Params,
            other => {
                return Err(invalid(format!(
                    "unknown key \"{}\": expected body, query, or params",
                    other
                )))
            }
        };

        let schema = match value {
            Value::Null => continue,
            Value::String(reference) => load_reference(reference, base_dir, &invalid)?,
            inline => inline.clone(),
        };
        config = config.with_slot(source, SchemaSlot::from_json(schema, source));
    }
    Ok(config)
}

fn load_reference(
    reference: &str,
    base_dir: &Path,
    invalid: &dyn Fn(String) -> LoadError,
) -> Result<Value, LoadError> {
    let (location, fragment) = match reference.split_once('#') {
        Some((location, fragment)) => (location, Some(fragment)),
        None => (reference, None),
    };

    let document = if is_url(location) {
        load_schema_auto(location)?
    } else {
        load_schema(&base_dir.join(location))?
    };

    match fragment {
        Some(fragment) => navigate_fragment(&document, fragment)
            .ok_or_else(|| invalid(format!("fragment not found: {}", reference))),
        None => Ok(document),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn load_schema_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type": "object"}}"#).unwrap();

        let schema = load_schema(file.path()).unwrap();
        assert_eq!(schema["type"], "object");
    }

    #[test]
    fn load_schema_file_not_found() {
        let result = load_schema(Path::new("/nonexistent/path.json"));
        assert!(matches!(result, Err(LoadError::FileNotFound { .. })));
    }

    #[test]
    fn load_schema_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid json").unwrap();

        let result = load_schema(file.path());
        assert!(matches!(result, Err(LoadError::InvalidJson { .. })));
    }

    #[test]
    fn load_schema_str_valid() {
        let schema = load_schema_str(r#"{"type": "object"}"#).unwrap();
        assert_eq!(schema["type"], "object");
    }

    #[test]
    fn load_schema_str_invalid() {
        let result = load_schema_str("not json");
        assert!(matches!(result, Err(LoadError::InvalidJson { .. })));
    }

    #[test]
    fn is_url_detection() {
        assert!(is_url("https://example.com/schema.json"));
        assert!(is_url("http://example.com/schema.json"));
        assert!(!is_url("/path/to/schema.json"));
        assert!(!is_url("./schema.json"));
        assert!(!is_url("schema.json"));
    }

    #[test]
    fn load_schema_auto_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type": "string"}}"#).unwrap();

        let schema = load_schema_auto(file.path().to_str().unwrap()).unwrap();
        assert_eq!(schema["type"], "string");
    }

    #[test]
    fn navigate_fragment_paths() {
        let doc = json!({ "$defs": { "User": { "type": "object" } }, "list": [1, 2] });
        assert_eq!(
            navigate_fragment(&doc, "#/$defs/User"),
            Some(json!({ "type": "object" }))
        );
        assert_eq!(navigate_fragment(&doc, "#/list/1"), Some(json!(2)));
        assert_eq!(navigate_fragment(&doc, "#"), Some(doc.clone()));
        assert_eq!(navigate_fragment(&doc, "#/$defs/Order"), None);
    }

    #[test]
    fn load_schema_config_inline_and_referenced() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("defs.json"),
            r#"{"$defs": {"Id": {"type": "object", "required": ["id"]}}}"#,
        )
        .unwrap();
        let config_path = dir.path().join("route.json");
        std::fs::write(
            &config_path,
            r#"{
                "body": {"type": "object"},
                "params": "defs.json#/$defs/Id",
                "query": null
            }"#,
        )
        .unwrap();

        let config = load_schema_config(&config_path).unwrap();
        assert!(config.slot(Source::Body).unwrap().is_conforming());
        assert!(config.slot(Source::Params).unwrap().is_conforming());
        assert!(config.slot(Source::Query).is_none());
    }

    #[test]
    fn load_schema_config_keeps_non_conforming_values() {
        let config = schema_config_from_value(&json!({ "body": 42 }), Path::new(".")).unwrap();
        assert!(!config.slot(Source::Body).unwrap().is_conforming());
    }

    #[test]
    fn load_schema_config_rejects_unknown_keys() {
        let result = schema_config_from_value(&json!({ "headers": {} }), Path::new("."));
        assert!(matches!(result, Err(LoadError::InvalidConfig { .. })));
    }

    #[test]
    fn load_schema_config_rejects_non_object() {
        let result = schema_config_from_value(&json!([]), Path::new("."));
        assert!(matches!(result, Err(LoadError::InvalidConfig { .. })));
    }

    #[test]
    fn load_schema_config_missing_fragment() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("defs.json"), r#"{"$defs": {}}"#).unwrap();
        let result =
            schema_config_from_value(&json!({ "body": "defs.json#/$defs/Nope" }), dir.path());
        assert!(matches!(result, Err(LoadError::InvalidConfig { .. })));
    }

    #[test]
    fn load_schema_config_missing_reference() {
        let dir = TempDir::new().unwrap();
        let result = schema_config_from_value(&json!({ "body": "missing.json" }), dir.path());
        assert!(matches!(result, Err(LoadError::FileNotFound { .. })));
    }

    #[cfg(feature = "remote")]
    mod remote {
        use super::*;

        #[test]
        fn load_schema_url_valid() {
            let mut server = mockito::Server::new();
            let mock = server
                .mock("GET", "/schemas/user.json")
                .with_header("content-type", "application/json")
                .with_body(r#"{"type": "object", "required": ["name"]}"#)
                .create();

            let schema = load_schema_url(&format!("{}/schemas/user.json", server.url())).unwrap();
            assert_eq!(schema["required"], json!(["name"]));
            mock.assert();
        }

        #[test]
        fn load_schema_url_404() {
            let mut server = mockito::Server::new();
            server.mock("GET", "/missing.json").with_status(404).create();

            let result = load_schema_url(&format!("{}/missing.json", server.url()));
            assert!(matches!(result, Err(LoadError::NetworkError { .. })));
        }

        #[test]
        fn load_schema_url_invalid_json() {
            let mut server = mockito::Server::new();
            server
                .mock("GET", "/broken.json")
                .with_body("not json")
                .create();

            let result = load_schema_url(&format!("{}/broken.json", server.url()));
            assert!(matches!(result, Err(LoadError::NetworkError { .. })));
        }

        #[test]
        fn load_schema_config_with_url_reference() {
            let mut server = mockito::Server::new();
            server
                .mock("GET", "/route.json")
                .with_body(r#"{"$defs": {"Q": {"type": "object"}}}"#)
                .create();

            let raw = json!({ "query": format!("{}/route.json#/$defs/Q", server.url()) });
            let config = schema_config_from_value(&raw, Path::new(".")).unwrap();
            assert!(config.slot(Source::Query).unwrap().is_conforming());
        }
    }
}
