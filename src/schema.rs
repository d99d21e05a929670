//! Schemas for request sources.
//!
//! [`Schema`] is the capability a route needs from a schema: parse a value,
//! returning the parsed (possibly coerced or defaulted) value or the list of
//! issues. [`JsonSchema`] provides it on top of the `jsonschema` crate.
//!
//! Values that come from outside the type system (route config files, raw
//! JSON) go through [`SchemaSlot::from_json`], which performs the
//! conformance check once at registration time and records the outcome as a
//! variant instead of failing later.

use std::fmt;
use std::sync::Arc;

use jsonschema::error::ValidationErrorKind;
use serde_json::{Number, Value};

use crate::error::{InvalidSchema, ValidationIssue};
use crate::path::FieldPath;
use crate::types::{json_type_name, Source};

/// Something that can parse one request source.
#[axum::async_trait]
pub trait Schema: Send + Sync {
    /// Parse `value`, returning the parsed value or every issue found.
    async fn parse(&self, value: Value) -> Result<Value, Vec<ValidationIssue>>;
}

/// A compiled JSON Schema with default filling and optional string coercion.
///
/// Before validation, missing object properties that declare a `default` are
/// filled in. With coercion on, string scalars are converted to the
/// `integer`, `number`, `boolean` or `null` the schema asks for, and a lone
/// value is wrapped when the schema asks for an `array`. Query strings and
/// path parameters only carry strings, so slots for those sources coerce.
pub struct JsonSchema {
    schema: Value,
    validator: jsonschema::Validator,
    coerce: bool,
}

impl JsonSchema {
    /// Compile `schema`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if `schema` is neither an object nor a
    /// boolean, or if it does not compile.
    pub fn new(schema: Value) -> Result<Self, InvalidSchema> {
        if !matches!(schema, Value::Object(_) | Value::Bool(_)) {
            return Err(InvalidSchema {
                message: format!(
                    "expected object or boolean, got {}",
                    json_type_name(&schema)
                ),
            });
        }

        let validator = jsonschema::validator_for(&schema).map_err(|e| InvalidSchema {
            message: e.to_string(),
        })?;

        Ok(Self {
            schema,
            validator,
            coerce: false,
        })
    }

    /// Enable or disable string coercion.
    pub fn coerce(mut self, coerce: bool) -> Self {
        self.coerce = coerce;
        self
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Synchronous form of [`Schema::parse`].
    pub fn parse_value(&self, mut value: Value) -> Result<Value, Vec<ValidationIssue>> {
        prepare(&self.schema, &mut value, self.coerce);

        let issues: Vec<ValidationIssue> = self
            .validator
            .iter_errors(&value)
            .map(|e| {
                let pointer = e.instance_path.to_string();
                let mut path = FieldPath::from_pointer(&pointer, &value);
                // missing properties are reported at the property itself
                if let ValidationErrorKind::Required { property } = &e.kind {
                    if let Some(name) = property.as_str() {
                        path = path.key(name);
                    }
                }
                ValidationIssue::new(path, e.to_string())
            })
            .collect();

        if issues.is_empty() {
            Ok(value)
        } else {
            Err(issues)
        }
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema")
            .field("schema", &self.schema)
            .field("coerce", &self.coerce)
            .finish()
    }
}

#[axum::async_trait]
impl Schema for JsonSchema {
    async fn parse(&self, value: Value) -> Result<Value, Vec<ValidationIssue>> {
        self.parse_value(value)
    }
}

/// Fill defaults and coerce strings, following `properties` and `items`.
fn prepare(schema: &Value, value: &mut Value, coerce: bool) {
    let Value::Object(keywords) = schema else {
        return;
    };

    if coerce {
        coerce_to_type(keywords.get("type"), value);
    }

    if let (Some(Value::Object(properties)), Value::Object(fields)) =
        (keywords.get("properties"), &mut *value)
    {
        for (name, property) in properties {
            if !fields.contains_key(name) {
                if let Some(default) = property.get("default") {
                    fields.insert(name.clone(), default.clone());
                }
            }
            if let Some(field) = fields.get_mut(name) {
                prepare(property, field, coerce);
            }
        }
    }

    if let (Some(items), Value::Array(elements)) = (keywords.get("items"), &mut *value) {
        if items.is_object() {
            for element in elements {
                prepare(items, element, coerce);
            }
        }
    }
}

fn coerce_to_type(declared: Option<&Value>, value: &mut Value) {
    let types: Vec<&str> = match declared {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => return,
    };
    if types.iter().any(|t| matches_type(t, value)) {
        return;
    }

    let converted = match value {
        Value::String(raw) => {
            let raw = raw.as_str();
            types.iter().find_map(|t| convert_string(t, raw))
        }
        _ => None,
    };
    if let Some(converted) = converted {
        *value = converted;
        return;
    }

    if types.contains(&"array") && !value.is_array() {
        let single = value.take();
        *value = Value::Array(vec![single]);
    }
}

fn matches_type(declared: &str, value: &Value) -> bool {
    match declared {
        "integer" => value.is_i64() || value.is_u64(),
        other => other == json_type_name(value),
    }
}

fn convert_string(declared: &str, raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    match declared {
        "integer" => trimmed.parse::<i64>().ok().map(Value::from),
        "number" => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        "boolean" => match trimmed {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        "null" if trimmed.is_empty() => Some(Value::Null),
        _ => None,
    }
}

/// The schema configured for one source, after the conformance check.
#[derive(Clone)]
pub enum SchemaSlot {
    Ready(Arc<dyn Schema>),
    /// The configured value could not act as a schema.
    NonConforming { reason: String },
}

impl SchemaSlot {
    pub fn new(schema: impl Schema + 'static) -> Self {
        SchemaSlot::Ready(Arc::new(schema))
    }

    /// Compile a raw JSON Schema for `source`.
    ///
    /// Coercion is enabled for `query` and `params`.
    pub fn from_json(value: Value, source: Source) -> Self {
        match JsonSchema::new(value) {
            Ok(schema) => SchemaSlot::new(schema.coerce(source != Source::Body)),
            Err(e) => SchemaSlot::NonConforming { reason: e.message },
        }
    }

    /// The usable schema, or the reason there is none.
    pub fn conformance(&self) -> Result<&Arc<dyn Schema>, &str> {
        match self {
            SchemaSlot::Ready(schema) => Ok(schema),
            SchemaSlot::NonConforming { reason } => Err(reason),
        }
    }

    pub fn is_conforming(&self) -> bool {
        matches!(self, SchemaSlot::Ready(_))
    }
}

impl fmt::Debug for SchemaSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaSlot::Ready(_) => f.write_str("Ready(..)"),
            SchemaSlot::NonConforming { reason } => f
                .debug_struct("NonConforming")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Optional schemas for `body`, `query` and `params`.
///
/// A source without a schema passes through unmodified.
#[derive(Debug, Clone, Default)]
pub struct SchemaConfig {
    body: Option<SchemaSlot>,
    query: Option<SchemaSlot>,
    params: Option<SchemaSlot>,
}

impl SchemaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(self, schema: impl Schema + 'static) -> Self {
        self.with_slot(Source::Body, SchemaSlot::new(schema))
    }

    pub fn query(self, schema: impl Schema + 'static) -> Self {
        self.with_slot(Source::Query, SchemaSlot::new(schema))
    }

    pub fn params(self, schema: impl Schema + 'static) -> Self {
        self.with_slot(Source::Params, SchemaSlot::new(schema))
    }

    pub fn body_json(self, schema: Value) -> Self {
        self.with_slot(Source::Body, SchemaSlot::from_json(schema, Source::Body))
    }

    pub fn query_json(self, schema: Value) -> Self {
        self.with_slot(Source::Query, SchemaSlot::from_json(schema, Source::Query))
    }

    pub fn params_json(self, schema: Value) -> Self {
        self.with_slot(Source::Params, SchemaSlot::from_json(schema, Source::Params))
    }

    pub fn with_slot(mut self, source: Source, slot: SchemaSlot) -> Self {
        match source {
            Source::Body => self.body = Some(slot),
            Source::Query => self.query = Some(slot),
            Source::Params => self.params = Some(slot),
        }
        self
    }

    pub fn slot(&self, source: Source) -> Option<&SchemaSlot> {
        match source {
            Source::Body => self.body.as_ref(),
            Source::Query => self.query.as_ref(),
            Source::Params => self.params.as_ref(),
        }
    }

    /// Configured slots in validation order.
    pub fn slots(&self) -> impl Iterator<Item = (Source, &SchemaSlot)> {
        Source::ALL
            .into_iter()
            .filter_map(|source| self.slot(source).map(|slot| (source, slot)))
    }

    pub fn is_empty(&self) -> bool {
        self.slots().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_schema_values() {
        let err = JsonSchema::new(json!(42)).unwrap_err();
        assert_eq!(err.message, "expected object or boolean, got number");
        assert!(JsonSchema::new(json!("string")).is_err());
        assert!(JsonSchema::new(json!(true)).is_ok());
    }

    #[test]
    fn rejects_schema_that_does_not_compile() {
        assert!(JsonSchema::new(json!({ "type": 12 })).is_err());
    }

    #[test]
    fn reports_issue_paths() {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "properties": {
                "tags": { "type": "array", "items": { "type": "string" } }
            }
        }))
        .unwrap();

        let issues = schema.parse_value(json!({ "tags": ["a", 2] })).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, FieldPath::root().key("tags").index(1));
    }

    #[test]
    fn collects_multiple_issues() {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "required": ["name", "age"]
        }))
        .unwrap();
        let issues = schema.parse_value(json!({})).unwrap_err();
        assert_eq!(issues.len(), 2);
        let paths: Vec<_> = issues.iter().map(|i| i.path.dotted()).collect();
        assert!(paths.contains(&"name".to_string()));
        assert!(paths.contains(&"age".to_string()));
    }

    #[test]
    fn missing_nested_property_is_reported_at_its_path() {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "address": {
                    "type": "object",
                    "required": ["city"]
                }
            },
            "required": ["name"]
        }))
        .unwrap();

        let issues = schema.parse_value(json!({ "address": {} })).unwrap_err();
        let paths: Vec<_> = issues.iter().map(|i| i.path.clone()).collect();
        assert!(paths.contains(&FieldPath::root().key("name")));
        assert!(paths.contains(&FieldPath::root().key("address").key("city")));

        let simple = crate::format::format_issues(&issues, crate::types::ErrorFormat::Simple);
        assert!(simple.get("name").is_some());
        assert!(simple.get("address.city").is_some());
        assert!(simple.get("_root").is_none());
    }

    #[test]
    fn fills_defaults() {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "properties": {
                "page": { "type": "integer", "default": 1 },
                "opts": {
                    "type": "object",
                    "default": {},
                    "properties": { "sort": { "type": "string", "default": "asc" } }
                }
            }
        }))
        .unwrap();

        let parsed = schema.parse_value(json!({})).unwrap();
        assert_eq!(parsed, json!({ "page": 1, "opts": { "sort": "asc" } }));
    }

    #[test]
    fn coerces_strings_when_enabled() {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "properties": {
                "page": { "type": "integer" },
                "ratio": { "type": "number" },
                "active": { "type": "boolean" },
                "ids": { "type": "array", "items": { "type": "integer" } },
                "name": { "type": "string" }
            }
        }))
        .unwrap()
        .coerce(true);

        let parsed = schema
            .parse_value(json!({
                "page": "3",
                "ratio": "0.5",
                "active": "false",
                "ids": "7",
                "name": "12"
            }))
            .unwrap();
        assert_eq!(
            parsed,
            json!({ "page": 3, "ratio": 0.5, "active": false, "ids": [7], "name": "12" })
        );
    }

    #[test]
    fn no_coercion_by_default() {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "properties": { "page": { "type": "integer" } }
        }))
        .unwrap();
        assert!(schema.parse_value(json!({ "page": "3" })).is_err());
    }

    #[test]
    fn uncoercible_string_still_fails() {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "properties": { "page": { "type": "integer" } }
        }))
        .unwrap()
        .coerce(true);
        let issues = schema.parse_value(json!({ "page": "three" })).unwrap_err();
        assert_eq!(issues[0].path, FieldPath::root().key("page"));
    }

    #[test]
    fn slot_from_json_records_non_conformance() {
        let slot = SchemaSlot::from_json(json!(42), Source::Body);
        assert!(!slot.is_conforming());
        assert!(slot.conformance().is_err());

        let slot = SchemaSlot::from_json(json!({ "type": "object" }), Source::Query);
        assert!(slot.is_conforming());
    }

    #[test]
    fn schema_config_slots_in_order() {
        let config = SchemaConfig::new()
            .params_json(json!({ "type": "object" }))
            .body_json(json!({ "type": "object" }));
        let sources: Vec<_> = config.slots().map(|(s, _)| s).collect();
        assert_eq!(sources, [Source::Body, Source::Params]);
        assert!(!config.is_empty());
        assert!(SchemaConfig::new().is_empty());
    }

    #[tokio::test]
    async fn async_parse_matches_sync() {
        let schema = JsonSchema::new(json!({ "type": "string" })).unwrap();
        assert_eq!(schema.parse(json!("x")).await, Ok(json!("x")));
        assert!(schema.parse(json!(1)).await.is_err());
    }
}
