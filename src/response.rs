//! Failure responses.
//!
//! Schema failures and check failures use two different envelopes; both
//! shapes are part of the external contract and are kept as they are.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::checks::ErrorObject;
use crate::error::ValidationIssue;
use crate::format::format_with;
use crate::types::PluginConfig;

/// Body sent when a schema rejects a request source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaFailureBody {
    pub request_id: String,
    pub success: bool,
    pub message: String,
    pub errors: Value,
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub timestamp: String,
}

impl SchemaFailureBody {
    pub fn new(request_id: &str, issues: &[ValidationIssue], config: &PluginConfig) -> Self {
        Self::with_errors(request_id, format_with(issues, config), config)
    }

    fn with_errors(request_id: &str, errors: Value, config: &PluginConfig) -> Self {
        Self {
            request_id: request_id.to_string(),
            success: false,
            message: config.hint.clone(),
            errors,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// 400 response for schema failures.
pub fn schema_failure(request_id: &str, issues: &[ValidationIssue], config: &PluginConfig) -> Response {
    let body = SchemaFailureBody::new(request_id, issues, config);
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// 413 response for bodies that could not be buffered, in the schema
/// failure envelope.
pub fn body_rejected(request_id: &str, reason: &str, config: &PluginConfig) -> Response {
    let body = SchemaFailureBody::with_errors(request_id, Value::String(reason.to_string()), config);
    (StatusCode::PAYLOAD_TOO_LARGE, Json(body)).into_response()
}

/// JSON body for check failures:
/// `{ statusCode, message, ...promoted, errors? }`.
///
/// Promoted keys are written after `statusCode` and `message` and replace
/// them on collision. A non-empty `errors` map is written last.
pub fn check_failure_body(errors: ErrorObject, config: &PluginConfig) -> Value {
    let mut body = Map::new();
    body.insert("statusCode".to_string(), Value::from(400));
    body.insert("message".to_string(), Value::String(config.hint.clone()));
    body.extend(errors.promoted);
    if !errors.errors.is_empty() {
        body.insert("errors".to_string(), Value::Object(errors.errors));
    }
    Value::Object(body)
}

/// 400 response for check failures.
pub fn check_failure(errors: ErrorObject, config: &PluginConfig) -> Response {
    (StatusCode::BAD_REQUEST, Json(check_failure_body(errors, config))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckOutcome;
    use crate::path::FieldPath;
    use crate::types::ErrorFormat;
    use serde_json::json;

    #[test]
    fn schema_failure_envelope() {
        let config = PluginConfig::default().format(ErrorFormat::Flat);
        let issues = [ValidationIssue::new(FieldPath::root().key("id"), "not a uuid")];
        let body = SchemaFailureBody::new("req-1", &issues, &config);

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["requestId"], "req-1");
        assert_eq!(value["success"], false);
        assert_eq!(value["message"], "Invalid data submitted");
        assert_eq!(value["errors"], json!({ "id": "not a uuid" }));
        assert!(chrono::DateTime::parse_from_rfc3339(&body.timestamp).is_ok());
        assert!(body.timestamp.ends_with('Z'));
    }

    #[test]
    fn check_failure_envelope() {
        let mut errors = ErrorObject::default();
        errors.merge(
            CheckOutcome::new()
                .promote("status", "locked")
                .field("qty", "too many"),
        );
        let config = PluginConfig::default().hint("Check failed");

        assert_eq!(
            check_failure_body(errors, &config),
            json!({
                "statusCode": 400,
                "message": "Check failed",
                "status": "locked",
                "errors": { "qty": "too many" }
            })
        );
    }

    #[test]
    fn check_failure_without_field_errors_omits_errors() {
        let mut errors = ErrorObject::default();
        errors.merge(CheckOutcome::new().promote("code", "E42"));
        let body = check_failure_body(errors, &PluginConfig::default());
        assert!(body.get("errors").is_none());
        assert_eq!(body["code"], "E42");
    }

    #[test]
    fn promoted_keys_override_envelope_fields() {
        let mut errors = ErrorObject::default();
        errors.merge(CheckOutcome::new().promote("message", "custom"));
        let body = check_failure_body(errors, &PluginConfig::default());
        assert_eq!(body["message"], "custom");
        assert_eq!(body["statusCode"], 400);
    }

    #[test]
    fn promoted_errors_key_is_written_once() {
        let mut errors = ErrorObject::default();
        errors.merge(CheckOutcome::new().promote("errors", "promoted"));
        let body = check_failure_body(errors.clone(), &PluginConfig::default());
        assert_eq!(body["errors"], "promoted");

        errors.merge(CheckOutcome::new().field("qty", "too many"));
        let body = check_failure_body(errors, &PluginConfig::default());
        let encoded = serde_json::to_string(&body).unwrap();
        assert_eq!(encoded.matches("\"errors\"").count(), 1);
        assert_eq!(body["errors"], json!({ "qty": "too many" }));
    }

    #[test]
    fn response_status_codes() {
        let response = schema_failure("r", &[], &PluginConfig::default());
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = body_rejected("r", "length limit exceeded", &PluginConfig::default());
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let mut errors = ErrorObject::default();
        errors.merge(CheckOutcome::new().field("x", "bad"));
        let response = check_failure(errors, &PluginConfig::default());
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
