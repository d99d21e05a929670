//! Schema validation of request sources.

use serde_json::Value;

use crate::error::{ConfigError, ValidationIssue};
use crate::path::FieldPath;
use crate::request::RequestData;
use crate::schema::SchemaConfig;
use crate::types::{PluginConfig, Source};

/// Result of running a route's schemas over a request.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaOutcome {
    /// Every configured source parsed; the request now holds parsed values.
    Valid,
    /// `source` failed to parse. Sources after it were not attempted.
    Invalid {
        source: Source,
        issues: Vec<ValidationIssue>,
    },
}

impl SchemaOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, SchemaOutcome::Valid)
    }
}

/// Validate `req` against `schemas`, replacing each source with its parsed
/// value as it succeeds.
///
/// Sources are handled in order body, query, params; the first failure
/// stops the run and leaves that source untouched. Issues are never
/// aggregated across sources.
///
/// # Errors
///
/// Returns `ConfigError` when a configured slot is not a usable schema and
/// `config.soft` is off. With `soft` on, such a slot is skipped.
pub async fn validate_request(
    req: &mut RequestData,
    schemas: &SchemaConfig,
    config: &PluginConfig,
) -> Result<SchemaOutcome, ConfigError> {
    if config.verbose {
        tracing::info!(
            request_id = %req.id,
            method = %req.method,
            url = %req.uri,
            "validating request"
        );
    }

    for (source, slot) in schemas.slots() {
        let schema = match slot.conformance() {
            Ok(schema) => schema,
            Err(reason) if config.soft => {
                tracing::debug!(source = %source, reason, "skipping non-conforming schema");
                continue;
            }
            Err(reason) => {
                return Err(ConfigError::NonConformingSchema {
                    slot: source,
                    reason: reason.to_string(),
                })
            }
        };

        let parsed = match req.decode_error(source) {
            Some(error) => Err(vec![ValidationIssue::new(FieldPath::root(), error)]),
            None => schema.parse(req.source(source).clone()).await,
        };

        match parsed {
            Ok(value) => *req.source_mut(source) = value,
            Err(issues) => {
                if config.verbose {
                    tracing::warn!(
                        request_id = %req.id,
                        method = %req.method,
                        url = %req.uri,
                        source = %source,
                        issues = issues.len(),
                        "schema validation failed"
                    );
                }
                return Ok(SchemaOutcome::Invalid { source, issues });
            }
        }
    }

    Ok(SchemaOutcome::Valid)
}

/// Validate a single value against `schemas` for `source`, outside a
/// request. Missing slots pass the value through.
///
/// # Errors
///
/// Same as [`validate_request`].
pub async fn validate_value(
    value: Value,
    source: Source,
    schemas: &SchemaConfig,
    config: &PluginConfig,
) -> Result<Result<Value, Vec<ValidationIssue>>, ConfigError> {
    let Some(slot) = schemas.slot(source) else {
        return Ok(Ok(value));
    };
    match slot.conformance() {
        Ok(schema) => Ok(schema.parse(value).await),
        Err(_) if config.soft => Ok(Ok(value)),
        Err(reason) => Err(ConfigError::NonConformingSchema {
            slot: source,
            reason: reason.to_string(),
        }),
    }
}
