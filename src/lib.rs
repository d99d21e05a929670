//! Route Guard
//!
//! Request validation for axum routes: parse `body`, `query` and `params`
//! against per-route schemas, run custom checks, and answer with one
//! structured 400 when anything fails.
//!
//! # Example
//!
//! ```no_run
//! use route_guard::{check_fn, CheckOutcome, GuardedRouter, PluginConfig, SchemaConfig, ValidatedRequest};
//! use serde_json::json;
//!
//! async fn create_user(req: ValidatedRequest) -> String {
//!     format!("created {}", req.body["name"])
//! }
//!
//! let mut router: GuardedRouter = GuardedRouter::new(PluginConfig::default());
//! router
//!     .validate(SchemaConfig::new().body_json(json!({
//!         "type": "object",
//!         "properties": { "name": { "type": "string", "minLength": 1 } },
//!         "required": ["name"]
//!     })))
//!     .check(check_fn(|req, _ctx| {
//!         (req.body["name"] == "root")
//!             .then(|| CheckOutcome::new().field("name", "reserved"))
//!     }))
//!     .post("/users", create_user);
//!
//! let app: axum::Router = router.into_router();
//! ```
//!
//! # Order of operations
//!
//! For every request to a registered route:
//!
//! | Step | Ends the request when |
//! |------|-----------------------|
//! | pre-steps, in order | a step returns `Break(response)` |
//! | schemas: body, query, params | a source fails to parse (400) |
//! | checks, in order | the merged result is non-empty (400) |
//! | handler | |
//!
//! # Failure bodies
//!
//! Schema failures:
//! ```json
//! { "requestId": "…", "success": false, "message": "Invalid data submitted",
//!   "errors": { "id": ["…"] }, "timestamp": "2024-01-01T00:00:00.000Z" }
//! ```
//!
//! Check failures:
//! ```json
//! { "statusCode": 400, "message": "Invalid data submitted", "status": "locked",
//!   "errors": { "qty": "…" } }
//! ```

mod builder;
mod checks;
mod error;
mod format;
mod loader;
mod path;
mod pipeline;
mod request;
mod response;
mod schema;
mod types;
mod validator;

pub use builder::{AfterCheck, Bound, GuardedRouter, Initial, RouteBuilder};
pub use checks::{
    check_fn, run_checks, Check, CheckContext, CheckHandle, CheckOutcome, ErrorObject, FnCheck,
};
pub use error::{ConfigError, InvalidSchema, LoadError, PathError, ValidationIssue};
pub use format::{format_issues, format_with, ROOT_KEY};
pub use loader::{
    is_url, load_schema, load_schema_auto, load_schema_config, load_schema_str,
    navigate_fragment, schema_config_from_value,
};
pub use path::{FieldPath, PathSegment};
pub use pipeline::{pre_fn, run_pipeline, FnPreStep, PreStep, PreStepHandle, RouteDescriptor};
pub use request::{query_object, request_id, RequestData, ValidatedRequest, REQUEST_ID_HEADER};
pub use response::{
    body_rejected, check_failure, check_failure_body, schema_failure, SchemaFailureBody,
};
pub use schema::{JsonSchema, Schema, SchemaConfig, SchemaSlot};
pub use types::{
    json_type_name, CustomFormatter, ErrorFormat, PluginConfig, Source, DEFAULT_BODY_LIMIT,
    DEFAULT_HINT,
};
pub use validator::{validate_request, validate_value, SchemaOutcome};

#[cfg(feature = "remote")]
pub use loader::load_schema_url;
