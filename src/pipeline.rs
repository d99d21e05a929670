//! Per-request orchestration: pre-steps, schema validation, checks.
//!
//! Every step can end the request. A step ends it by handing back the
//! response to send (`ControlFlow::Break`), so exactly one response leaves
//! the pipeline and nothing runs after it. If the client goes away the
//! request future is dropped and no further step is polled.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{FromRequestParts, RawPathParams, Request, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::checks::{run_checks, CheckHandle};
use crate::error::ConfigError;
use crate::request::{request_id, RequestData};
use crate::response::{body_rejected, check_failure, schema_failure};
use crate::schema::{SchemaConfig, SchemaSlot};
use crate::types::{PluginConfig, Source};
use crate::validator::{validate_request, SchemaOutcome};

/// A step run before schema validation, typically authorization.
///
/// Returning `Break(response)` ends the request with that response; schema
/// validation and checks do not run.
#[axum::async_trait]
pub trait PreStep: Send + Sync {
    async fn run(&self, req: &mut RequestData) -> ControlFlow<Response>;
}

/// Shared handle to a pre-step.
pub type PreStepHandle = Arc<dyn PreStep>;

/// Adapter turning a synchronous closure into a [`PreStep`].
pub struct FnPreStep<F>(F);

#[axum::async_trait]
impl<F> PreStep for FnPreStep<F>
where
    F: Fn(&mut RequestData) -> ControlFlow<Response> + Send + Sync,
{
    async fn run(&self, req: &mut RequestData) -> ControlFlow<Response> {
        (self.0)(req)
    }
}

/// Wrap a synchronous closure as a pre-step.
pub fn pre_fn<F>(f: F) -> FnPreStep<F>
where
    F: Fn(&mut RequestData) -> ControlFlow<Response> + Send + Sync,
{
    FnPreStep(f)
}

/// Everything one registered route validates with. Immutable once built.
#[derive(Clone)]
pub struct RouteDescriptor {
    pub method: Method,
    pub path: String,
    pub schemas: Option<Arc<SchemaConfig>>,
    pub pre_steps: Arc<Vec<PreStepHandle>>,
    pub checks: Arc<Vec<CheckHandle>>,
    /// Configuration in effect when the route was registered.
    pub config: Arc<PluginConfig>,
}

impl RouteDescriptor {
    /// Whether the route has a schema or any checks.
    pub fn has_validation(&self) -> bool {
        self.schemas.as_deref().is_some_and(|s| !s.is_empty()) || !self.checks.is_empty()
    }

    fn parses_body(&self) -> bool {
        self.schemas
            .as_deref()
            .and_then(|s| s.slot(Source::Body))
            .is_some_and(SchemaSlot::is_conforming)
    }
}

impl std::fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("schemas", &self.schemas)
            .field("pre_steps", &self.pre_steps.len())
            .field("checks", &self.checks.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Run `route`'s pre-steps, schemas and checks over `req`, in that order.
///
/// `Continue` means the handler should run with `req` as it now stands.
///
/// # Errors
///
/// Propagates `ConfigError` from schema validation; it is never turned into
/// a 400.
pub async fn run_pipeline(
    route: &RouteDescriptor,
    req: &mut RequestData,
) -> Result<ControlFlow<Response>, ConfigError> {
    let started = Instant::now();
    let config = &route.config;

    for step in route.pre_steps.iter() {
        if let ControlFlow::Break(response) = step.run(req).await {
            return Ok(ControlFlow::Break(response));
        }
    }

    if let Some(schemas) = &route.schemas {
        if let SchemaOutcome::Invalid { issues, .. } = validate_request(req, schemas, config).await? {
            return Ok(ControlFlow::Break(schema_failure(&req.id, &issues, config)));
        }
    }

    let errors = run_checks(req, &route.checks).await;
    if !errors.is_empty() {
        if config.verbose {
            tracing::warn!(
                request_id = %req.id,
                method = %req.method,
                url = %req.uri,
                fields = errors.errors.len(),
                promoted = errors.promoted.len(),
                "checks failed"
            );
        }
        return Ok(ControlFlow::Break(check_failure(errors, config)));
    }

    if config.verbose && route.has_validation() {
        tracing::info!(
            request_id = %req.id,
            method = %req.method,
            url = %req.uri,
            checks = route.checks.len(),
            elapsed_us = micros(started.elapsed()),
            "request validated"
        );
    }

    Ok(ControlFlow::Continue(()))
}

/// Whole microseconds in `elapsed`, saturating at `u64::MAX`.
fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

/// axum middleware installed in front of every registered handler.
///
/// Buffers the body, runs the pipeline, and on success forwards the request
/// with the parsed body and a [`ValidatedRequest`](crate::ValidatedRequest)
/// extension.
pub(crate) async fn guard(
    State(route): State<Arc<RouteDescriptor>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, route.config.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let id = request_id(&parts.headers);
            if route.config.verbose {
                tracing::warn!(request_id = %id, error = %e, "request body rejected");
            }
            return body_rejected(&id, &e.to_string(), &route.config);
        }
    };

    let params = match RawPathParams::from_request_parts(&mut parts, &()).await {
        Ok(raw) => Ok(raw
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()),
        Err(e) => {
            if route.config.verbose {
                tracing::warn!(
                    method = %parts.method,
                    url = %parts.uri,
                    error = %e,
                    "path parameters could not be decoded"
                );
            }
            Err(format!("path parameters could not be decoded: {}", e.body_text()))
        }
    };

    let mut data = RequestData::from_http(&parts, &bytes, params);
    match run_pipeline(&route, &mut data).await {
        Err(e) => e.into_response(),
        Ok(ControlFlow::Break(response)) => response,
        Ok(ControlFlow::Continue(())) => {
            let body = if route.parses_body() {
                parts.headers.remove(CONTENT_LENGTH);
                match serde_json::to_vec(&data.body) {
                    Ok(encoded) => Body::from(encoded),
                    Err(_) => Body::from(bytes),
                }
            } else {
                Body::from(bytes)
            };
            parts.extensions.insert(data.into_validated());
            next.run(Request::from_parts(parts, body)).await
        }
    }
}
