//! Custom check functions and merging their results.
//!
//! A check runs after schema validation and reports field-level errors as a
//! [`CheckOutcome`]. Outcomes carry two maps: `fields`, nested under `errors`
//! in the response, and `promoted`, written at the top level of the response
//! body.
//!
//! On the wire a promoted key is spelled with a leading underscore
//! (`_status` surfaces as `status`); [`CheckOutcome::from_json`] accepts that
//! spelling for checks that build their result as raw JSON.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::path::FieldPath;
use crate::request::RequestData;

/// Errors reported by one check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckOutcome {
    pub promoted: Map<String, Value>,
    pub fields: Map<String, Value>,
}

impl CheckOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// An error for a single field.
    pub fn field(mut self, name: impl Into<String>, error: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), error.into());
        self
    }

    /// A value surfaced at the top level of the response body.
    pub fn promote(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.promoted.insert(name.into(), value.into());
        self
    }

    /// Split a raw JSON object using the underscore convention.
    ///
    /// Keys with a leading `_` lose exactly that one underscore and become
    /// promoted; every other key is a field error.
    pub fn from_json(raw: Map<String, Value>) -> Self {
        let mut outcome = Self::new();
        for (key, value) in raw {
            match key.strip_prefix('_') {
                Some(promoted) => {
                    outcome.promoted.insert(promoted.to_string(), value);
                }
                None => {
                    outcome.fields.insert(key, value);
                }
            }
        }
        outcome
    }

    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty() && self.fields.is_empty()
    }
}

/// Helpers handed to every check.
#[derive(Debug, Clone, Default)]
pub struct CheckContext {
    _private: (),
}

impl CheckContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The same `message` reported for every path in `paths`.
    ///
    /// Paths are normalised to dotted form (`items[0]` becomes `items.0`);
    /// a path that does not parse is used verbatim.
    pub fn multi_path_error<I, P>(&self, paths: I, message: &str) -> CheckOutcome
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut outcome = CheckOutcome::new();
        for path in paths {
            let raw = path.as_ref();
            let key = FieldPath::parse(raw)
                .map(|p| p.dotted())
                .unwrap_or_else(|_| raw.to_string());
            outcome.fields.insert(key, Value::String(message.to_string()));
        }
        outcome
    }
}

/// A custom check run after schema validation.
///
/// Checks run one at a time in declaration order and may mutate the request
/// for the benefit of later checks and the handler. Returning `None` (or an
/// empty outcome) means the check passed.
#[axum::async_trait]
pub trait Check: Send + Sync {
    async fn check(&self, req: &mut RequestData, ctx: &CheckContext) -> Option<CheckOutcome>;
}

/// Shared handle to a check.
pub type CheckHandle = Arc<dyn Check>;

/// Adapter turning a synchronous closure into a [`Check`].
pub struct FnCheck<F>(F);

#[axum::async_trait]
impl<F> Check for FnCheck<F>
where
    F: Fn(&RequestData, &CheckContext) -> Option<CheckOutcome> + Send + Sync,
{
    async fn check(&self, req: &mut RequestData, ctx: &CheckContext) -> Option<CheckOutcome> {
        (self.0)(req, ctx)
    }
}

/// Wrap a synchronous closure as a check.
pub fn check_fn<F>(f: F) -> FnCheck<F>
where
    F: Fn(&RequestData, &CheckContext) -> Option<CheckOutcome> + Send + Sync,
{
    FnCheck(f)
}

/// Merged result of every check run for one request.
///
/// Rendered on the wire by [`check_failure_body`](crate::check_failure_body).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorObject {
    pub promoted: Map<String, Value>,
    pub errors: Map<String, Value>,
}

impl ErrorObject {
    /// Fold one outcome in. Later values win on key collisions, separately
    /// for promoted keys and for field errors.
    pub fn merge(&mut self, outcome: CheckOutcome) {
        self.promoted.extend(outcome.promoted);
        self.errors.extend(outcome.fields);
    }

    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty() && self.errors.is_empty()
    }
}

/// Run `checks` sequentially against `req` and merge what they report.
///
/// An empty result means every check passed.
pub async fn run_checks(req: &mut RequestData, checks: &[CheckHandle]) -> ErrorObject {
    let ctx = CheckContext::new();
    let mut merged = ErrorObject::default();
    for check in checks {
        if let Some(outcome) = check.check(req, &ctx).await {
            merged.merge(outcome);
        }
    }
    merged
}
