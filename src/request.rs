//! Request inputs as seen by pre-steps, schemas and checks.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::types::Source;

/// Header consulted for an incoming request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The mutable view of a request that the validation pipeline works on.
///
/// `body`, `query` and `params` start as the raw decoded inputs. A schema
/// that parses successfully replaces its source with the parsed value, so
/// later pre-steps and checks observe coercions and defaults.
#[derive(Debug, Clone)]
pub struct RequestData {
    pub id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// JSON body, `null` when the request had none.
    pub body: Value,
    /// Query string as an object; repeated keys collect into an array.
    pub query: Value,
    /// Path parameters as an object of strings.
    pub params: Value,
    /// Set when the body was present but not valid JSON.
    pub(crate) body_error: Option<String>,
    /// Set when the matched path parameters could not be decoded.
    pub(crate) params_error: Option<String>,
}

impl RequestData {
    /// A request with a fresh id, no body, the query decoded from `uri` and
    /// no path parameters.
    pub fn new(method: Method, uri: Uri) -> Self {
        let query = query_object(&uri);
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            uri,
            headers: HeaderMap::new(),
            body: Value::Null,
            query,
            params: Value::Object(Map::new()),
            body_error: None,
            params_error: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Build from the parts of an HTTP request, its buffered body and the
    /// path parameters the router matched, or why they could not be decoded.
    pub(crate) fn from_http(
        parts: &Parts,
        body: &[u8],
        params: Result<Vec<(String, String)>, String>,
    ) -> Self {
        let (body, body_error) = decode_body(body);
        let (params, params_error) = match params {
            Ok(pairs) => (pairs, None),
            Err(error) => (Vec::new(), Some(error)),
        };
        let params = params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<Map<_, _>>();

        Self {
            id: request_id(&parts.headers),
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            body,
            query: query_object(&parts.uri),
            params: Value::Object(params),
            body_error,
            params_error,
        }
    }

    pub fn source(&self, source: Source) -> &Value {
        match source {
            Source::Body => &self.body,
            Source::Query => &self.query,
            Source::Params => &self.params,
        }
    }

    pub fn source_mut(&mut self, source: Source) -> &mut Value {
        match source {
            Source::Body => &mut self.body,
            Source::Query => &mut self.query,
            Source::Params => &mut self.params,
        }
    }

    /// Why the body could not be decoded, if it could not.
    pub fn body_error(&self) -> Option<&str> {
        self.body_error.as_deref()
    }

    /// Why `source` could not be decoded from the HTTP request, if it could
    /// not. A schema for that source fails with this as a root issue.
    pub fn decode_error(&self, source: Source) -> Option<&str> {
        match source {
            Source::Body => self.body_error.as_deref(),
            Source::Query => None,
            Source::Params => self.params_error.as_deref(),
        }
    }

    pub fn into_validated(self) -> ValidatedRequest {
        ValidatedRequest {
            id: self.id,
            body: self.body,
            query: self.query,
            params: self.params,
        }
    }
}

/// Parsed inputs handed to the route handler after validation passes.
///
/// Inserted into request extensions by the middleware; handlers take it as
/// an extractor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedRequest {
    pub id: String,
    pub body: Value,
    pub query: Value,
    pub params: Value,
}

impl ValidatedRequest {
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }

    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.query)
    }

    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.params)
    }
}

/// Returns 500 when the route was registered without the validation
/// middleware.
#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ValidatedRequest {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<ValidatedRequest>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "validated request missing from request context",
        ))
    }
}

/// The `x-request-id` header, or a fresh UUID when absent or not UTF-8.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Decode the query string of `uri` into an object.
///
/// Every value is a string; a key given more than once maps to an array of
/// its values in order. A malformed query string decodes as empty.
pub fn query_object(uri: &Uri) -> Value {
    let pairs = Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();

    let mut out = Map::new();
    for (key, value) in pairs {
        match out.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                out.insert(key, Value::String(value));
            }
        }
    }
    Value::Object(out)
}

fn decode_body(bytes: &[u8]) -> (Value, Option<String>) {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return (Value::Null, None);
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => (value, None),
        Err(e) => (Value::Null, Some(format!("body is not valid JSON: {}", e))),
    }
}
