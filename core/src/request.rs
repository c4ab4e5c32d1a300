//! Request descriptors, templates and canonical request keys.
//!
//! A [`RequestDescriptor`] is the `(method, url, data)` triple handed to the
//! transport. Its [`RequestKey`] is the identity used for deduplication and for
//! indexing [`crate::cache::RequestRecord`]s.
//!
//! # Key format
//!
//! Keys render as `"{METHOD} {url}?{json(data)}"`, e.g.
//! `GET /api/posts/?{"page":2}`. The rendering is for inspection only: equality
//! and hashing use the structured `(method, url, data)` fields, so a URL that
//! itself contains `?{` can never collide with a different url/data split.
//! Object keys inside `data` are sorted before serialization, so deep-equal
//! payloads always produce the same key regardless of construction order.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `OPTIONS`
    Options,
    /// `HEAD`
    Head,
}

impl Method {
    /// Upper-case wire name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
        }
    }

    /// Whether requests with this method carry their data in the query string.
    #[must_use]
    pub const fn sends_query(self) -> bool {
        matches!(self, Self::Get | Self::Delete | Self::Options | Self::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One network call: method, URL and JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Target URL (relative to the configured base URL, if any)
    pub url: String,
    /// HTTP method
    pub method: Method,
    /// Query (for `GET`-like methods) or body payload
    pub data: Value,
}

impl RequestDescriptor {
    /// Create a descriptor. Missing data is represented as `{}`.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            data: Value::Object(Map::new()),
        }
    }

    /// Create a `GET` descriptor
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Replace the payload. `null` is normalized to `{}`.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = if data.is_null() {
            Value::Object(Map::new())
        } else {
            data
        };
        self
    }

    /// Canonical key of this descriptor
    #[must_use]
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self)
    }
}

/// Canonical identity of a [`RequestDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
    method: Method,
    url: String,
    data: String,
}

impl RequestKey {
    /// Compute the key of `descriptor`. Pure and total.
    #[must_use]
    pub fn new(descriptor: &RequestDescriptor) -> Self {
        Self {
            method: descriptor.method,
            url: descriptor.url.clone(),
            data: canonical_json(&descriptor.data),
        }
    }

    /// Method component
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// URL component
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Canonical JSON of the payload component
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}?{}", self.method, self.url, self.data)
    }
}

impl Serialize for RequestKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Serialize `value` with object keys sorted at every depth.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (idx, (key, item)) in entries.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        },
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        },
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Function form of a [`RequestTemplate`]
pub type RequestFn<Args> = Arc<dyn Fn(&Args) -> RequestDescriptor + Send + Sync>;

/// Source of a [`RequestDescriptor`] for a call: a fixed record, or a
/// function of the call arguments.
pub enum RequestTemplate<Args> {
    /// Same descriptor on every call
    Static(RequestDescriptor),
    /// Descriptor computed from the call arguments
    Computed(RequestFn<Args>),
}

impl<Args> RequestTemplate<Args> {
    /// Build a computed template
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Args) -> RequestDescriptor + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    /// Produce the descriptor for one call.
    #[must_use]
    pub fn resolve(&self, args: &Args) -> RequestDescriptor {
        match self {
            Self::Static(descriptor) => descriptor.clone(),
            Self::Computed(f) => f(args),
        }
    }
}

impl<Args> Clone for RequestTemplate<Args> {
    fn clone(&self) -> Self {
        match self {
            Self::Static(descriptor) => Self::Static(descriptor.clone()),
            Self::Computed(f) => Self::Computed(Arc::clone(f)),
        }
    }
}

impl<Args> fmt::Debug for RequestTemplate<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(descriptor) => f.debug_tuple("Static").field(descriptor).finish(),
            Self::Computed(_) => write!(f, "Computed(<fn>)"),
        }
    }
}

/// Response returned by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Reason phrase
    pub status_text: String,
    /// Decoded JSON body (`null` when empty)
    pub data: Value,
}

impl HttpResponse {
    /// A `200 OK` response with `data`
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            data,
        }
    }
}

/// Failure of one request. Stored in state and handed back to callers as data.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestError {
    /// The request never produced a response
    #[error("Network error: {message}")]
    Network {
        /// Transport error text
        message: String,
    },

    /// The server answered with a non-2xx status
    #[error("Request failed with status {status} {status_text}")]
    Status {
        /// Status code
        status: u16,
        /// Reason phrase
        status_text: String,
        /// Decoded error body, if any
        data: Value,
    },

    /// The transport gave up waiting
    #[error("Request timed out")]
    Timeout,

    /// The body could not be decoded
    #[error("Failed to decode response: {message}")]
    Decode {
        /// Decoder error text
        message: String,
    },

    /// The body decoded but does not have the shape the operation merges
    #[error("Malformed payload: {message}")]
    MalformedPayload {
        /// What was wrong with the payload
        message: String,
    },
}
