//! HTTP transport backed by `reqwest`.
//!
//! Data of `GET`, `DELETE`, `OPTIONS` and `HEAD` requests is sent as query
//! parameters; every other method sends it as a JSON body. Non-2xx statuses
//! are rejected with [`RequestError::Status`] carrying the decoded error body.

use composable_resource_core::config::TransportConfig;
use composable_resource_core::environment::{HttpClient, HttpFuture};
use composable_resource_core::request::{HttpResponse, Method, RequestDescriptor, RequestError};
use reqwest::Client;
use serde_json::Value;

/// Production [`HttpClient`]
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Client with `reqwest` defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured `reqwest` client (proxies, TLS roots, pools)
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn execute(
        &self,
        descriptor: &RequestDescriptor,
        config: &TransportConfig,
    ) -> Result<HttpResponse, RequestError> {
        let url = config.resolve_url(&descriptor.url);
        tracing::debug!(method = %descriptor.method, %url, "Sending request");

        let mut request = self.client.request(reqwest_method(descriptor.method), &url);
        for (name, value) in &config.headers {
            request = request.header(name, value);
        }
        if let Some(timeout) = config.timeout {
            request = request.timeout(timeout);
        }
        request = if descriptor.method.sends_query() {
            request.query(&query_pairs(&descriptor.data))
        } else {
            request.json(&descriptor.data)
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let body = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            let data = serde_json::from_slice(&body)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));
            return Err(RequestError::Status {
                status: status.as_u16(),
                status_text,
                data,
            });
        }

        let data = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).map_err(|e| RequestError::Decode {
                message: e.to_string(),
            })?
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text,
            data,
        })
    }
}

impl HttpClient for ReqwestClient {
    fn request<'a>(
        &'a self,
        descriptor: &'a RequestDescriptor,
        config: &'a TransportConfig,
    ) -> HttpFuture<'a> {
        Box::pin(self.execute(descriptor, config))
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Options => reqwest::Method::OPTIONS,
        Method::Head => reqwest::Method::HEAD,
    }
}

fn transport_error(error: reqwest::Error) -> RequestError {
    if error.is_timeout() {
        RequestError::Timeout
    } else {
        RequestError::Network {
            message: error.to_string(),
        }
    }
}

/// Flatten an object into query pairs; strings are sent verbatim, other
/// values as JSON text. Anything but an object sends no query.
fn query_pairs(data: &Value) -> Vec<(String, String)> {
    let Value::Object(fields) = data else {
        return Vec::new();
    };
    fields
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| {
            let rendered = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (name.clone(), rendered)
        })
        .collect()
}
