//! # Composable Resource Testing
//!
//! Testing utilities for composable resource stores.
//!
//! This crate provides:
//! - Mock implementations of Environment traits ([`FixedClock`], [`MockHttpClient`])
//! - A Given-When-Then harness for reducers ([`ReducerTest`])
//! - proptest strategies for keyed records
//! - Tracing setup for tests
//!
//! ## Example
//!
//! ```ignore
//! use composable_resource_testing::{test_environment, MockHttpClient};
//!
//! #[tokio::test]
//! async fn index_merges_records() {
//!     let http = Arc::new(MockHttpClient::new().with_response(Method::Get, "/api/posts/", json!([{"id": 1}])));
//!     let posts = ResourceStore::new(ResourceDefinition::new("posts", "/api/posts/"), test_environment(http.clone()));
//!
//!     posts.index(json!({})).await.unwrap();
//!     assert_eq!(posts.state().await.data.len(), 1);
//!     assert_eq!(http.call_count(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use composable_resource_core::environment::{Clock, HttpClient};
use composable_resource_core::resource::ResourceEnvironment;
use std::sync::Arc;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use composable_resource_core::config::TransportConfig;
    use composable_resource_core::environment::{HttpClient, HttpFuture};
    use composable_resource_core::request::{
        HttpResponse, Method, RequestDescriptor, RequestError,
    };
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use composable_resource_testing::mocks::FixedClock;
    /// use composable_resource_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// One request seen by [`MockHttpClient`]
    #[derive(Debug, Clone, PartialEq)]
    pub struct MockCall {
        /// The request as issued
        pub descriptor: RequestDescriptor,
        /// Effective transport configuration of the call
        pub config: TransportConfig,
    }

    type Route = (Method, String);

    /// Stubbed transport with canned outcomes per `(method, url)`.
    ///
    /// Every call is logged before the optional latency elapses, so a test
    /// can observe a call that is still in flight. Unrouted requests fail
    /// with `404 Not Found`.
    ///
    /// # Example
    ///
    /// ```
    /// use composable_resource_testing::mocks::MockHttpClient;
    /// use composable_resource_core::request::Method;
    /// use serde_json::json;
    ///
    /// let http = MockHttpClient::new().with_response(Method::Get, "/api/posts/", json!([]));
    /// assert_eq!(http.call_count(), 0);
    /// ```
    #[derive(Debug, Default)]
    pub struct MockHttpClient {
        routes: Mutex<HashMap<Route, Result<HttpResponse, RequestError>>>,
        latency: Option<Duration>,
        calls: Mutex<Vec<MockCall>>,
    }

    impl MockHttpClient {
        /// Client with no routes
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Delay every response by `latency`
        #[must_use]
        pub const fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        /// Answer `method url` with `200 OK` and `data`
        #[must_use]
        pub fn with_response(self, method: Method, url: impl Into<String>, data: Value) -> Self {
            self.respond(method, url, data);
            self
        }

        /// Fail `method url` with `error`
        #[must_use]
        pub fn with_failure(self, method: Method, url: impl Into<String>, error: RequestError) -> Self {
            self.fail(method, url, error);
            self
        }

        /// Answer `method url` with `200 OK` and `data` from now on
        pub fn respond(&self, method: Method, url: impl Into<String>, data: Value) {
            self.route(method, url.into(), Ok(HttpResponse::ok(data)));
        }

        /// Fail `method url` with `error` from now on
        pub fn fail(&self, method: Method, url: impl Into<String>, error: RequestError) {
            self.route(method, url.into(), Err(error));
        }

        fn route(&self, method: Method, url: String, outcome: Result<HttpResponse, RequestError>) {
            self.routes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert((method, url), outcome);
        }

        /// Every call so far, in order
        #[must_use]
        pub fn calls(&self) -> Vec<MockCall> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        /// Number of calls so far
        #[must_use]
        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Number of calls to `method url`
        #[must_use]
        pub fn calls_to(&self, method: Method, url: &str) -> usize {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|call| call.descriptor.method == method && call.descriptor.url == url)
                .count()
        }

        fn outcome(&self, descriptor: &RequestDescriptor) -> Result<HttpResponse, RequestError> {
            self.routes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&(descriptor.method, descriptor.url.clone()))
                .cloned()
                .unwrap_or_else(|| {
                    Err(RequestError::Status {
                        status: 404,
                        status_text: "Not Found".to_string(),
                        data: Value::Null,
                    })
                })
        }
    }

    impl HttpClient for MockHttpClient {
        fn request<'a>(
            &'a self,
            descriptor: &'a RequestDescriptor,
            config: &'a TransportConfig,
        ) -> HttpFuture<'a> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(MockCall {
                    descriptor: descriptor.clone(),
                    config: config.clone(),
                });
            Box::pin(async move {
                if let Some(latency) = self.latency {
                    tokio::time::sleep(latency).await;
                }
                self.outcome(descriptor)
            })
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use serde_json::{json, Value};

    /// Scalar JSON values
    pub fn json_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ]
    }

    /// A record `{ <primary_key>: id, "title": .., "rank": .. }` with an id
    /// drawn from `0..max_id`
    pub fn keyed_record(primary_key: &'static str, max_id: u32) -> impl Strategy<Value = Value> {
        (0..max_id, "[a-z ]{0,12}", json_scalar()).prop_map(move |(id, title, rank)| {
            json!({ primary_key: id, "title": title, "rank": rank })
        })
    }

    /// Up to `len` keyed records; ids may repeat
    pub fn keyed_records(
        primary_key: &'static str,
        max_id: u32,
        len: usize,
    ) -> impl Strategy<Value = Vec<Value>> {
        prop::collection::vec(keyed_record(primary_key, max_id), 0..=len)
    }
}


// Re-export commonly used items
pub use mocks::{test_clock, FixedClock, MockCall, MockHttpClient};
pub use reducer_test::{assertions, ReducerTest};

/// Resource environment over `http` with the [`test_clock`]
#[must_use]
pub fn test_environment(http: Arc<dyn HttpClient>) -> ResourceEnvironment {
    let clock: Arc<dyn Clock> = Arc::new(test_clock());
    ResourceEnvironment::new(http, clock)
}

/// Install a `tracing` subscriber honoring `RUST_LOG`; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use composable_resource_core::config::TransportConfig;
    use composable_resource_core::request::{Method, RequestDescriptor, RequestError};
    use serde_json::json;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn mock_answers_routes_and_logs_calls() {
        let http = MockHttpClient::new().with_response(Method::Get, "/posts/", json!([{"id": 1}]));
        let config = TransportConfig::default().with_header("x-trace", "1");
        let descriptor = RequestDescriptor::get("/posts/");

        let response = tokio_test::block_on(http.request(&descriptor, &config)).unwrap();

        assert_eq!(response.data, json!([{"id": 1}]));
        assert_eq!(http.call_count(), 1);
        assert_eq!(http.calls()[0].config.headers["x-trace"], "1");
        assert_eq!(http.calls_to(Method::Get, "/posts/"), 1);
    }

    #[test]
    fn mock_rejects_unrouted_and_failing_requests() {
        let http = MockHttpClient::new().with_failure(Method::Delete, "/posts/1", RequestError::Timeout);
        let config = TransportConfig::default();

        let missing = RequestDescriptor::get("/nope");
        let error = tokio_test::block_on(http.request(&missing, &config)).unwrap_err();
        assert!(matches!(error, RequestError::Status { status: 404, .. }));

        let delete = RequestDescriptor::new(Method::Delete, "/posts/1");
        let error = tokio_test::block_on(http.request(&delete, &config)).unwrap_err();
        assert_eq!(error, RequestError::Timeout);
    }
}
