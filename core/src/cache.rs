//! Request records and the read-deduplication policy.
//!
//! Every call a resource store makes leaves a [`RequestRecord`] in its
//! [`RequestCache`], keyed by [`RequestKey`]. Each lifecycle phase produces a
//! partial record that is shallow-merged over the previous one, so
//! `start_time` survives the terminal phase and `response` survives a later
//! failure.
//!
//! Reads consult the cache through [`lookup`] before issuing a call:
//!
//! | previous status | [`ReadPolicy::ReuseSuccess`] | [`ReadPolicy::PendingOnly`] |
//! |-----------------|------------------------------|-----------------------------|
//! | absent          | miss                         | miss                        |
//! | loading         | await in-flight              | await in-flight             |
//! | success         | re-derive from entity table  | miss                        |
//! | failure         | miss                         | miss                        |

use crate::entity::{EntityId, EntityTable};
use crate::lifecycle::InFlight;
use crate::request::{HttpResponse, RequestError, RequestKey};
use crate::resource::ResourceError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Status of one recorded request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Issued and not settled
    Loading,
    /// Fulfilled
    Success,
    /// Rejected
    Failure,
}

/// Shared handle to a transport call
pub type ResponseHandle = InFlight<HttpResponse, RequestError>;

/// What a store remembers about one request key.
///
/// Optional fields are "unset" in a phase record and are filled from the
/// previous record by [`RequestRecord::merged_over`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    /// Key of the request
    #[serde(skip)]
    pub key: RequestKey,
    /// Latest phase
    pub status: RequestStatus,
    /// Call arguments as a JSON list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    /// When the request was issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the request settled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// The running call, awaited by duplicate reads
    #[serde(skip)]
    pub in_flight: Option<ResponseHandle>,
    /// Response of the last success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<HttpResponse>,
    /// Error of the last failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RequestError>,
}

impl RequestRecord {
    fn empty(key: RequestKey, status: RequestStatus) -> Self {
        Self {
            key,
            status,
            args: None,
            start_time: None,
            end_time: None,
            in_flight: None,
            response: None,
            error: None,
        }
    }

    /// Record of a request that has just been issued
    #[must_use]
    pub fn loading(
        key: RequestKey,
        args: Value,
        in_flight: ResponseHandle,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            args: Some(args),
            start_time: Some(now),
            in_flight: Some(in_flight),
            ..Self::empty(key, RequestStatus::Loading)
        }
    }

    /// Record of a fulfilled request
    #[must_use]
    pub fn succeeded(key: RequestKey, response: HttpResponse, now: DateTime<Utc>) -> Self {
        Self {
            end_time: Some(now),
            response: Some(response),
            ..Self::empty(key, RequestStatus::Success)
        }
    }

    /// Record of a rejected request
    #[must_use]
    pub fn failed(key: RequestKey, error: RequestError, now: DateTime<Utc>) -> Self {
        Self {
            end_time: Some(now),
            error: Some(error),
            ..Self::empty(key, RequestStatus::Failure)
        }
    }

    /// Shallow-merge `self` over `previous`: fields set here win, unset fields
    /// are taken from `previous`.
    #[must_use]
    pub fn merged_over(self, previous: Option<&Self>) -> Self {
        let Some(previous) = previous else {
            return self;
        };
        Self {
            key: self.key,
            status: self.status,
            args: self.args.or_else(|| previous.args.clone()),
            start_time: self.start_time.or(previous.start_time),
            end_time: self.end_time.or(previous.end_time),
            in_flight: self.in_flight.or_else(|| previous.in_flight.clone()),
            response: self.response.or_else(|| previous.response.clone()),
            error: self.error.or_else(|| previous.error.clone()),
        }
    }
}

/// Per-store request log
pub type RequestCache = BTreeMap<RequestKey, RequestRecord>;

/// Which previous outcomes a read may reuse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPolicy {
    /// Reuse a running call or a previous success
    ReuseSuccess,
    /// Reuse a running call only
    PendingOnly,
}

/// Result of consulting the cache for one read
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// Nothing reusable; issue a call
    Miss,
    /// An identical call is running; await it
    Pending(ResponseHandle),
    /// Answer synthesized from current state
    Fresh(HttpResponse),
}

impl CacheLookup {
    /// Label used for cache metrics and logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Miss => "miss",
            Self::Pending(_) => "pending",
            Self::Fresh(_) => "fresh",
        }
    }
}

/// Decide how a read of `key` should be answered.
///
/// A reusable success is not returned verbatim: the ids of its records are
/// looked up in the *current* `data`, so later updates are visible and
/// entities deleted since are omitted.
///
/// # Errors
///
/// Returns [`ResourceError::UnkeyedCachedResponse`] if a reusable success did
/// not return a list of records carrying `primary_key`.
pub fn lookup(
    requests: &RequestCache,
    data: &EntityTable,
    key: &RequestKey,
    policy: ReadPolicy,
    primary_key: &str,
) -> Result<CacheLookup, ResourceError> {
    let Some(record) = requests.get(key) else {
        return Ok(CacheLookup::Miss);
    };

    match (record.status, policy) {
        (RequestStatus::Loading, _) => Ok(record
            .in_flight
            .clone()
            .map_or(CacheLookup::Miss, CacheLookup::Pending)),
        (RequestStatus::Success, ReadPolicy::ReuseSuccess) => {
            let cached = record.response.as_ref().map_or(&Value::Null, |r| &r.data);
            let ids = cached_ids(cached, primary_key).ok_or_else(|| {
                ResourceError::UnkeyedCachedResponse {
                    key: key.to_string(),
                }
            })?;
            let current = ids.iter().filter_map(|id| data.get(id)).cloned().collect();
            Ok(CacheLookup::Fresh(HttpResponse::ok(Value::Array(current))))
        },
        _ => Ok(CacheLookup::Miss),
    }
}

fn cached_ids(payload: &Value, primary_key: &str) -> Option<Vec<EntityId>> {
    payload
        .as_array()?
        .iter()
        .map(|record| EntityId::of(record, primary_key).ok())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entity::union_by_id;
    use crate::request::RequestDescriptor;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn key() -> RequestKey {
        RequestDescriptor::get("/api/posts/").key()
    }

    fn cache_with(record: RequestRecord) -> RequestCache {
        let mut cache = RequestCache::new();
        cache.insert(record.key.clone(), record);
        cache
    }

    #[test]
    fn terminal_record_keeps_start_time_and_args() {
        let handle = InFlight::settled(Ok(HttpResponse::ok(json!([]))));
        let loading = RequestRecord::loading(key(), json!([{}]), handle, at(1));
        let done = RequestRecord::succeeded(key(), HttpResponse::ok(json!([])), at(2))
            .merged_over(Some(&loading));

        assert_eq!(done.status, RequestStatus::Success);
        assert_eq!(done.start_time, Some(at(1)));
        assert_eq!(done.end_time, Some(at(2)));
        assert_eq!(done.args, Some(json!([{}])));
    }

    #[test]
    fn failure_keeps_previous_response() {
        let ok = RequestRecord::succeeded(key(), HttpResponse::ok(json!([1])), at(1));
        let failed = RequestRecord::failed(key(), RequestError::Timeout, at(2)).merged_over(Some(&ok));
        assert_eq!(failed.status, RequestStatus::Failure);
        assert_eq!(failed.response, Some(HttpResponse::ok(json!([1]))));
        assert_eq!(failed.error, Some(RequestError::Timeout));
    }

    #[test]
    fn absent_or_failed_is_a_miss() {
        let table = EntityTable::new();
        let result = lookup(&RequestCache::new(), &table, &key(), ReadPolicy::ReuseSuccess, "id");
        assert!(matches!(result, Ok(CacheLookup::Miss)));

        let cache = cache_with(RequestRecord::failed(key(), RequestError::Timeout, at(1)));
        let result = lookup(&cache, &table, &key(), ReadPolicy::ReuseSuccess, "id");
        assert!(matches!(result, Ok(CacheLookup::Miss)));
    }

    #[test]
    fn loading_returns_the_running_call() {
        let handle = InFlight::settled(Ok(HttpResponse::ok(json!([]))));
        let cache = cache_with(RequestRecord::loading(key(), json!([]), handle, at(1)));
        let result = lookup(&cache, &EntityTable::new(), &key(), ReadPolicy::PendingOnly, "id");
        assert!(matches!(result, Ok(CacheLookup::Pending(_))));
    }

    #[test]
    fn success_is_rederived_from_current_table() {
        let cached = HttpResponse::ok(json!([{"id": 1, "v": "old"}, {"id": 2}]));
        let cache = cache_with(RequestRecord::succeeded(key(), cached, at(1)));
        let table = union_by_id(&EntityTable::new(), &[json!({"id": 1, "v": "new"})], "id").unwrap();

        match lookup(&cache, &table, &key(), ReadPolicy::ReuseSuccess, "id").unwrap() {
            CacheLookup::Fresh(response) => {
                assert_eq!(response.status, 200);
                assert_eq!(response.data, json!([{"id": 1, "v": "new"}]));
            },
            other => unreachable!("expected fresh, got {}", other.kind()),
        }
    }

    #[test]
    fn success_is_ignored_when_only_pending_is_reusable() {
        let cache = cache_with(RequestRecord::succeeded(key(), HttpResponse::ok(json!([])), at(1)));
        let result = lookup(&cache, &EntityTable::new(), &key(), ReadPolicy::PendingOnly, "id");
        assert!(matches!(result, Ok(CacheLookup::Miss)));
    }

    #[test]
    fn unkeyed_cached_response_is_reported() {
        let cache = cache_with(RequestRecord::succeeded(key(), HttpResponse::ok(json!({"id": 1})), at(1)));
        let result = lookup(&cache, &EntityTable::new(), &key(), ReadPolicy::ReuseSuccess, "id");
        assert!(matches!(result, Err(ResourceError::UnkeyedCachedResponse { .. })));
    }
}
