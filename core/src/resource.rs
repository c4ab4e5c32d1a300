//! Resource definitions, nested addressing, resource state and its reducer.
//!
//! A [`ResourceDefinition`] is an immutable tree: a root resource owns its
//! nested children by name. A concrete mount point of a nested resource is a
//! [`Scope`], the list of `(child name, parent id)` segments from the root. The
//! scope determines both the endpoint the resource talks to and the subtree of
//! the root's [`ResourceState`] its results are merged into:
//!
//! ```text
//! posts                       /api/posts/
//! posts.comments  (post 7)    /api/posts/7/comments/   state: posts.comments."7"
//! ```
//!
//! All phases of every resource in one tree are reduced against the root
//! state by a single [`ResourceReducer`].

use crate::cache::{RequestCache, RequestRecord, RequestStatus};
use crate::config::TransportConfig;
use crate::effect::Effect;
use crate::entity::{EntityError, EntityId, EntityTable, DEFAULT_PRIMARY_KEY};
use crate::environment::{Clock, HttpClient};
use crate::lifecycle::{self, LifecycleAction};
use crate::operation::{malformed, MergeStrategy};
use crate::reducer::Reducer;
use crate::request::{HttpResponse, RequestError, RequestTemplate};
use serde::Serialize;
use serde_json::Value;
use smallvec::{smallvec, SmallVec};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by resource operations.
///
/// Transport failures are carried as [`ResourceError::Request`]; every other
/// variant is a usage or configuration problem detected before a call is made.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// The request failed; the failure is also recorded in state
    #[error(transparent)]
    Request(#[from] RequestError),

    /// A scope names a child the parent does not declare
    #[error("Resource `{parent}` has no nested resource `{name}`")]
    UnknownResource {
        /// Parent resource name
        parent: String,
        /// Requested child name
        name: String,
    },

    /// A custom action was invoked that the definition does not declare
    #[error("Resource `{resource}` has no action `{name}`")]
    UnknownAction {
        /// Resource name
        resource: String,
        /// Requested action name
        name: String,
    },

    /// A reusable cached response is not a list of keyed records
    #[error("Cached response for {key} is not a list of keyed records")]
    UnkeyedCachedResponse {
        /// Rendered request key
        key: String,
    },

    /// A record could not be merged
    #[error(transparent)]
    Entity(#[from] EntityError),

    /// The store refused the action
    #[error("Store error: {message}")]
    Store {
        /// Store error text
        message: String,
    },
}

/// Function form of an [`Endpoint`]; receives the ancestor ids, root first
pub type EndpointFn = Arc<dyn Fn(&[EntityId]) -> String + Send + Sync>;

/// Where a resource's collection lives.
pub enum Endpoint {
    /// Fixed URL for a root resource, or a suffix appended after the parent's
    /// endpoint and parent id for a nested one
    Static(String),
    /// URL computed from the ancestor ids
    Computed(EndpointFn),
}

impl Endpoint {
    /// Build a computed endpoint
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&[EntityId]) -> String + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }
}

impl From<&str> for Endpoint {
    fn from(url: &str) -> Self {
        Self::Static(url.to_string())
    }
}

impl From<String> for Endpoint {
    fn from(url: String) -> Self {
        Self::Static(url)
    }
}

impl Clone for Endpoint {
    fn clone(&self) -> Self {
        match self {
            Self::Static(url) => Self::Static(url.clone()),
            Self::Computed(f) => Self::Computed(Arc::clone(f)),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(url) => f.debug_tuple("Static").field(url).finish(),
            Self::Computed(_) => write!(f, "Computed(<fn>)"),
        }
    }
}

/// A named request declared on a resource, invoked with `perform`
#[derive(Debug, Clone)]
pub struct CustomAction {
    /// Request built from the call arguments
    pub template: RequestTemplate<Value>,
    /// How the response is merged; [`MergeStrategy::Replace`] by default
    pub merge: MergeStrategy,
}

impl CustomAction {
    /// Action whose response replaces the entity table
    #[must_use]
    pub const fn new(template: RequestTemplate<Value>) -> Self {
        Self {
            template,
            merge: MergeStrategy::Replace,
        }
    }

    /// Use a different merge strategy
    #[must_use]
    pub fn with_merge(mut self, merge: MergeStrategy) -> Self {
        self.merge = merge;
        self
    }
}

/// Static description of a resource and its nested resources.
///
/// # Example
///
/// ```
/// use composable_resource_core::resource::{ResourceDefinition, Scope};
///
/// let posts = ResourceDefinition::new("posts", "/api/posts/")
///     .nest(ResourceDefinition::new("comments", "/comments/"));
///
/// let scope = Scope::root().child("comments", 7);
/// assert_eq!(posts.endpoint(&scope)?, "/api/posts/7/comments/");
/// assert_eq!(scope.to_string(), "comments.7");
/// # Ok::<(), composable_resource_core::resource::ResourceError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ResourceDefinition {
    /// Name; also the key of this resource under its parent
    pub name: String,
    /// Endpoint of the collection
    pub endpoint: Endpoint,
    /// Field holding each record's id
    pub primary_key: String,
    children: BTreeMap<String, Arc<ResourceDefinition>>,
    actions: BTreeMap<String, CustomAction>,
}

impl ResourceDefinition {
    /// Define a resource with the default primary key `id`
    pub fn new(name: impl Into<String>, endpoint: impl Into<Endpoint>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            children: BTreeMap::new(),
            actions: BTreeMap::new(),
        }
    }

    /// Use a different primary-key field
    #[must_use]
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Mount `child` under this resource, keyed by its name
    #[must_use]
    pub fn nest(mut self, child: Self) -> Self {
        self.children.insert(child.name.clone(), Arc::new(child));
        self
    }

    /// Declare a custom action
    #[must_use]
    pub fn with_action(mut self, name: impl Into<String>, action: CustomAction) -> Self {
        self.actions.insert(name.into(), action);
        self
    }

    /// Nested resource called `name`
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.get(name).map(|child| &**child)
    }

    /// Names of the nested resources
    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    /// Custom action called `name`
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&CustomAction> {
        self.actions.get(name)
    }

    fn require_child(&self, name: &str) -> Result<&Self, ResourceError> {
        self.child(name).ok_or_else(|| ResourceError::UnknownResource {
            parent: self.name.clone(),
            name: name.to_string(),
        })
    }

    /// Definition of the resource mounted at `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownResource`] if a segment names a child
    /// its parent does not declare.
    pub fn resolve(&self, scope: &Scope) -> Result<&Self, ResourceError> {
        scope
            .segments()
            .iter()
            .try_fold(self, |current, segment| current.require_child(&segment.child))
    }

    /// Dot-joined definition names from the root, e.g. `posts.comments`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownResource`] for an unresolvable scope.
    pub fn qualified_name(&self, scope: &Scope) -> Result<String, ResourceError> {
        self.resolve(scope)?;
        let mut name = self.name.clone();
        for segment in scope.segments() {
            name.push('.');
            name.push_str(&segment.child);
        }
        Ok(name)
    }

    /// Endpoint of the resource mounted at `scope`.
    ///
    /// A nested [`Endpoint::Static`] suffix is relative: it is appended to the
    /// parent's endpoint followed by the parent id.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownResource`] for an unresolvable scope.
    pub fn endpoint(&self, scope: &Scope) -> Result<String, ResourceError> {
        let ids = scope.ids();
        let mut current = self;
        let mut endpoint = match &self.endpoint {
            Endpoint::Static(url) => url.clone(),
            Endpoint::Computed(f) => f(&[]),
        };
        for (depth, segment) in scope.segments().iter().enumerate() {
            let child = current.require_child(&segment.child)?;
            endpoint = match &child.endpoint {
                Endpoint::Static(suffix) => format!("{endpoint}{}{suffix}", segment.parent_id),
                Endpoint::Computed(f) => f(&ids[..=depth]),
            };
            current = child;
        }
        Ok(endpoint)
    }
}

/// One step from a parent resource into a nested one
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ScopeSegment {
    /// Child resource name
    pub child: String,
    /// Id of the parent entity
    pub parent_id: EntityId,
}

/// Mount point of a resource within its root: empty for the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Scope {
    segments: Vec<ScopeSegment>,
}

impl Scope {
    /// Scope of the root resource
    #[must_use]
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Scope of child `name` of the entity `parent_id` in this scope
    #[must_use]
    pub fn child(&self, name: impl Into<String>, parent_id: impl Into<EntityId>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(ScopeSegment {
            child: name.into(),
            parent_id: parent_id.into(),
        });
        Self { segments }
    }

    /// Segments from the root
    #[must_use]
    pub fn segments(&self) -> &[ScopeSegment] {
        &self.segments
    }

    /// Ancestor ids, root first
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.segments.iter().map(|s| s.parent_id.clone()).collect()
    }

    /// Whether this is the root scope
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// State path below the root: `[child, parent_id]` pairs flattened
    #[must_use]
    pub fn state_path(&self) -> Vec<String> {
        self.segments
            .iter()
            .flat_map(|s| [s.child.clone(), s.parent_id.to_string()])
            .collect()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.state_path().join("."))
    }
}

/// Observable state of one resource.
///
/// Nested resources appear as extra fields, one map per child name from
/// parent id to that child's complete state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceState {
    /// Some call has settled
    pub loaded: bool,
    /// The latest call has not settled
    pub loading: bool,
    /// Error of the latest failure
    pub error: Option<RequestError>,
    /// Entities by primary key
    pub data: EntityTable,
    /// Request log
    pub requests: RequestCache,
    /// Body of the last `OPTIONS` response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    /// Nested states: child name → parent id → state
    #[serde(flatten)]
    pub children: BTreeMap<String, BTreeMap<EntityId, ResourceState>>,
}

impl ResourceState {
    /// Empty state with an empty map for every nested resource
    #[must_use]
    pub fn for_definition(definition: &ResourceDefinition) -> Self {
        Self {
            children: definition
                .child_names()
                .map(|name| (name.to_string(), BTreeMap::new()))
                .collect(),
            ..Self::default()
        }
    }

    /// State of the resource at `scope`, if it has been materialized
    #[must_use]
    pub fn subtree(&self, scope: &Scope) -> Option<&Self> {
        scope.segments().iter().try_fold(self, |state, segment| {
            state.children.get(&segment.child)?.get(&segment.parent_id)
        })
    }

    /// State of the resource at `scope`, created empty on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownResource`] for an unresolvable scope.
    pub fn subtree_mut(
        &mut self,
        definition: &ResourceDefinition,
        scope: &Scope,
    ) -> Result<&mut Self, ResourceError> {
        let mut state = self;
        let mut current = definition;
        for segment in scope.segments() {
            let child = current.require_child(&segment.child)?;
            state = state
                .children
                .entry(segment.child.clone())
                .or_default()
                .entry(segment.parent_id.clone())
                .or_insert_with(|| Self::for_definition(child));
            current = child;
        }
        Ok(state)
    }

    /// JSON rendering of the whole state tree
    #[must_use]
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Fold one phase of a call into this state.
    pub fn apply(&mut self, merge: &MergeStrategy, phase: ResourcePhase, primary_key: &str) {
        match phase {
            LifecycleAction::Loading { context } => {
                self.loading = true;
                self.record(context);
            },
            LifecycleAction::Success { result, context } => {
                self.loaded = true;
                self.loading = false;
                let record = match merge.apply(self, &result.data, primary_key) {
                    Ok(()) => context,
                    Err(error) => {
                        tracing::error!(%error, key = %context.key, "Response could not be merged");
                        let error = malformed(&error);
                        self.error = Some(error.clone());
                        RequestRecord {
                            status: RequestStatus::Failure,
                            response: None,
                            error: Some(error),
                            ..context
                        }
                    },
                };
                self.record(record);
            },
            LifecycleAction::Failure { error, context } => {
                self.loaded = true;
                self.loading = false;
                self.error = Some(error);
                self.record(context);
            },
        }
    }

    fn record(&mut self, record: RequestRecord) {
        let previous = self.requests.get(&record.key);
        let merged = record.merged_over(previous);
        self.requests.insert(merged.key.clone(), merged);
    }
}

/// Lifecycle action of one resource call; the context is the phase's record
pub type ResourcePhase = LifecycleAction<RequestRecord, HttpResponse, RequestError>;

/// One phase of one call against a resource in a tree
#[derive(Debug, Clone)]
pub struct ResourceAction {
    /// Qualified resource name, e.g. `posts.comments`
    pub resource: String,
    /// Mount point within the root state
    pub scope: Scope,
    /// Operation name
    pub operation: String,
    /// Merge applied on success
    pub merge: MergeStrategy,
    /// The phase and its request record
    pub phase: ResourcePhase,
}

impl ResourceAction {
    /// Action type name, e.g. `[posts.comments][index][SUCCESS]`
    #[must_use]
    pub fn action_type(&self) -> String {
        lifecycle::action_type(&[&self.resource, &self.operation], self.phase.phase())
    }
}

/// Dependencies shared by every store of a resource tree.
///
/// `global` and `store` are the two lower transport layers; a per-call layer
/// is merged on top by [`ResourceEnvironment::transport`].
#[derive(Clone)]
pub struct ResourceEnvironment {
    /// Transport
    pub http: Arc<dyn HttpClient>,
    /// Time source for request records
    pub clock: Arc<dyn Clock>,
    /// Process-wide defaults
    pub global: TransportConfig,
    /// Defaults of this store
    pub store: TransportConfig,
}

impl ResourceEnvironment {
    /// Environment with empty transport configuration
    pub fn new(http: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            clock,
            global: TransportConfig::default(),
            store: TransportConfig::default(),
        }
    }

    /// Set the global layer
    #[must_use]
    pub fn with_global_config(mut self, config: TransportConfig) -> Self {
        self.global = config;
        self
    }

    /// Set the per-store layer
    #[must_use]
    pub fn with_store_config(mut self, config: TransportConfig) -> Self {
        self.store = config;
        self
    }

    /// Effective configuration: call > store > global
    #[must_use]
    pub fn transport(&self, call: Option<&TransportConfig>) -> TransportConfig {
        let base = self.global.merge(&self.store);
        call.map_or_else(|| base.clone(), |call| base.merge(call))
    }
}

impl fmt::Debug for ResourceEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceEnvironment")
            .field("global", &self.global)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Reducer for a whole resource tree.
///
/// Actions of nested resources are applied to their own subtree, which is
/// created on first use; sibling subtrees are left untouched.
#[derive(Debug, Clone)]
pub struct ResourceReducer {
    definition: Arc<ResourceDefinition>,
}

impl ResourceReducer {
    /// Reducer for the tree rooted at `definition`
    #[must_use]
    pub const fn new(definition: Arc<ResourceDefinition>) -> Self {
        Self { definition }
    }

    /// Root definition
    #[must_use]
    pub fn definition(&self) -> &Arc<ResourceDefinition> {
        &self.definition
    }
}

impl Reducer for ResourceReducer {
    type State = ResourceState;
    type Action = ResourceAction;
    type Environment = ResourceEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let action_type = action.action_type();
        let primary_key = match self.definition.resolve(&action.scope) {
            Ok(definition) => definition.primary_key.clone(),
            Err(error) => {
                tracing::error!(%error, action = %action_type, "Dropping action for unknown resource");
                return smallvec![Effect::None];
            },
        };
        match state.subtree_mut(&self.definition, &action.scope) {
            Ok(target) => {
                tracing::trace!(action = %action_type, scope = %action.scope, "Reducing");
                target.apply(&action.merge, action.phase, &primary_key);
            },
            Err(error) => {
                tracing::error!(%error, action = %action_type, "Dropping action for unknown resource");
            },
        }
        smallvec![Effect::None]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lifecycle::InFlight;
    use crate::request::RequestDescriptor;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    struct NoHttp;

    impl HttpClient for NoHttp {
        fn request<'a>(
            &'a self,
            _descriptor: &'a RequestDescriptor,
            _config: &'a TransportConfig,
        ) -> crate::environment::HttpFuture<'a> {
            Box::pin(async { Err(RequestError::Timeout) })
        }
    }

    fn env() -> ResourceEnvironment {
        ResourceEnvironment::new(Arc::new(NoHttp), Arc::new(crate::environment::SystemClock))
    }

    fn blog() -> ResourceDefinition {
        ResourceDefinition::new("posts", "/api/posts/").nest(
            ResourceDefinition::new("comments", "/comments/")
                .nest(ResourceDefinition::new("likes", Endpoint::computed(|ids| {
                    format!("/likes?post={}&comment={}", ids[0], ids[1])
                }))),
        )
    }

    fn action(scope: Scope, merge: MergeStrategy, phase: ResourcePhase) -> ResourceAction {
        ResourceAction {
            resource: "posts".into(),
            scope,
            operation: "index".into(),
            merge,
            phase,
        }
    }

    fn record_for(url: &str) -> RequestRecord {
        let key = RequestDescriptor::get(url).key();
        let handle = InFlight::settled(Ok(HttpResponse::ok(json!([]))));
        RequestRecord::loading(key, json!([]), handle, Utc.timestamp_opt(0, 0).single().unwrap())
    }

    fn success_for(url: &str, data: Value) -> ResourcePhase {
        let key = RequestDescriptor::get(url).key();
        let now = Utc.timestamp_opt(1, 0).single().unwrap();
        LifecycleAction::Success {
            result: HttpResponse::ok(data.clone()),
            context: RequestRecord::succeeded(key, HttpResponse::ok(data), now),
        }
    }

    #[test]
    fn nested_static_endpoint_is_relative_to_parent() {
        let posts = blog();
        assert_eq!(posts.endpoint(&Scope::root()).unwrap(), "/api/posts/");
        let comments = Scope::root().child("comments", 7);
        assert_eq!(posts.endpoint(&comments).unwrap(), "/api/posts/7/comments/");
        let likes = comments.child("likes", 3);
        assert_eq!(posts.endpoint(&likes).unwrap(), "/likes?post=7&comment=3");
        assert_eq!(posts.qualified_name(&likes).unwrap(), "posts.comments.likes");
    }

    #[test]
    fn unknown_child_is_a_configuration_error() {
        let scope = Scope::root().child("authors", 1);
        assert_eq!(
            blog().endpoint(&scope),
            Err(ResourceError::UnknownResource {
                parent: "posts".into(),
                name: "authors".into()
            })
        );
        let mut state = ResourceState::default();
        assert!(state.subtree_mut(&blog(), &scope).is_err());
        assert!(state.children.is_empty());
    }

    #[test]
    fn state_path_pairs_child_and_parent_id() {
        let scope = Scope::root().child("comments", 7).child("likes", "a");
        assert_eq!(scope.state_path(), ["comments", "7", "likes", "a"]);
        assert!(Scope::root().state_path().is_empty());
    }

    #[test]
    fn loading_then_success_merges_and_records() {
        let reducer = ResourceReducer::new(Arc::new(blog()));
        let mut state = ResourceState::for_definition(&blog());
        let url = "/api/posts/";

        reducer.reduce(
            &mut state,
            action(Scope::root(), MergeStrategy::Union, LifecycleAction::Loading {
                context: record_for(url),
            }),
            &env(),
        );
        assert!(state.loading);
        assert!(!state.loaded);

        reducer.reduce(
            &mut state,
            action(Scope::root(), MergeStrategy::Union, success_for(url, json!([{"id": 1}, {"id": 2}]))),
            &env(),
        );
        assert!(state.loaded);
        assert!(!state.loading);
        assert_eq!(state.data.len(), 2);

        let record = &state.requests[&RequestDescriptor::get(url).key()];
        assert_eq!(record.status, RequestStatus::Success);
        assert!(record.start_time.is_some());
        assert!(record.end_time.is_some());
    }

    #[test]
    fn failure_sets_error_and_keeps_data() {
        let mut state = ResourceState::default();
        state.apply(&MergeStrategy::Union, success_for("/x", json!([{"id": 1}])), "id");
        let key = RequestDescriptor::get("/x").key();
        let now = Utc.timestamp_opt(2, 0).single().unwrap();
        state.apply(
            &MergeStrategy::Union,
            LifecycleAction::Failure {
                error: RequestError::Timeout,
                context: RequestRecord::failed(key, RequestError::Timeout, now),
            },
            "id",
        );
        assert_eq!(state.error, Some(RequestError::Timeout));
        assert_eq!(state.data.len(), 1);
        assert!(state.loaded);
    }

    #[test]
    fn unmergeable_success_is_recorded_as_failure() {
        let mut state = ResourceState::default();
        state.apply(&MergeStrategy::Union, success_for("/x", json!([{"id": 1}])), "id");
        state.apply(&MergeStrategy::Union, success_for("/x", json!([{"title": "no id"}])), "id");

        assert!(matches!(state.error, Some(RequestError::MalformedPayload { .. })));
        assert_eq!(state.data.len(), 1);
        let record = &state.requests[&RequestDescriptor::get("/x").key()];
        assert_eq!(record.status, RequestStatus::Failure);
        assert!(matches!(record.error, Some(RequestError::MalformedPayload { .. })));
        // Response of the earlier success is kept
        assert_eq!(record.response, Some(HttpResponse::ok(json!([{"id": 1}]))));
    }

    #[test]
    fn nested_phase_only_touches_its_subtree() {
        let reducer = ResourceReducer::new(Arc::new(blog()));
        let mut state = ResourceState::for_definition(&blog());
        let seven = Scope::root().child("comments", 7);
        let eight = Scope::root().child("comments", 8);
        let url = "/api/posts/7/comments/";

        reducer.reduce(
            &mut state,
            action(seven.clone(), MergeStrategy::Union, success_for(url, json!([{"id": 1}]))),
            &env(),
        );
        reducer.reduce(
            &mut state,
            action(eight.clone(), MergeStrategy::Union, LifecycleAction::Loading {
                context: record_for("/api/posts/8/comments/"),
            }),
            &env(),
        );

        assert!(state.data.is_empty());
        assert!(!state.loaded);
        let comments_of_seven = state.subtree(&seven).unwrap();
        assert_eq!(comments_of_seven.data.len(), 1);
        assert!(comments_of_seven.children.contains_key("likes"));
        assert!(state.subtree(&eight).unwrap().loading);
        assert!(state.subtree(&eight).unwrap().data.is_empty());
    }

    #[test]
    fn snapshot_has_observable_shape() {
        let mut state = ResourceState::for_definition(&blog());
        state.apply(&MergeStrategy::Union, success_for("/api/posts/", json!([{"id": 1}])), "id");
        let snapshot = state.snapshot();

        assert_eq!(snapshot["loaded"], json!(true));
        assert_eq!(snapshot["error"], Value::Null);
        assert_eq!(snapshot["data"]["1"], json!({"id": 1}));
        assert_eq!(snapshot["comments"], json!({}));
        let request = &snapshot["requests"]["GET /api/posts/?{}"];
        assert_eq!(request["status"], json!("success"));
        assert!(request.get("endTime").is_some());
        assert!(request.get("error").is_none());
    }

    #[test]
    fn transport_layers_merge_with_call_on_top() {
        let env = env()
            .with_global_config(TransportConfig::default().with_base_url("https://global"))
            .with_store_config(TransportConfig::default().with_header("x", "store"));
        let call = TransportConfig::default().with_header("x", "call");
        let effective = env.transport(Some(&call));
        assert_eq!(effective.base_url.as_deref(), Some("https://global"));
        assert_eq!(effective.headers["x"], "call");
        assert_eq!(env.transport(None).headers["x"], "store");
    }
}
