//! Resource stores: the bound entry points of every resource operation.
//!
//! A [`ResourceStore`] wraps one [`Store`] per resource tree. Nested resources
//! are views of the same store at a different [`Scope`]; they share its state,
//! its action broadcast and its admission lock.
//!
//! A read consults the request cache and, on a miss, dispatches the loading
//! phase while holding the admission lock, so two back-to-back reads of the
//! same key produce a single transport call.

use crate::metrics::ResourceMetrics;
use crate::{Store, StoreConfig, StoreError};
use composable_resource_core::cache::{self, CacheLookup, ReadPolicy, RequestRecord, ResponseHandle};
use composable_resource_core::config::TransportConfig;
use composable_resource_core::entity::EntityId;
use composable_resource_core::environment::Clock;
use composable_resource_core::lifecycle::LifecycleHooks;
use composable_resource_core::operation::{malformed, Operation, OperationPlan};
use composable_resource_core::request::{HttpResponse, RequestError, RequestKey};
use composable_resource_core::resource::{
    ResourceAction, ResourceDefinition, ResourceEnvironment, ResourceError, ResourcePhase,
    ResourceReducer, ResourceState, Scope,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};

/// Store running a whole resource tree
pub type ResourceRuntime = Store<ResourceState, ResourceAction, ResourceEnvironment, ResourceReducer>;

type RecordHooks = LifecycleHooks<Value, HttpResponse, RequestError, RequestRecord>;

/// Async handle on one resource, root or nested.
///
/// Every operation resolves to the response on success and to
/// [`ResourceError::Request`] on failure; in both cases the outcome has
/// already been merged into state when the future completes.
///
/// # Example
///
/// ```ignore
/// let posts = ResourceStore::new(
///     ResourceDefinition::new("posts", "/api/posts/")
///         .nest(ResourceDefinition::new("comments", "/comments/")),
///     env,
/// );
///
/// posts.index(json!({})).await?;
/// let comments = posts.nested("comments", 7)?;
/// comments.create(json!({"body": "first"})).await?;
/// ```
#[derive(Clone)]
pub struct ResourceStore {
    store: ResourceRuntime,
    definition: Arc<ResourceDefinition>,
    scope: Scope,
    qualified_name: String,
    admission: Arc<Mutex<()>>,
    call_config: Option<TransportConfig>,
}

impl ResourceStore {
    /// Store for the tree rooted at `definition`
    #[must_use]
    pub fn new(definition: ResourceDefinition, environment: ResourceEnvironment) -> Self {
        Self::with_config(definition, environment, StoreConfig::default())
    }

    /// Store for the tree rooted at `definition`, with custom store configuration
    #[must_use]
    pub fn with_config(
        definition: ResourceDefinition,
        environment: ResourceEnvironment,
        config: StoreConfig,
    ) -> Self {
        let definition = Arc::new(definition);
        let store = Store::with_config(
            ResourceState::for_definition(&definition),
            ResourceReducer::new(Arc::clone(&definition)),
            environment,
            config,
        );
        Self {
            store,
            qualified_name: definition.name.clone(),
            definition,
            scope: Scope::root(),
            admission: Arc::new(Mutex::new(())),
            call_config: None,
        }
    }

    /// Nested resource `child` of the entity `parent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownResource`] if this resource declares no
    /// nested resource called `child`.
    pub fn nested(&self, child: &str, parent_id: impl Into<EntityId>) -> Result<Self, ResourceError> {
        let scope = self.scope.child(child, parent_id);
        let qualified_name = self.definition.qualified_name(&scope)?;
        Ok(Self {
            store: self.store.clone(),
            definition: Arc::clone(&self.definition),
            scope,
            qualified_name,
            admission: Arc::clone(&self.admission),
            call_config: self.call_config.clone(),
        })
    }

    /// Same resource with a per-call transport layer on top of the store's
    #[must_use]
    pub fn with_call_config(mut self, config: TransportConfig) -> Self {
        self.call_config = Some(config);
        self
    }

    /// Name of this resource
    #[must_use]
    pub fn name(&self) -> &str {
        self.qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }

    /// Dot-joined names from the root, e.g. `posts.comments`
    #[must_use]
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Mount point within the root state
    #[must_use]
    pub const fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Path of this resource's state below the root state
    #[must_use]
    pub fn state_path(&self) -> Vec<String> {
        self.scope.state_path()
    }

    /// Endpoint of this resource's collection.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownResource`] for an unresolvable scope.
    pub fn endpoint(&self) -> Result<String, ResourceError> {
        self.definition.endpoint(&self.scope)
    }

    /// Underlying store
    #[must_use]
    pub const fn runtime(&self) -> &ResourceRuntime {
        &self.store
    }

    /// Current state of this resource; empty if nothing has touched it yet
    pub async fn state(&self) -> ResourceState {
        let scope = &self.scope;
        match self.store.state(|root| root.subtree(scope).cloned()).await {
            Some(state) => state,
            None => self
                .definition
                .resolve(scope)
                .map(ResourceState::for_definition)
                .unwrap_or_default(),
        }
    }

    /// JSON rendering of [`Self::state`]
    pub async fn snapshot(&self) -> Value {
        self.state().await.snapshot()
    }

    /// List the collection. An identical running or successful index is
    /// reused; a reused success is re-read from the current entity table.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Request`] if the request fails.
    pub async fn index(&self, query: Value) -> Result<HttpResponse, ResourceError> {
        self.execute(Operation::Index { query }, false).await
    }

    /// [`Self::index`] without consulting the cache
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Request`] if the request fails.
    pub async fn force_index(&self, query: Value) -> Result<HttpResponse, ResourceError> {
        self.execute(Operation::Index { query }, true).await
    }

    /// Fetch one entity. An entity already in state is answered with a
    /// synthetic `200` without a transport call.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Request`] if the request fails.
    pub async fn show(&self, id: impl Into<EntityId>) -> Result<HttpResponse, ResourceError> {
        self.execute(Operation::Show { id: id.into() }, false).await
    }

    /// [`Self::show`] without consulting state or the cache
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Request`] if the request fails.
    pub async fn force_show(&self, id: impl Into<EntityId>) -> Result<HttpResponse, ResourceError> {
        self.execute(Operation::Show { id: id.into() }, true).await
    }

    /// Create an entity
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Request`] if the request fails.
    pub async fn create(&self, params: Value) -> Result<HttpResponse, ResourceError> {
        self.execute(Operation::Create { params }, true).await
    }

    /// Update an entity
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Request`] if the request fails.
    pub async fn update(
        &self,
        id: impl Into<EntityId>,
        updates: Value,
    ) -> Result<HttpResponse, ResourceError> {
        self.execute(
            Operation::Update {
                id: id.into(),
                updates,
            },
            true,
        )
        .await
    }

    /// Delete an entity
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Request`] if the request fails.
    pub async fn delete(&self, id: impl Into<EntityId>) -> Result<HttpResponse, ResourceError> {
        self.execute(Operation::Delete { id: id.into() }, true).await
    }

    /// Fetch the collection's `OPTIONS` metadata into `state.options`
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Request`] if the request fails.
    pub async fn options(&self) -> Result<HttpResponse, ResourceError> {
        self.execute(Operation::Options, true).await
    }

    /// Invoke the custom action `name`
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownAction`] if the definition declares no
    /// such action, [`ResourceError::Request`] if the request fails.
    pub async fn perform(&self, name: &str, args: Value) -> Result<HttpResponse, ResourceError> {
        self.execute(
            Operation::Custom {
                name: name.to_string(),
                args,
            },
            true,
        )
        .await
    }

    /// Subscribe to every phase reduced by this tree, nested resources included
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<ResourceAction> {
        self.store.subscribe_actions()
    }

    /// Stop accepting operations and wait for running ones to settle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if calls are still running when
    /// `timeout` expires.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.shutdown(timeout).await
    }

    #[tracing::instrument(
        skip_all,
        fields(resource = %self.qualified_name, operation = operation.name(), force = force)
    )]
    async fn execute(&self, operation: Operation, force: bool) -> Result<HttpResponse, ResourceError> {
        let started = Instant::now();
        let definition = self.definition.resolve(&self.scope)?;
        let endpoint = self.definition.endpoint(&self.scope)?;
        let plan = operation.plan(definition, &endpoint)?;
        let key = plan.descriptor.key();

        let admission = self.admission.lock().await;
        if let Some(policy) = plan.read.filter(|_| !force) {
            let lookup = self
                .lookup(&operation, &key, policy, &definition.primary_key)
                .await?;
            ResourceMetrics::record_cache(lookup.kind());
            tracing::debug!(%key, lookup = lookup.kind(), "Request cache consulted");
            match lookup {
                CacheLookup::Fresh(response) => {
                    drop(admission);
                    ResourceMetrics::record_request(operation.name(), "cached", started.elapsed());
                    return Ok(response);
                },
                CacheLookup::Pending(in_flight) => {
                    drop(admission);
                    let outcome = in_flight.await;
                    return self.settle(&operation, &key, outcome, true, started);
                },
                CacheLookup::Miss => {},
            }
        }

        let issued = self.issue(&operation, definition, plan).await;
        drop(admission);
        let outcome = issued?.await;
        self.settle(&operation, &key, outcome, false, started)
    }

    async fn lookup(
        &self,
        operation: &Operation,
        key: &RequestKey,
        policy: ReadPolicy,
        primary_key: &str,
    ) -> Result<CacheLookup, ResourceError> {
        let scope = &self.scope;
        self.store
            .state(|root| {
                let Some(state) = root.subtree(scope) else {
                    return Ok(CacheLookup::Miss);
                };
                if let Operation::Show { id } = operation {
                    if let Some(entity) = state.data.get(id) {
                        return Ok(CacheLookup::Fresh(HttpResponse::ok(entity.clone())));
                    }
                }
                cache::lookup(&state.requests, &state.data, key, policy, primary_key)
            })
            .await
    }

    async fn issue(
        &self,
        operation: &Operation,
        definition: &ResourceDefinition,
        plan: OperationPlan,
    ) -> Result<ResponseHandle, ResourceError> {
        let environment = self.store.environment();
        let config = environment.transport(self.call_config.as_ref());
        let http = Arc::clone(&environment.http);
        let primary_key = definition.primary_key.clone();
        let OperationPlan {
            descriptor, merge, ..
        } = plan;
        let hooks = record_hooks(&descriptor.key(), &environment.clock);

        let lift = {
            let resource = self.qualified_name.clone();
            let scope = self.scope.clone();
            let operation = operation.name().to_string();
            let merge = merge.clone();
            move |phase: ResourcePhase| ResourceAction {
                resource: resource.clone(),
                scope: scope.clone(),
                operation: operation.clone(),
                merge: merge.clone(),
                phase,
            }
        };

        let transport = move |_args: Value| async move {
            let response = http.request(&descriptor, &config).await?;
            merge
                .validate(&response.data, &primary_key)
                .map_err(|error| malformed(&error))?;
            Ok::<_, RequestError>(response)
        };

        self.store
            .run_lifecycle(transport, operation.args(), &hooks, lift)
            .await
            .map_err(|error| ResourceError::Store {
                message: error.to_string(),
            })
    }

    fn settle(
        &self,
        operation: &Operation,
        key: &RequestKey,
        outcome: Result<HttpResponse, RequestError>,
        deduplicated: bool,
        started: Instant,
    ) -> Result<HttpResponse, ResourceError> {
        let label = match (&outcome, deduplicated) {
            (_, true) => "deduplicated",
            (Ok(_), false) => "success",
            (Err(_), false) => "failure",
        };
        ResourceMetrics::record_request(operation.name(), label, started.elapsed());
        if let Err(error) = &outcome {
            tracing::warn!(resource = %self.qualified_name, %key, %error, "Request failed");
        }
        outcome.map_err(ResourceError::from)
    }
}

impl std::fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore")
            .field("resource", &self.qualified_name)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Request records stamped with the environment clock
fn record_hooks(key: &RequestKey, clock: &Arc<dyn Clock>) -> RecordHooks {
    let (loading_key, loading_clock) = (key.clone(), Arc::clone(clock));
    let (success_key, success_clock) = (key.clone(), Arc::clone(clock));
    let (failure_key, failure_clock) = (key.clone(), Arc::clone(clock));
    LifecycleHooks::new(
        move |in_flight: &ResponseHandle, args: &Value| {
            RequestRecord::loading(
                loading_key.clone(),
                args.clone(),
                in_flight.clone(),
                loading_clock.now(),
            )
        },
        move |response: &HttpResponse, _args: &Value| {
            RequestRecord::succeeded(success_key.clone(), response.clone(), success_clock.now())
        },
        move |error: &RequestError, _args: &Value| {
            RequestRecord::failed(failure_key.clone(), error.clone(), failure_clock.now())
        },
    )
}

/// Root resource stores grouped by name.
///
/// ```ignore
/// let index = ResourceIndex::new().with(posts).with(users);
/// let snapshot = index.snapshot().await; // {"posts": {...}, "users": {...}}
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResourceIndex {
    stores: BTreeMap<String, ResourceStore>,
}

impl ResourceIndex {
    /// Empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `store` under its qualified name
    #[must_use]
    pub fn with(mut self, store: ResourceStore) -> Self {
        self.register(store);
        self
    }

    /// Add `store` under its qualified name, replacing any previous one
    pub fn register(&mut self, store: ResourceStore) -> Option<ResourceStore> {
        self.stores.insert(store.qualified_name().to_string(), store)
    }

    /// Store registered as `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceStore> {
        self.stores.get(name)
    }

    /// Registered names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    /// `{ <name>: <state> }` for every registered store
    pub async fn snapshot(&self) -> Value {
        let mut snapshot = Map::new();
        for (name, store) in &self.stores {
            snapshot.insert(name.clone(), store.snapshot().await);
        }
        Value::Object(snapshot)
    }

    /// Shut every store down, reporting the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] raised; every store is still asked to
    /// shut down.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        let mut first = Ok(());
        for (name, store) in &self.stores {
            if let Err(error) = store.shutdown(timeout).await {
                tracing::error!(store = %name, %error, "Store shutdown failed");
                if first.is_ok() {
                    first = Err(error);
                }
            }
        }
        first
    }
}
