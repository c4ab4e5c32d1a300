//! Standard resource operations and how their responses merge into state.
//!
//! | operation | request | reads cache | merge |
//! |-----------|---------|-------------|-------|
//! | `index(query)` | `GET endpoint`, data = query | loading + success | [`MergeStrategy::Union`] |
//! | `show(id)` | `GET endpoint + id` | loading | [`MergeStrategy::AddOrUpdate`] |
//! | `create(params)` | `POST endpoint`, data = params | never | [`MergeStrategy::AddOrUpdate`] |
//! | `update(id, updates)` | `PUT endpoint + id`, data = updates | never | [`MergeStrategy::AddOrUpdate`] |
//! | `delete(id)` | `DELETE endpoint + id` | never | [`MergeStrategy::Remove`] |
//! | `options()` | `OPTIONS endpoint` | never | [`MergeStrategy::Options`] |
//!
//! Named custom actions declared on a [`ResourceDefinition`] build their
//! request from a template and merge with the strategy they were declared with.

use crate::cache::ReadPolicy;
use crate::entity::{self, EntityError, EntityId, EntityTable};
use crate::request::{Method, RequestDescriptor, RequestError};
use crate::resource::{ResourceDefinition, ResourceError, ResourceState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// How a successful response is folded into a resource's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Union a list of records into the table
    Union,
    /// Add or replace the single returned record
    AddOrUpdate,
    /// Remove the entry under `id`; the body is ignored
    Remove {
        /// Id given to the call
        id: EntityId,
    },
    /// Replace the whole table with the returned list
    Replace,
    /// Store the body verbatim in `options`
    Options,
}

impl MergeStrategy {
    /// Check that `payload` has the shape this strategy merges.
    ///
    /// # Errors
    ///
    /// Returns the [`EntityError`] the merge itself would raise.
    pub fn validate(&self, payload: &Value, primary_key: &str) -> Result<(), EntityError> {
        match self {
            Self::Union | Self::Replace => {
                entity::union_value_by_id(&EntityTable::new(), payload, primary_key).map(|_| ())
            },
            Self::AddOrUpdate => EntityId::of(payload, primary_key).map(|_| ()),
            Self::Remove { .. } | Self::Options => Ok(()),
        }
    }

    /// Fold `payload` into `state`. On error `state` is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns an [`EntityError`] if `payload` does not have the expected shape.
    pub fn apply(
        &self,
        state: &mut ResourceState,
        payload: &Value,
        primary_key: &str,
    ) -> Result<(), EntityError> {
        match self {
            Self::Union => {
                state.data = entity::union_value_by_id(&state.data, payload, primary_key)?;
            },
            Self::AddOrUpdate => {
                state.data = entity::add_or_update_by_id(&state.data, payload, primary_key)?;
            },
            Self::Remove { id } => {
                state.data = entity::remove_by_id(&state.data, id);
            },
            Self::Replace => {
                state.data = entity::union_value_by_id(&EntityTable::new(), payload, primary_key)?;
            },
            Self::Options => {
                state.options = Some(payload.clone());
            },
        }
        Ok(())
    }
}

/// One call against a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// List the collection
    Index {
        /// Query sent as request data
        query: Value,
    },
    /// Fetch one entity
    Show {
        /// Entity id
        id: EntityId,
    },
    /// Create an entity
    Create {
        /// Body of the new entity
        params: Value,
    },
    /// Replace fields of an entity
    Update {
        /// Entity id
        id: EntityId,
        /// Fields to send
        updates: Value,
    },
    /// Delete an entity
    Delete {
        /// Entity id
        id: EntityId,
    },
    /// Fetch the collection's `OPTIONS` metadata
    Options,
    /// A named action declared on the definition
    Custom {
        /// Action name
        name: String,
        /// Arguments passed to the request template
        args: Value,
    },
}

/// Everything needed to issue one operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationPlan {
    /// Request to issue
    pub descriptor: RequestDescriptor,
    /// Merge applied on success
    pub merge: MergeStrategy,
    /// Cache reuse allowed before issuing, `None` for writes
    pub read: Option<ReadPolicy>,
}

impl Operation {
    /// Operation name used in action types and metrics
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Index { .. } => "index",
            Self::Show { .. } => "show",
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Options => "options",
            Self::Custom { name, .. } => name.as_str(),
        }
    }

    /// Call arguments as a JSON list, as recorded in request records
    #[must_use]
    pub fn args(&self) -> Value {
        match self {
            Self::Index { query } => json!([query]),
            Self::Show { id } | Self::Delete { id } => json!([id]),
            Self::Create { params } => json!([params]),
            Self::Update { id, updates } => json!([id, updates]),
            Self::Options => json!([]),
            Self::Custom { args, .. } => json!([args]),
        }
    }

    /// Resolve the request, merge strategy and cache policy against
    /// `definition` mounted at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownAction`] for a custom action the
    /// definition does not declare.
    pub fn plan(
        &self,
        definition: &ResourceDefinition,
        endpoint: &str,
    ) -> Result<OperationPlan, ResourceError> {
        let member = |id: &EntityId| format!("{endpoint}{id}");
        let plan = match self {
            Self::Index { query } => OperationPlan {
                descriptor: RequestDescriptor::get(endpoint).with_data(query.clone()),
                merge: MergeStrategy::Union,
                read: Some(ReadPolicy::ReuseSuccess),
            },
            Self::Show { id } => OperationPlan {
                descriptor: RequestDescriptor::get(member(id)),
                merge: MergeStrategy::AddOrUpdate,
                read: Some(ReadPolicy::PendingOnly),
            },
            Self::Create { params } => OperationPlan {
                descriptor: RequestDescriptor::new(Method::Post, endpoint).with_data(params.clone()),
                merge: MergeStrategy::AddOrUpdate,
                read: None,
            },
            Self::Update { id, updates } => OperationPlan {
                descriptor: RequestDescriptor::new(Method::Put, member(id)).with_data(updates.clone()),
                merge: MergeStrategy::AddOrUpdate,
                read: None,
            },
            Self::Delete { id } => OperationPlan {
                descriptor: RequestDescriptor::new(Method::Delete, member(id)),
                merge: MergeStrategy::Remove { id: id.clone() },
                read: None,
            },
            Self::Options => OperationPlan {
                descriptor: RequestDescriptor::new(Method::Options, endpoint),
                merge: MergeStrategy::Options,
                read: None,
            },
            Self::Custom { name, args } => {
                let action = definition.action(name).ok_or_else(|| ResourceError::UnknownAction {
                    resource: definition.name.clone(),
                    name: name.clone(),
                })?;
                OperationPlan {
                    descriptor: action.template.resolve(args),
                    merge: action.merge.clone(),
                    read: None,
                }
            },
        };
        Ok(plan)
    }
}

/// Turn a merge-shape error into the request error reported to callers
#[must_use]
pub fn malformed(error: &EntityError) -> RequestError {
    RequestError::MalformedPayload {
        message: error.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::request::RequestTemplate;
    use crate::resource::CustomAction;

    fn posts() -> ResourceDefinition {
        ResourceDefinition::new("posts", "/api/posts/")
    }

    #[test]
    fn member_operations_append_id_to_endpoint() {
        let plan = Operation::Show { id: 7.into() }.plan(&posts(), "/api/posts/").unwrap();
        assert_eq!(plan.descriptor.url, "/api/posts/7");
        assert_eq!(plan.descriptor.method, Method::Get);
        assert_eq!(plan.read, Some(ReadPolicy::PendingOnly));

        let plan = Operation::Update {
            id: 7.into(),
            updates: json!({"title": "t"}),
        }
        .plan(&posts(), "/api/posts/")
        .unwrap();
        assert_eq!(plan.descriptor.method, Method::Put);
        assert_eq!(plan.descriptor.data, json!({"title": "t"}));
        assert_eq!(plan.read, None);
    }

    #[test]
    fn delete_removes_the_call_id() {
        let plan = Operation::Delete { id: 2.into() }.plan(&posts(), "/p/").unwrap();
        assert_eq!(plan.merge, MergeStrategy::Remove { id: 2.into() });
        assert_eq!(plan.descriptor.key().to_string(), "DELETE /p/2?{}");
    }

    #[test]
    fn index_records_query_as_args() {
        let op = Operation::Index { query: json!({"page": 2}) };
        assert_eq!(op.args(), json!([{"page": 2}]));
        assert_eq!(op.name(), "index");
    }

    #[test]
    fn custom_action_uses_declared_template() {
        let definition = posts().with_action(
            "publish",
            CustomAction::new(RequestTemplate::computed(|args: &Value| {
                RequestDescriptor::new(Method::Post, "/api/publish").with_data(args.clone())
            })),
        );
        let op = Operation::Custom {
            name: "publish".into(),
            args: json!({"id": 1}),
        };
        let plan = op.plan(&definition, "/api/posts/").unwrap();
        assert_eq!(plan.descriptor.url, "/api/publish");
        assert_eq!(plan.merge, MergeStrategy::Replace);

        let missing = Operation::Custom {
            name: "archive".into(),
            args: Value::Null,
        };
        assert!(matches!(
            missing.plan(&definition, "/api/posts/"),
            Err(ResourceError::UnknownAction { .. })
        ));
    }

    #[test]
    fn union_rejects_non_list_payload() {
        let mut state = ResourceState::default();
        let result = MergeStrategy::Union.apply(&mut state, &json!({"id": 1}), "id");
        assert!(result.is_err());
        assert!(state.data.is_empty());
        assert!(MergeStrategy::Union.validate(&json!({"id": 1}), "id").is_err());
    }

    #[test]
    fn replace_drops_entities_missing_from_response() {
        let mut state = ResourceState::default();
        MergeStrategy::Union
            .apply(&mut state, &json!([{"id": 1}, {"id": 2}]), "id")
            .unwrap();
        MergeStrategy::Replace.apply(&mut state, &json!([{"id": 3}]), "id").unwrap();
        assert_eq!(state.data.keys().map(EntityId::as_str).collect::<Vec<_>>(), ["3"]);
    }

    #[test]
    fn options_are_stored_verbatim() {
        let mut state = ResourceState::default();
        MergeStrategy::Options
            .apply(&mut state, &json!({"actions": {"POST": {}}}), "id")
            .unwrap();
        assert_eq!(state.options, Some(json!({"actions": {"POST": {}}})));
    }
}
