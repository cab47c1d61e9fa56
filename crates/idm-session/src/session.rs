//! Identity session.

use std::fmt;
use std::sync::Arc;

use idm_core::{Error, IdentityConfig, QueryError, Result};
use idm_model::{Group, IdentityObject, IdentityObjectType, User};
use idm_store::IdentityStore;
use uuid::Uuid;

use crate::attribute::AttributesManager;
use crate::event::{EventDispatcher, EventListener, EventPayload};
use crate::persistence::PersistenceManager;
use crate::query::{GroupQueryBuilder, Query, RoleQueryBuilder, UserQueryBuilder};
use crate::relationship::RelationshipManager;
use crate::resolver::RelationshipResolver;
use crate::role::RoleManager;

/// A unit of work against one identity store.
///
/// The session maps users and typed groups onto the store's identity object
/// types, hands out the managers and runs queries. Listeners are registered
/// while the session is built and are called around every mutating call.
pub struct IdentitySession {
    id: Uuid,
    store: Arc<dyn IdentityStore>,
    config: IdentityConfig,
    user_type: IdentityObjectType,
    events: EventDispatcher,
}

impl fmt::Debug for IdentitySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentitySession")
            .field("id", &self.id)
            .field("store", &self.store.id())
            .field("config", &self.config)
            .field("events", &self.events)
            .finish()
    }
}

impl IdentitySession {
    /// Creates a session over a store.
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>, config: IdentityConfig) -> Self {
        let id = Uuid::now_v7();
        tracing::debug!(session_id = %id, store = store.id(), "Opened identity session");
        Self {
            id,
            store,
            user_type: IdentityObjectType::new(config.user_identity_type.clone()),
            config,
            events: EventDispatcher::new(id),
        }
    }

    /// Registers an event listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.events.register(listener);
        self
    }

    /// Returns the session ID.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &dyn IdentityStore {
        self.store.as_ref()
    }

    /// Returns the identity configuration.
    #[must_use]
    pub const fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Returns the event dispatcher.
    #[must_use]
    pub const fn events(&self) -> &EventDispatcher {
        &self.events
    }

    // === Managers ===

    /// Returns the user and group lifecycle manager.
    #[must_use]
    pub const fn persistence(&self) -> PersistenceManager<'_> {
        PersistenceManager::new(self)
    }

    /// Returns the membership manager.
    #[must_use]
    pub const fn relationships(&self) -> RelationshipManager<'_> {
        RelationshipManager::new(self)
    }

    /// Returns the role manager.
    #[must_use]
    pub const fn roles(&self) -> RoleManager<'_> {
        RoleManager::new(self)
    }

    /// Returns the attribute and credential manager.
    #[must_use]
    pub const fn attributes(&self) -> AttributesManager<'_> {
        AttributesManager::new(self)
    }

    /// Returns a relationship resolver over the session's store.
    #[must_use]
    pub fn resolver(&self) -> RelationshipResolver<'_> {
        RelationshipResolver::new(self.store.as_ref(), &self.user_type)
    }

    // === Queries ===

    /// Creates an empty user query builder.
    #[must_use]
    pub fn user_query_builder(&self) -> UserQueryBuilder {
        UserQueryBuilder::new()
    }

    /// Creates an empty group query builder.
    #[must_use]
    pub fn group_query_builder(&self) -> GroupQueryBuilder {
        GroupQueryBuilder::new()
    }

    /// Creates an empty role query builder.
    #[must_use]
    pub fn role_query_builder(&self) -> RoleQueryBuilder {
        RoleQueryBuilder::new()
    }

    /// Runs a query.
    ///
    /// ## Errors
    ///
    /// Returns `Query` errors for queries without a defined resolution,
    /// `UnsupportedCriterium` when the store cannot honour the criteria, and
    /// store failures.
    pub async fn list<Q: Query>(&self, query: &Q) -> Result<Vec<Q::Item>> {
        query.execute(self).await
    }

    /// Runs a query that must match at most one result.
    ///
    /// ## Errors
    ///
    /// Returns `QueryError::AmbiguousResult` if several results match, and
    /// every error of [`list`](Self::list).
    pub async fn unique_result<Q: Query>(&self, query: &Q) -> Result<Option<Q::Item>> {
        let mut results = query.execute(self).await?;
        match results.len() {
            0 => Ok(None),
            1 => Ok(results.pop()),
            n => Err(QueryError::AmbiguousResult(n).into()),
        }
    }

    // === Type mapping ===

    /// Returns the identity object type storing users.
    #[must_use]
    pub const fn user_type(&self) -> &IdentityObjectType {
        &self.user_type
    }

    /// Returns the identity object type storing groups of a type.
    #[must_use]
    pub fn group_identity_type(&self, group_type: &str) -> IdentityObjectType {
        IdentityObjectType::new(self.config.identity_type_for_group(group_type))
    }

    pub(crate) fn to_user(&self, object: &IdentityObject) -> Result<User> {
        if !object.is_of_type(&self.user_type) {
            return Err(Error::inconsistent(format!(
                "'{}' has type '{}', expected a user",
                object.name, object.object_type
            )));
        }
        User::new(object.name.clone())
    }

    pub(crate) fn to_group(&self, object: &IdentityObject) -> Result<Group> {
        let group_type = self
            .config
            .group_type_for_identity(object.object_type.name())
            .ok_or_else(|| {
                Error::inconsistent(format!("'{}' is a user, expected a group", object.name))
            })?;
        Group::new(object.name.clone(), group_type)
    }

    pub(crate) fn to_users(&self, objects: &[IdentityObject]) -> Result<Vec<User>> {
        objects.iter().map(|o| self.to_user(o)).collect()
    }

    pub(crate) fn to_groups(&self, objects: &[IdentityObject]) -> Result<Vec<Group>> {
        objects.iter().map(|o| self.to_group(o)).collect()
    }

    pub(crate) async fn user_object(&self, user: &User) -> Result<Option<IdentityObject>> {
        self.store
            .find_identity_object(user.id(), &self.user_type)
            .await
    }

    pub(crate) async fn group_object(&self, group: &Group) -> Result<Option<IdentityObject>> {
        self.store
            .find_identity_object(group.name(), &self.group_identity_type(group.group_type()))
            .await
    }

    pub(crate) async fn require_user(&self, user: &User) -> Result<IdentityObject> {
        self.user_object(user)
            .await?
            .ok_or_else(|| Error::not_found(format!("user '{}'", user.id())))
    }

    pub(crate) async fn require_group(&self, group: &Group) -> Result<IdentityObject> {
        self.group_object(group)
            .await?
            .ok_or_else(|| Error::not_found(format!("group '{}'", group.key())))
    }

    /// Runs a store call between the `Pre` and `Post` events of a payload.
    pub(crate) async fn bracket<T, F>(&self, payload: EventPayload, operation: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>> + Send,
        T: Send,
    {
        self.events.pre(&payload).await?;
        let value = operation.await?;
        self.events.post(&payload).await;
        Ok(value)
    }
}
