//! LDAP identity store.
//!
//! Implements [`IdentityStore`] over a [`Directory`]. Every operation opens
//! one context, runs its searches and modifications on it and releases it
//! when the context is dropped, whatever the outcome.
//!
//! ## Capabilities
//!
//! - Identity objects of every configured type, with all search criteria
//! - `MEMBER` relationships between types linked by `allowed_membership_types`
//!   and recorded by at least one writable membership attribute
//! - Password credentials for types with a password attribute
//!
//! `ROLE` relationships and relationship names are not supported.

use std::sync::Arc;

use async_trait::async_trait;
use idm_cache::{CacheProvider, CacheProviderExt};
use idm_core::error::require_non_blank;
use idm_core::{Error, Result};
use idm_model::criteria::compare_ignore_case;
use idm_model::{
    Attributes, Direction, IdentityObject, IdentityObjectRelationship, IdentityObjectType,
    RelationshipKind, SearchCriteria,
};
use idm_store::features::ALL_CRITERIA;
use idm_store::{FeaturesDescription, IdentityStore};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{LdapStoreConfig, LdapTypeConfig, MembershipAttribute};
use crate::connection::LdapConnectionPool;
use crate::directory::{Directory, DirectoryContext, Modification};
use crate::dn;
use crate::filter::Filter;
use crate::mapper::{entry_identity, placeholder_attributes, RelationshipMapper};
use crate::search::{LdapEntry, LdapSearcher};

/// Identity store backed by an LDAP directory.
pub struct LdapIdentityStore {
    id: String,
    config: Arc<LdapStoreConfig>,
    directory: Arc<dyn Directory>,
    cache: Option<Arc<dyn CacheProvider>>,
    features: FeaturesDescription,
}

impl std::fmt::Debug for LdapIdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapIdentityStore")
            .field("id", &self.id)
            .field("provider_url", &self.config.provider_url)
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl LdapIdentityStore {
    /// Creates a store talking to the configured server through a pool.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for an invalid configuration, or the
    /// failure to create missing contexts.
    pub async fn connect(id: impl Into<String>, config: LdapStoreConfig) -> Result<Self> {
        let pool = LdapConnectionPool::new(Arc::new(config.clone()))
            .map_err(|e| Error::illegal_argument(e.to_string()))?;
        Self::new(id, config, Arc::new(pool)).await
    }

    /// Creates a store over any directory.
    ///
    /// Validates the configuration, derives the features description and,
    /// when configured, creates missing context entries top-down.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for an invalid configuration, or the
    /// failure to create missing contexts.
    pub async fn new(
        id: impl Into<String>,
        config: LdapStoreConfig,
        directory: Arc<dyn Directory>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::illegal_argument(e.to_string()))?;

        let store = Self {
            id: id.into(),
            features: describe(&config),
            config: Arc::new(config),
            directory,
            cache: None,
        };
        if store.config.create_missing_contexts {
            store.create_missing_contexts().await?;
        }
        Ok(store)
    }

    /// Caches reads in `cache`, under this store's id as namespace.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CacheProvider>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LdapStoreConfig {
        &self.config
    }

    async fn open(&self, operation: &str) -> Result<Box<dyn DirectoryContext>> {
        self.directory.open().await.map_err(|e| e.during(operation))
    }

    fn type_config(&self, object_type: &IdentityObjectType) -> Result<&LdapTypeConfig> {
        if !self.features.is_type_supported(object_type) {
            return Err(Error::not_supported(format!(
                "identity type '{object_type}' in directory store '{}'",
                self.id
            )));
        }
        self.config
            .type_config(object_type.name())
            .map_err(|e| Error::illegal_argument(e.to_string()))
    }

    fn names_unsupported(&self) -> Error {
        Error::not_supported(format!("relationship names in directory store '{}'", self.id))
    }

    // ========================================================================
    // Cache side-channel
    // ========================================================================

    async fn cached<T: DeserializeOwned + Send>(&self, key: &str) -> Option<T> {
        let cache = self.cache.as_ref()?;
        match cache.get(&self.id, key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(store = %self.id, key, error = %e, "Ignoring cache read failure");
                None
            }
        }
    }

    async fn remember<T: Serialize + Sync>(&self, key: &str, value: &T) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&self.id, key, value, None).await {
                tracing::warn!(store = %self.id, key, error = %e, "Ignoring cache write failure");
            }
        }
    }

    async fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            match cache.invalidate(&self.id).await {
                Ok(dropped) => tracing::trace!(store = %self.id, dropped, "Invalidated cache namespace"),
                Err(e) => tracing::warn!(store = %self.id, error = %e, "Cache invalidation failed"),
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn create_missing_contexts(&self) -> Result<()> {
        const OP: &str = "create missing contexts";
        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);

        for tc in self.config.identity_types.values() {
            for context in &tc.context_dns {
                let mut missing = Vec::new();
                let mut current = Some(context.clone());
                while let Some(dn_text) = current {
                    if searcher.lookup(&dn_text).await.map_err(|e| e.during(OP))?.is_some() {
                        break;
                    }
                    current = dn::parent(&dn_text);
                    missing.push(dn_text);
                }

                for dn_text in missing.into_iter().rev() {
                    searcher
                        .context()
                        .add(&dn_text, &context_entry_attributes(&dn_text))
                        .await
                        .map_err(|e| e.during(OP))?;
                    tracing::info!(store = %self.id, dn = %dn_text, "Created missing context entry");
                }
            }
        }
        Ok(())
    }

    /// Directory attributes of an entry under their logical names, without
    /// membership and password attributes.
    fn logical_attributes(&self, object_type: &IdentityObjectType, entry: &LdapEntry) -> Attributes {
        let Some(tc) = self.config.identity_types.get(object_type.name()) else {
            return entry.attributes.clone().into_iter().collect();
        };
        entry
            .attributes
            .iter()
            .filter(|(name, _)| !tc.is_membership_attribute(name))
            .filter(|(name, _)| {
                tc.password_attribute
                    .as_deref()
                    .map_or(true, |p| !p.eq_ignore_ascii_case(name))
            })
            .map(|(name, values)| (tc.logical_attribute(name), values.clone()))
            .collect()
    }

    fn writable_attribute<'a>(&self, tc: &'a LdapTypeConfig, logical: &'a str) -> Result<&'a str> {
        if tc.is_readonly(logical) {
            return Err(Error::illegal_argument(format!("attribute '{logical}' is read-only")));
        }
        let directory = tc.directory_attribute(logical);
        let reserved = tc.is_membership_attribute(directory)
            || directory.eq_ignore_ascii_case(&tc.id_attribute)
            || tc
                .password_attribute
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(directory));
        if reserved {
            return Err(Error::illegal_argument(format!(
                "attribute '{logical}' is managed by the directory store"
            )));
        }
        Ok(directory)
    }

    /// Applies criteria to resolved entries.
    ///
    /// `presorted` tells that the entries already come in name order.
    fn select(
        &self,
        found: Vec<(IdentityObject, LdapEntry)>,
        criteria: &SearchCriteria,
        presorted: bool,
    ) -> Vec<IdentityObject> {
        let mut selected: Vec<(IdentityObject, Attributes)> = found
            .into_iter()
            .filter(|(object, _)| criteria.matches_name(&object.name))
            .map(|(object, entry)| {
                let attributes = self.logical_attributes(&object.object_type, &entry);
                (object, attributes)
            })
            .filter(|(_, attributes)| criteria.matches_attributes(attributes))
            .collect();

        match (&criteria.sort_attribute, criteria.sort) {
            (Some(attribute), order) => {
                let order = order.unwrap_or_default();
                let first = |attributes: &Attributes| {
                    attributes
                        .get(attribute)
                        .and_then(|v| v.first())
                        .cloned()
                        .unwrap_or_default()
                };
                selected.sort_by(|(_, a), (_, b)| order.apply(compare_ignore_case(&first(a), &first(b))));
            }
            (None, Some(order)) if !presorted => {
                selected.sort_by(|(a, _), (b, _)| order.apply(compare_ignore_case(&a.name, &b.name)));
            }
            _ => {}
        }

        criteria.apply_page(selected.into_iter().map(|(object, _)| object).collect())
    }

    async fn modify_attributes(
        &self,
        operation: &str,
        identity: &IdentityObject,
        modifications: Vec<Modification>,
    ) -> Result<()> {
        if modifications.is_empty() {
            return Ok(());
        }
        let mut ctx = self.open(operation).await?;
        ctx.modify(&identity.id, &modifications)
            .await
            .map_err(|e| e.during(operation))?;
        drop(ctx);

        tracing::debug!(store = %self.id, dn = %identity.id, count = modifications.len(), "Modified attributes");
        self.invalidate().await;
        Ok(())
    }
}

fn criteria_key(criteria: &SearchCriteria) -> String {
    serde_json::to_string(criteria).unwrap_or_default()
}

fn context_entry_attributes(dn_text: &str) -> Attributes {
    let mut attributes = Attributes::new();
    let Some((attribute, value)) = dn::first_rdn(dn_text) else {
        return attributes;
    };
    let class = match attribute.to_ascii_lowercase().as_str() {
        "ou" => "organizationalUnit",
        "o" => "organization",
        "dc" => "domain",
        "c" => "country",
        "l" => "locality",
        "cn" => "container",
        _ => "extensibleObject",
    };
    attributes.insert("objectClass".to_string(), vec!["top".to_string(), class.to_string()]);
    attributes.insert(attribute, vec![value]);
    attributes
}

fn describe(config: &LdapStoreConfig) -> FeaturesDescription {
    let mut builder = FeaturesDescription::builder()
        .named_relationships(false)
        .relationship_name_properties(false);

    for (name, tc) in &config.identity_types {
        builder = builder.identity_type(name.clone(), ALL_CRITERIA);
        if tc.password_attribute.is_some() {
            builder = builder.credentials(name.clone());
        }

        let parent_side = tc
            .child_membership
            .as_ref()
            .is_some_and(MembershipAttribute::is_writable);
        for child in &tc.allowed_membership_types {
            let child_side = config
                .identity_types
                .get(child)
                .and_then(|c| c.parent_membership.as_ref())
                .is_some_and(MembershipAttribute::is_writable);
            if parent_side || child_side {
                builder = builder.relationship(name.clone(), child.clone(), RelationshipKind::Member);
            } else {
                tracing::warn!(parent = %name, child = %child, "Membership allowed but no writable attribute records it");
            }
        }
    }
    builder.build()
}

#[async_trait]
impl IdentityStore for LdapIdentityStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn features(&self) -> &FeaturesDescription {
        &self.features
    }

    async fn create_identity_object(
        &self,
        name: &str,
        object_type: &IdentityObjectType,
        attributes: &Attributes,
    ) -> Result<IdentityObject> {
        const OP: &str = "create identity object";
        require_non_blank(name, "identity name")?;
        let tc = self.type_config(object_type)?;
        let context = tc
            .context_dns
            .first()
            .ok_or_else(|| Error::illegal_argument(format!("no context DN for type '{object_type}'")))?;

        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        if searcher
            .find_by_name(object_type.name(), tc, name)
            .await
            .map_err(|e| e.during(OP))?
            .is_some()
        {
            return Err(Error::already_exists(format!("{object_type} '{name}'")));
        }

        let mut entry = tc.create_entry_attributes.clone();
        for (logical, values) in attributes {
            entry.insert(tc.directory_attribute(logical).to_string(), values.clone());
        }
        entry.extend(placeholder_attributes(tc));
        entry.insert(tc.id_attribute.clone(), vec![name.to_string()]);

        let dn_text = dn::child(&tc.id_attribute, name, context);
        searcher
            .context()
            .add(&dn_text, &entry)
            .await
            .map_err(|e| e.during(OP))?;
        drop(ctx);

        tracing::debug!(store = %self.id, dn = %dn_text, r#type = %object_type, "Created identity object");
        self.invalidate().await;
        Ok(IdentityObject::new(dn_text, name, object_type.clone()))
    }

    async fn remove_identity_object(&self, identity: &IdentityObject) -> Result<()> {
        const OP: &str = "remove identity object";
        self.type_config(&identity.object_type)?;

        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        if searcher
            .lookup(&identity.id)
            .await
            .map_err(|e| e.during(OP))?
            .is_none()
        {
            return Err(Error::not_found(format!("identity object '{}'", identity.id)));
        }

        let removed = match RelationshipMapper::new(&self.config)
            .detach(&mut searcher, identity)
            .await
        {
            Ok(()) => searcher.context().delete(&identity.id).await,
            Err(e) => Err(e),
        };
        drop(ctx);

        // detach may have rewritten other entries even if the delete failed
        self.invalidate().await;
        removed.map_err(|e| e.during(OP))?;
        tracing::debug!(store = %self.id, dn = %identity.id, "Removed identity object");
        Ok(())
    }

    async fn identity_object_count(&self, object_type: &IdentityObjectType) -> Result<usize> {
        const OP: &str = "count identity objects";
        let tc = self.type_config(object_type)?;
        let filter = tc.entry_filter("*").map_err(|e| e.during(OP))?;

        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        let entries = searcher
            .search_type(tc, &filter, None)
            .await
            .map_err(|e| e.during(OP))?;
        Ok(entries.len())
    }

    async fn find_identity_object(
        &self,
        name: &str,
        object_type: &IdentityObjectType,
    ) -> Result<Option<IdentityObject>> {
        const OP: &str = "find identity object";
        require_non_blank(name, "identity name")?;
        let tc = self.type_config(object_type)?;

        let key = format!("object:{object_type}:{}", name.to_lowercase());
        if let Some(hit) = self.cached::<Option<IdentityObject>>(&key).await {
            return Ok(hit);
        }

        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        let found = searcher
            .find_by_name(object_type.name(), tc, name)
            .await
            .map_err(|e| e.during(OP))?
            .map(|entry| entry_identity(object_type.name(), tc, &entry));
        drop(ctx);

        self.remember(&key, &found).await;
        Ok(found)
    }

    async fn find_identity_object_by_id(&self, id: &str) -> Result<Option<IdentityObject>> {
        const OP: &str = "find identity object by id";
        require_non_blank(id, "identity id")?;
        dn::validate(id).map_err(|e| Error::illegal_argument(e.to_string()))?;

        let key = format!("id:{}", dn::normalize(id));
        if let Some(hit) = self.cached::<Option<IdentityObject>>(&key).await {
            return Ok(hit);
        }

        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        let Some(entry) = searcher.lookup(id).await.map_err(|e| e.during(OP))? else {
            return Ok(None);
        };
        let mapper = RelationshipMapper::new(&self.config);
        let type_name = mapper
            .infer_type(&mut searcher, &entry, None)
            .await
            .map_err(|e| e.during(OP))?
            .ok_or_else(|| {
                Error::illegal_argument(format!("entry '{id}' does not belong to any configured identity type"))
            })?;
        let tc = self.config.type_config(type_name).map_err(|e| e.during(OP))?;
        let found = Some(entry_identity(type_name, tc, &entry));
        drop(ctx);

        self.remember(&key, &found).await;
        Ok(found)
    }

    async fn find_identity_objects(
        &self,
        object_type: &IdentityObjectType,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        const OP: &str = "find identity objects";
        let tc = self.type_config(object_type)?;
        self.features.check_criteria(object_type, criteria)?;

        let key = format!("search:{object_type}:{}", criteria_key(criteria));
        if let Some(hit) = self.cached::<Vec<IdentityObject>>(&key).await {
            return Ok(hit);
        }

        let filter = tc
            .entry_filter(criteria.name_filter.as_deref().unwrap_or("*"))
            .map_err(|e| e.during(OP))?;
        let name_sort = criteria.sort.filter(|_| criteria.sort_attribute.is_none());

        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        let entries = searcher
            .search_type(tc, &filter, name_sort)
            .await
            .map_err(|e| e.during(OP))?;
        drop(ctx);

        let found = entries
            .into_iter()
            .map(|entry| (entry_identity(object_type.name(), tc, &entry), entry))
            .collect();
        let selected = self.select(found, criteria, name_sort.is_some());

        self.remember(&key, &selected).await;
        Ok(selected)
    }

    async fn find_related_identity_objects(
        &self,
        identity: &IdentityObject,
        kind: RelationshipKind,
        direction: Direction,
        target_type: Option<&IdentityObjectType>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        const OP: &str = "find related identity objects";
        if kind != RelationshipKind::Member {
            return Err(Error::not_supported(format!(
                "{kind} relationships in directory store '{}'",
                self.id
            )));
        }
        self.type_config(&identity.object_type)?;
        if let Some(target) = target_type {
            self.type_config(target)?;
            self.features.check_criteria(target, criteria)?;
        }

        let key = format!(
            "related:{}:{direction:?}:{}:{}",
            dn::normalize(&identity.id),
            target_type.map_or("*", IdentityObjectType::name),
            criteria_key(criteria)
        );
        if let Some(hit) = self.cached::<Vec<IdentityObject>>(&key).await {
            return Ok(hit);
        }

        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        let found = RelationshipMapper::new(&self.config)
            .related(&mut searcher, identity, direction, target_type.map(IdentityObjectType::name))
            .await
            .map_err(|e| e.during(OP))?;
        drop(ctx);

        let selected = self.select(found, criteria, false);
        self.remember(&key, &selected).await;
        Ok(selected)
    }

    async fn create_relationship(
        &self,
        from: &IdentityObject,
        to: &IdentityObject,
        kind: RelationshipKind,
        name: Option<&str>,
        _create_names: bool,
    ) -> Result<IdentityObjectRelationship> {
        const OP: &str = "create relationship";
        if name.is_some() {
            return Err(self.names_unsupported());
        }
        self.features
            .check_relationship(&from.object_type, &to.object_type, kind)?;

        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        for side in [from, to] {
            if searcher
                .lookup(&side.id)
                .await
                .map_err(|e| e.during(OP))?
                .is_none()
            {
                return Err(Error::not_found(format!("identity object '{}'", side.id)));
            }
        }
        let added = RelationshipMapper::new(&self.config)
            .add_membership(&mut searcher, from, to)
            .await;
        drop(ctx);

        // one side may already be written when the other fails
        self.invalidate().await;
        added.map_err(|e| e.during(OP))?;
        tracing::debug!(store = %self.id, from = %from.name, to = %to.name, %kind, "Created relationship");
        Ok(IdentityObjectRelationship::member(from.clone(), to.clone()))
    }

    async fn remove_relationship(
        &self,
        from: &IdentityObject,
        to: &IdentityObject,
        kind: RelationshipKind,
        name: Option<&str>,
    ) -> Result<()> {
        const OP: &str = "remove relationship";
        if name.is_some() {
            return Err(self.names_unsupported());
        }
        self.features
            .check_relationship(&from.object_type, &to.object_type, kind)?;

        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        let removed = RelationshipMapper::new(&self.config)
            .remove_membership(&mut searcher, from, to)
            .await;
        drop(ctx);

        if !matches!(removed, Ok(false)) {
            self.invalidate().await;
        }
        let removed = removed.map_err(|e| e.during(OP))?;
        tracing::debug!(store = %self.id, from = %from.name, to = %to.name, %kind, removed, "Removed relationship");
        Ok(())
    }

    async fn remove_relationships(
        &self,
        first: &IdentityObject,
        second: &IdentityObject,
        _named: bool,
    ) -> Result<()> {
        const OP: &str = "remove relationships";
        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        let mapper = RelationshipMapper::new(&self.config);

        let mut outcome = Ok(false);
        for (parent, child) in [(first, second), (second, first)] {
            if !self
                .features
                .is_relationship_supported(&parent.object_type, &child.object_type, RelationshipKind::Member)
            {
                continue;
            }
            match mapper.remove_membership(&mut searcher, parent, child).await {
                Ok(removed) => outcome = outcome.map(|any| any || removed),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        drop(ctx);

        if !matches!(outcome, Ok(false)) {
            self.invalidate().await;
        }
        outcome.map_err(|e| e.during(OP))?;
        Ok(())
    }

    async fn resolve_relationships(
        &self,
        from: &IdentityObject,
        to: &IdentityObject,
        kind: Option<RelationshipKind>,
    ) -> Result<Vec<IdentityObjectRelationship>> {
        const OP: &str = "resolve relationships";
        if kind == Some(RelationshipKind::Role) {
            return Err(Error::not_supported(format!(
                "ROLE relationships in directory store '{}'",
                self.id
            )));
        }
        if !self
            .features
            .is_relationship_supported(&from.object_type, &to.object_type, RelationshipKind::Member)
        {
            return Ok(Vec::new());
        }

        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        let member = RelationshipMapper::new(&self.config)
            .is_member(&mut searcher, from, to)
            .await
            .map_err(|e| e.during(OP))?;

        Ok(if member {
            vec![IdentityObjectRelationship::member(from.clone(), to.clone())]
        } else {
            Vec::new()
        })
    }

    async fn create_relationship_name(&self, _name: &str) -> Result<String> {
        Err(self.names_unsupported())
    }

    async fn remove_relationship_name(&self, _name: &str) -> Result<()> {
        Err(self.names_unsupported())
    }

    async fn relationship_names(&self, _criteria: &SearchCriteria) -> Result<Vec<String>> {
        Err(self.names_unsupported())
    }

    async fn relationship_names_of(
        &self,
        _identity: &IdentityObject,
        _criteria: &SearchCriteria,
    ) -> Result<Vec<String>> {
        Err(self.names_unsupported())
    }

    async fn attributes(&self, identity: &IdentityObject) -> Result<Attributes> {
        const OP: &str = "read attributes";
        self.type_config(&identity.object_type)?;

        let key = format!("attributes:{}", dn::normalize(&identity.id));
        if let Some(hit) = self.cached::<Attributes>(&key).await {
            return Ok(hit);
        }

        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        let entry = searcher
            .lookup(&identity.id)
            .await
            .map_err(|e| e.during(OP))?
            .ok_or_else(|| Error::not_found(format!("identity object '{}'", identity.id)))?;
        drop(ctx);

        let attributes = self.logical_attributes(&identity.object_type, &entry);
        self.remember(&key, &attributes).await;
        Ok(attributes)
    }

    async fn add_attributes(&self, identity: &IdentityObject, attributes: &Attributes) -> Result<()> {
        let tc = self.type_config(&identity.object_type)?;
        let mut modifications = Vec::with_capacity(attributes.len());
        for (logical, values) in attributes.iter().filter(|(_, v)| !v.is_empty()) {
            let directory = self.writable_attribute(tc, logical)?;
            modifications.push(Modification::add(directory, values.clone()));
        }
        self.modify_attributes("add attributes", identity, modifications)
            .await
    }

    async fn update_attributes(
        &self,
        identity: &IdentityObject,
        attributes: &Attributes,
    ) -> Result<()> {
        let tc = self.type_config(&identity.object_type)?;
        let mut modifications = Vec::with_capacity(attributes.len());
        for (logical, values) in attributes {
            let directory = self.writable_attribute(tc, logical)?;
            modifications.push(Modification::replace(directory, values.clone()));
        }
        self.modify_attributes("update attributes", identity, modifications)
            .await
    }

    async fn remove_attributes(&self, identity: &IdentityObject, names: &[String]) -> Result<()> {
        const OP: &str = "remove attributes";
        let tc = self.type_config(&identity.object_type)?;

        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        let entry = searcher
            .lookup(&identity.id)
            .await
            .map_err(|e| e.during(OP))?
            .ok_or_else(|| Error::not_found(format!("identity object '{}'", identity.id)))?;
        drop(ctx);

        let mut modifications = Vec::with_capacity(names.len());
        for logical in names {
            let directory = self.writable_attribute(tc, logical)?;
            if entry.has_attr(directory) {
                modifications.push(Modification::delete(directory, Vec::new()));
            }
        }
        self.modify_attributes(OP, identity, modifications).await
    }

    async fn find_identity_object_by_unique_attribute(
        &self,
        object_type: &IdentityObjectType,
        name: &str,
        value: &str,
    ) -> Result<Option<IdentityObject>> {
        const OP: &str = "find identity object by unique attribute";
        require_non_blank(name, "attribute name")?;
        let tc = self.type_config(object_type)?;
        let filter = Filter::and(vec![
            tc.entry_filter("*").map_err(|e| e.during(OP))?,
            Filter::eq(tc.directory_attribute(name), value),
        ]);

        let mut ctx = self.open(OP).await?;
        let mut searcher = LdapSearcher::new(&mut *ctx, &self.config);
        let mut entries = searcher
            .search_type(tc, &filter, None)
            .await
            .map_err(|e| e.during(OP))?;
        drop(ctx);

        if entries.len() > 1 {
            return Err(Error::inconsistent(format!(
                "{} entries of type {object_type} hold unique attribute {name}={value}",
                entries.len()
            )));
        }
        Ok(entries
            .pop()
            .map(|entry| entry_identity(object_type.name(), tc, &entry)))
    }

    async fn validate_credential(&self, identity: &IdentityObject, password: &str) -> Result<bool> {
        const OP: &str = "validate credential";
        if !self.features.is_credential_supported(&identity.object_type) {
            return Err(Error::not_supported(format!(
                "credentials for identity type '{}'",
                identity.object_type
            )));
        }

        let mut ctx = self.open(OP).await?;
        let valid = ctx
            .bind(&identity.id, password)
            .await
            .map_err(|e| e.during(OP))?;
        tracing::debug!(store = %self.id, dn = %identity.id, valid, "Validated credential");
        Ok(valid)
    }

    async fn update_credential(&self, identity: &IdentityObject, password: &str) -> Result<()> {
        const OP: &str = "update credential";
        let tc = self.type_config(&identity.object_type)?;
        let attribute = tc
            .password_attribute
            .as_deref()
            .filter(|_| self.features.is_credential_supported(&identity.object_type))
            .ok_or_else(|| {
                Error::not_supported(format!("credentials for identity type '{}'", identity.object_type))
            })?;
        let encoded = tc
            .password_encoding
            .encode(password, tc.enclose_password_with.as_deref());

        let mut ctx = self.open(OP).await?;
        ctx.set_password(&identity.id, attribute, encoded)
            .await
            .map_err(|e| e.during(OP))?;
        drop(ctx);

        tracing::debug!(store = %self.id, dn = %identity.id, "Updated credential");
        self.invalidate().await;
        Ok(())
    }
}
