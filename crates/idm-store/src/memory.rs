//! In-memory identity store.
//!
//! Keeps identity objects, relationships and relationship names in
//! insertion order behind a single lock. Used as the test double for the
//! engine and as a backend for role relationships, which directory stores do
//! not support.

use std::collections::BTreeMap;

use async_trait::async_trait;
use idm_core::{Error, Result};
use idm_model::criteria::compare_ignore_case;
use idm_model::{
    Attributes, Direction, IdentityObject, IdentityObjectRelationship, IdentityObjectType,
    RelationshipKind, SearchCriteria,
};
use parking_lot::RwLock;

use crate::features::{FeaturesDescription, ALL_CRITERIA};
use crate::store::IdentityStore;

#[derive(Debug, Clone)]
struct Entry {
    object: IdentityObject,
    attributes: Attributes,
    password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edge {
    from: String,
    to: String,
    kind: RelationshipKind,
    name: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    entries: Vec<Entry>,
    edges: Vec<Edge>,
    names: Vec<(String, BTreeMap<String, String>)>,
}

impl State {
    fn entry(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.object.id == id)
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|e| e.object.id == id)
            .ok_or_else(|| Error::not_found(format!("identity object '{id}'")))
    }

    fn require(&self, identity: &IdentityObject) -> Result<&Entry> {
        self.entry(&identity.id)
            .ok_or_else(|| Error::not_found(format!("identity object '{}'", identity.name)))
    }

    fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|(n, _)| n == name)
    }
}

/// In-memory [`IdentityStore`].
#[derive(Debug)]
pub struct MemoryIdentityStore {
    id: String,
    features: FeaturesDescription,
    state: RwLock<State>,
}

impl MemoryIdentityStore {
    /// Creates a store with an explicit capability description.
    #[must_use]
    pub fn new(id: impl Into<String>, features: FeaturesDescription) -> Self {
        Self {
            id: id.into(),
            features,
            state: RwLock::new(State::default()),
        }
    }

    /// Creates a fully capable store for one user type and some group types.
    ///
    /// Every group type may contain every group type and the user type,
    /// through both membership and role relationships.
    #[must_use]
    pub fn for_types(id: impl Into<String>, user_type: &str, group_types: &[&str]) -> Self {
        let mut builder = FeaturesDescription::builder()
            .identity_type(user_type, ALL_CRITERIA)
            .credentials(user_type)
            .named_relationships(true)
            .relationship_name_properties(true);

        for parent in group_types {
            builder = builder
                .identity_type(*parent, ALL_CRITERIA)
                .relationship(*parent, user_type, RelationshipKind::Member)
                .relationship(*parent, user_type, RelationshipKind::Role);
            for child in group_types {
                builder = builder.relationship(*parent, *child, RelationshipKind::Member);
            }
        }

        Self::new(id, builder.build())
    }

    fn apply_criteria(&self, state: &State, objects: Vec<IdentityObject>, criteria: &SearchCriteria) -> Vec<IdentityObject> {
        let attributes_of = |object: &IdentityObject| {
            state
                .entry(&object.id)
                .map(|e| e.attributes.clone())
                .unwrap_or_default()
        };

        let mut filtered: Vec<IdentityObject> = objects
            .into_iter()
            .filter(|o| criteria.matches_name(&o.name))
            .filter(|o| {
                criteria.attribute_filters.is_empty()
                    || criteria.matches_attributes(&attributes_of(o))
            })
            .collect();

        match (&criteria.sort_attribute, criteria.sort) {
            (Some(attribute), order) => {
                let order = order.unwrap_or_default();
                filtered.sort_by(|a, b| {
                    let first = |o: &IdentityObject| {
                        attributes_of(o)
                            .get(attribute)
                            .and_then(|v| v.first().cloned())
                            .unwrap_or_default()
                    };
                    order.apply(compare_ignore_case(&first(a), &first(b)))
                });
            }
            (None, Some(_)) => criteria.sort_by_name(&mut filtered),
            (None, None) => {}
        }

        criteria.apply_page(filtered)
    }

    fn check_type(&self, object_type: &IdentityObjectType) -> Result<()> {
        if self.features.is_type_supported(object_type) {
            Ok(())
        } else {
            Err(Error::not_supported(format!(
                "identity type '{object_type}' in store '{}'",
                self.id
            )))
        }
    }

    fn check_credentials(&self, identity: &IdentityObject) -> Result<()> {
        if self.features.is_credential_supported(&identity.object_type) {
            Ok(())
        } else {
            Err(Error::not_supported(format!(
                "credentials for identity type '{}'",
                identity.object_type
            )))
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
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
        idm_core::error::require_non_blank(name, "identity name")?;
        self.check_type(object_type)?;

        let mut state = self.state.write();
        if state
            .entries
            .iter()
            .any(|e| e.object.name == name && &e.object.object_type == object_type)
        {
            return Err(Error::already_exists(format!("{object_type} '{name}'")));
        }

        state.next_id += 1;
        let object = IdentityObject::new(
            format!("mem-{}", state.next_id),
            name,
            object_type.clone(),
        );
        state.entries.push(Entry {
            object: object.clone(),
            attributes: attributes.clone(),
            password: None,
        });

        tracing::debug!(store = %self.id, id = %object.id, name, %object_type, "Created identity object");
        Ok(object)
    }

    async fn remove_identity_object(&self, identity: &IdentityObject) -> Result<()> {
        let mut state = self.state.write();
        state.require(identity)?;

        state.entries.retain(|e| e.object.id != identity.id);
        state
            .edges
            .retain(|edge| edge.from != identity.id && edge.to != identity.id);

        tracing::debug!(store = %self.id, id = %identity.id, "Removed identity object");
        Ok(())
    }

    async fn identity_object_count(&self, object_type: &IdentityObjectType) -> Result<usize> {
        let state = self.state.read();
        Ok(state
            .entries
            .iter()
            .filter(|e| &e.object.object_type == object_type)
            .count())
    }

    async fn find_identity_object(
        &self,
        name: &str,
        object_type: &IdentityObjectType,
    ) -> Result<Option<IdentityObject>> {
        let state = self.state.read();
        Ok(state
            .entries
            .iter()
            .find(|e| e.object.name == name && &e.object.object_type == object_type)
            .map(|e| e.object.clone()))
    }

    async fn find_identity_object_by_id(&self, id: &str) -> Result<Option<IdentityObject>> {
        let state = self.state.read();
        Ok(state.entry(id).map(|e| e.object.clone()))
    }

    async fn find_identity_objects(
        &self,
        object_type: &IdentityObjectType,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        self.features.check_criteria(object_type, criteria)?;

        let state = self.state.read();
        let objects = state
            .entries
            .iter()
            .filter(|e| &e.object.object_type == object_type)
            .map(|e| e.object.clone())
            .collect();
        Ok(self.apply_criteria(&state, objects, criteria))
    }

    async fn find_related_identity_objects(
        &self,
        identity: &IdentityObject,
        kind: RelationshipKind,
        direction: Direction,
        target_type: Option<&IdentityObjectType>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        if let Some(target) = target_type {
            self.features.check_criteria(target, criteria)?;
        }

        let state = self.state.read();
        let mut related: Vec<IdentityObject> = Vec::new();
        for edge in state.edges.iter().filter(|e| e.kind == kind) {
            let other = match direction {
                Direction::Children if edge.from == identity.id => &edge.to,
                Direction::Parents if edge.to == identity.id => &edge.from,
                _ => continue,
            };
            let Some(entry) = state.entry(other) else {
                continue;
            };
            if target_type.is_some_and(|t| &entry.object.object_type != t) {
                continue;
            }
            if !related.contains(&entry.object) {
                related.push(entry.object.clone());
            }
        }

        Ok(self.apply_criteria(&state, related, criteria))
    }

    async fn create_relationship(
        &self,
        from: &IdentityObject,
        to: &IdentityObject,
        kind: RelationshipKind,
        name: Option<&str>,
        create_names: bool,
    ) -> Result<IdentityObjectRelationship> {
        self.features
            .check_relationship(&from.object_type, &to.object_type, kind)?;
        match (kind.is_named(), name) {
            (true, None) => {
                return Err(Error::illegal_argument(format!("{kind} relationship requires a name")))
            }
            (false, Some(_)) => {
                return Err(Error::illegal_argument(format!("{kind} relationship cannot be named")))
            }
            (true, Some(_)) => self.features.check_named_relationships()?,
            (false, None) => {}
        }

        let mut state = self.state.write();
        let from_object = state.require(from)?.object.clone();
        let to_object = state.require(to)?.object.clone();

        if let Some(name) = name {
            if !state.has_name(name) {
                if !create_names {
                    return Err(Error::not_found(format!("relationship name '{name}'")));
                }
                state.names.push((name.to_string(), BTreeMap::new()));
            }
        }

        let edge = Edge {
            from: from_object.id.clone(),
            to: to_object.id.clone(),
            kind,
            name: name.map(String::from),
        };
        if !state.edges.contains(&edge) {
            state.edges.push(edge);
            tracing::debug!(store = %self.id, from = %from_object.name, to = %to_object.name, %kind, ?name, "Created relationship");
        }

        Ok(IdentityObjectRelationship {
            from: from_object,
            to: to_object,
            kind,
            name: name.map(String::from),
        })
    }

    async fn remove_relationship(
        &self,
        from: &IdentityObject,
        to: &IdentityObject,
        kind: RelationshipKind,
        name: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.write();
        state.edges.retain(|e| {
            !(e.from == from.id && e.to == to.id && e.kind == kind && e.name.as_deref() == name)
        });
        tracing::debug!(store = %self.id, from = %from.name, to = %to.name, %kind, ?name, "Removed relationship");
        Ok(())
    }

    async fn remove_relationships(
        &self,
        first: &IdentityObject,
        second: &IdentityObject,
        named: bool,
    ) -> Result<()> {
        let mut state = self.state.write();
        state.edges.retain(|e| {
            let between = (e.from == first.id && e.to == second.id)
                || (e.from == second.id && e.to == first.id);
            !(between && (named || e.name.is_none()))
        });
        Ok(())
    }

    async fn resolve_relationships(
        &self,
        from: &IdentityObject,
        to: &IdentityObject,
        kind: Option<RelationshipKind>,
    ) -> Result<Vec<IdentityObjectRelationship>> {
        let state = self.state.read();
        let (Some(from_entry), Some(to_entry)) = (state.entry(&from.id), state.entry(&to.id)) else {
            return Ok(Vec::new());
        };

        Ok(state
            .edges
            .iter()
            .filter(|e| e.from == from.id && e.to == to.id)
            .filter(|e| kind.map_or(true, |k| k == e.kind))
            .map(|e| IdentityObjectRelationship {
                from: from_entry.object.clone(),
                to: to_entry.object.clone(),
                kind: e.kind,
                name: e.name.clone(),
            })
            .collect())
    }

    async fn create_relationship_name(&self, name: &str) -> Result<String> {
        idm_core::error::require_non_blank(name, "relationship name")?;
        self.features.check_named_relationships()?;

        let mut state = self.state.write();
        if state.has_name(name) {
            return Err(Error::already_exists(format!("relationship name '{name}'")));
        }
        state.names.push((name.to_string(), BTreeMap::new()));
        Ok(name.to_string())
    }

    async fn remove_relationship_name(&self, name: &str) -> Result<()> {
        self.features.check_named_relationships()?;

        let mut state = self.state.write();
        if !state.has_name(name) {
            return Err(Error::not_found(format!("relationship name '{name}'")));
        }
        state.names.retain(|(n, _)| n != name);
        state.edges.retain(|e| e.name.as_deref() != Some(name));
        Ok(())
    }

    async fn relationship_names(&self, criteria: &SearchCriteria) -> Result<Vec<String>> {
        self.features.check_named_relationships()?;

        let state = self.state.read();
        let names = state.names.iter().map(|(n, _)| n.clone()).collect();
        Ok(filter_names(names, criteria))
    }

    async fn relationship_names_of(
        &self,
        identity: &IdentityObject,
        criteria: &SearchCriteria,
    ) -> Result<Vec<String>> {
        self.features.check_named_relationships()?;

        let state = self.state.read();
        let mut names: Vec<String> = Vec::new();
        for edge in &state.edges {
            if edge.from != identity.id && edge.to != identity.id {
                continue;
            }
            if let Some(name) = &edge.name {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        Ok(filter_names(names, criteria))
    }

    async fn relationship_name_properties(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let state = self.state.read();
        state
            .names
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, props)| props.clone())
            .ok_or_else(|| Error::not_found(format!("relationship name '{name}'")))
    }

    async fn set_relationship_name_properties(
        &self,
        name: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut state = self.state.write();
        let entry = state
            .names
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| Error::not_found(format!("relationship name '{name}'")))?;
        entry.1 = properties.clone();
        Ok(())
    }

    async fn attributes(&self, identity: &IdentityObject) -> Result<Attributes> {
        let state = self.state.read();
        Ok(state.require(identity)?.attributes.clone())
    }

    async fn add_attributes(&self, identity: &IdentityObject, attributes: &Attributes) -> Result<()> {
        let mut state = self.state.write();
        let entry = state.entry_mut(&identity.id)?;
        for (name, values) in attributes {
            let stored = entry.attributes.entry(name.clone()).or_default();
            for value in values {
                if !stored.contains(value) {
                    stored.push(value.clone());
                }
            }
        }
        Ok(())
    }

    async fn update_attributes(
        &self,
        identity: &IdentityObject,
        attributes: &Attributes,
    ) -> Result<()> {
        let mut state = self.state.write();
        let entry = state.entry_mut(&identity.id)?;
        for (name, values) in attributes {
            entry.attributes.insert(name.clone(), values.clone());
        }
        Ok(())
    }

    async fn remove_attributes(&self, identity: &IdentityObject, names: &[String]) -> Result<()> {
        let mut state = self.state.write();
        let entry = state.entry_mut(&identity.id)?;
        for name in names {
            entry.attributes.remove(name);
        }
        Ok(())
    }

    async fn find_identity_object_by_unique_attribute(
        &self,
        object_type: &IdentityObjectType,
        name: &str,
        value: &str,
    ) -> Result<Option<IdentityObject>> {
        let state = self.state.read();
        let mut matches = state.entries.iter().filter(|e| {
            &e.object.object_type == object_type
                && e.attributes
                    .get(name)
                    .is_some_and(|values| values.iter().any(|v| v == value))
        });

        let found = matches.next().map(|e| e.object.clone());
        if matches.next().is_some() {
            return Err(Error::inconsistent(format!(
                "more than one {object_type} holds unique attribute {name}={value}"
            )));
        }
        Ok(found)
    }

    async fn validate_credential(&self, identity: &IdentityObject, password: &str) -> Result<bool> {
        self.check_credentials(identity)?;
        let state = self.state.read();
        Ok(state
            .require(identity)?
            .password
            .as_deref()
            .is_some_and(|stored| stored == password))
    }

    async fn update_credential(&self, identity: &IdentityObject, password: &str) -> Result<()> {
        self.check_credentials(identity)?;
        let mut state = self.state.write();
        state.entry_mut(&identity.id)?.password = Some(password.to_string());
        Ok(())
    }
}

fn filter_names(names: Vec<String>, criteria: &SearchCriteria) -> Vec<String> {
    let mut names: Vec<String> = names
        .into_iter()
        .filter(|n| criteria.matches_name(n))
        .collect();
    if let Some(order) = criteria.sort {
        names.sort_by(|a, b| order.apply(compare_ignore_case(a, b)));
    }
    criteria.apply_page(names)
}
