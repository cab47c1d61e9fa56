//! Identity store provider trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use idm_core::{Error, Result};
use idm_model::{
    Attributes, Direction, IdentityObject, IdentityObjectRelationship, IdentityObjectType,
    RelationshipKind, SearchCriteria,
};

use crate::features::FeaturesDescription;

/// Provider for identity storage operations.
///
/// Implementations must be thread-safe and support concurrent access.
/// Lookups that find nothing return `None` or an empty collection; errors are
/// reserved for invalid input, missing capabilities and store failures.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Returns the store identifier (also used as the cache namespace).
    fn id(&self) -> &str;

    /// Returns what this store supports.
    fn features(&self) -> &FeaturesDescription;

    // === Identity objects ===

    /// Creates an identity object.
    ///
    /// ## Errors
    ///
    /// Returns `AlreadyExists` if an object with the same name and type exists.
    async fn create_identity_object(
        &self,
        name: &str,
        object_type: &IdentityObjectType,
        attributes: &Attributes,
    ) -> Result<IdentityObject>;

    /// Removes an identity object and every relationship it takes part in.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the object does not exist.
    async fn remove_identity_object(&self, identity: &IdentityObject) -> Result<()>;

    /// Counts identity objects of a type.
    async fn identity_object_count(&self, object_type: &IdentityObjectType) -> Result<usize>;

    /// Finds an identity object by name and type.
    async fn find_identity_object(
        &self,
        name: &str,
        object_type: &IdentityObjectType,
    ) -> Result<Option<IdentityObject>>;

    /// Finds an identity object by its store-specific id.
    async fn find_identity_object_by_id(&self, id: &str) -> Result<Option<IdentityObject>>;

    /// Finds identity objects of a type matching criteria.
    async fn find_identity_objects(
        &self,
        object_type: &IdentityObjectType,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>>;

    /// Finds the one-hop neighbourhood of an identity.
    ///
    /// `direction` names what is searched for: [`Direction::Children`]
    /// returns the objects the identity holds, [`Direction::Parents`] the
    /// objects holding it. `target_type` restricts the result type.
    async fn find_related_identity_objects(
        &self,
        identity: &IdentityObject,
        kind: RelationshipKind,
        direction: Direction,
        target_type: Option<&IdentityObjectType>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>>;

    // === Relationships ===

    /// Creates a relationship from parent `from` to child `to`.
    ///
    /// `create_names` creates a missing relationship name instead of failing.
    async fn create_relationship(
        &self,
        from: &IdentityObject,
        to: &IdentityObject,
        kind: RelationshipKind,
        name: Option<&str>,
        create_names: bool,
    ) -> Result<IdentityObjectRelationship>;

    /// Removes a relationship.
    async fn remove_relationship(
        &self,
        from: &IdentityObject,
        to: &IdentityObject,
        kind: RelationshipKind,
        name: Option<&str>,
    ) -> Result<()>;

    /// Removes all relationships between two identities, in both directions.
    ///
    /// Named relationships are only removed when `named` is set.
    async fn remove_relationships(
        &self,
        first: &IdentityObject,
        second: &IdentityObject,
        named: bool,
    ) -> Result<()>;

    /// Lists the relationships from `from` to `to`, optionally of one kind.
    async fn resolve_relationships(
        &self,
        from: &IdentityObject,
        to: &IdentityObject,
        kind: Option<RelationshipKind>,
    ) -> Result<Vec<IdentityObjectRelationship>>;

    // === Relationship names (role types) ===

    /// Creates a relationship name.
    async fn create_relationship_name(&self, name: &str) -> Result<String>;

    /// Removes a relationship name and the relationships using it.
    async fn remove_relationship_name(&self, name: &str) -> Result<()>;

    /// Lists relationship names matching criteria.
    async fn relationship_names(&self, criteria: &SearchCriteria) -> Result<Vec<String>>;

    /// Lists the names of relationships an identity takes part in.
    async fn relationship_names_of(
        &self,
        identity: &IdentityObject,
        criteria: &SearchCriteria,
    ) -> Result<Vec<String>>;

    /// Returns the properties attached to a relationship name.
    async fn relationship_name_properties(&self, name: &str) -> Result<BTreeMap<String, String>> {
        Err(Error::not_supported(format!(
            "relationship name properties ('{name}') on store '{}'",
            self.id()
        )))
    }

    /// Replaces the properties attached to a relationship name.
    async fn set_relationship_name_properties(
        &self,
        name: &str,
        _properties: &BTreeMap<String, String>,
    ) -> Result<()> {
        Err(Error::not_supported(format!(
            "relationship name properties ('{name}') on store '{}'",
            self.id()
        )))
    }

    // === Attributes ===

    /// Returns the attributes of an identity.
    async fn attributes(&self, identity: &IdentityObject) -> Result<Attributes>;

    /// Returns one attribute of an identity.
    async fn attribute(&self, identity: &IdentityObject, name: &str) -> Result<Option<Vec<String>>> {
        let mut attributes = self.attributes(identity).await?;
        Ok(attributes.remove(name))
    }

    /// Adds values to attributes, keeping existing values.
    async fn add_attributes(&self, identity: &IdentityObject, attributes: &Attributes)
        -> Result<()>;

    /// Replaces attribute values.
    async fn update_attributes(
        &self,
        identity: &IdentityObject,
        attributes: &Attributes,
    ) -> Result<()>;

    /// Removes attributes.
    async fn remove_attributes(&self, identity: &IdentityObject, names: &[String]) -> Result<()>;

    /// Finds the single identity holding a unique attribute value.
    ///
    /// ## Errors
    ///
    /// Returns `DataInconsistency` if more than one identity holds the value.
    async fn find_identity_object_by_unique_attribute(
        &self,
        object_type: &IdentityObjectType,
        name: &str,
        value: &str,
    ) -> Result<Option<IdentityObject>>;

    // === Credentials ===

    /// Validates a password credential.
    async fn validate_credential(&self, identity: &IdentityObject, password: &str) -> Result<bool>;

    /// Replaces a password credential.
    async fn update_credential(&self, identity: &IdentityObject, password: &str) -> Result<()>;
}
