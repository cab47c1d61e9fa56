//! Store capability description.
//!
//! The engine consults the description before issuing a request and fails
//! fast with a typed error instead of letting the store reject it later.

use std::collections::{BTreeMap, BTreeSet};

use idm_core::{Error, Result};
use idm_model::{CriteriaKind, IdentityObjectType, RelationshipKind, SearchCriteria};
use serde::{Deserialize, Serialize};

/// What a store supports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturesDescription {
    types: BTreeSet<String>,
    criteria: BTreeMap<String, BTreeSet<CriteriaKind>>,
    relationships: BTreeSet<(String, String, RelationshipKind)>,
    named_relationships: bool,
    relationship_name_properties: bool,
    credentials: BTreeSet<String>,
}

impl FeaturesDescription {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> FeaturesDescriptionBuilder {
        FeaturesDescriptionBuilder::default()
    }

    /// Returns the supported identity object type names.
    #[must_use]
    pub const fn supported_types(&self) -> &BTreeSet<String> {
        &self.types
    }

    /// Checks whether a type is stored.
    #[must_use]
    pub fn is_type_supported(&self, object_type: &IdentityObjectType) -> bool {
        self.types.contains(object_type.name())
    }

    /// Checks whether a criteria kind is supported for a type.
    #[must_use]
    pub fn is_criteria_supported(&self, object_type: &IdentityObjectType, kind: CriteriaKind) -> bool {
        self.criteria
            .get(object_type.name())
            .is_some_and(|kinds| kinds.contains(&kind))
    }

    /// Checks whether a relationship between two types is supported.
    #[must_use]
    pub fn is_relationship_supported(
        &self,
        from: &IdentityObjectType,
        to: &IdentityObjectType,
        kind: RelationshipKind,
    ) -> bool {
        self.relationships
            .contains(&(from.name().to_string(), to.name().to_string(), kind))
    }

    /// Checks whether a relationship kind is supported for any pair of types.
    #[must_use]
    pub fn is_relationship_kind_supported(&self, kind: RelationshipKind) -> bool {
        self.relationships.iter().any(|(_, _, k)| *k == kind)
    }

    /// Returns the types that may be parents of `child` through `kind`.
    #[must_use]
    pub fn parent_types_of(&self, child: &IdentityObjectType, kind: RelationshipKind) -> Vec<IdentityObjectType> {
        self.relationships
            .iter()
            .filter(|(_, to, k)| to == child.name() && *k == kind)
            .map(|(from, _, _)| IdentityObjectType::new(from.clone()))
            .collect()
    }

    /// Checks whether named relationships are supported.
    #[must_use]
    pub const fn is_named_relationships_supported(&self) -> bool {
        self.named_relationships
    }

    /// Checks whether relationship names carry properties.
    #[must_use]
    pub const fn is_relationship_name_properties_supported(&self) -> bool {
        self.relationship_name_properties
    }

    /// Checks whether credentials are supported for a type.
    #[must_use]
    pub fn is_credential_supported(&self, object_type: &IdentityObjectType) -> bool {
        self.credentials.contains(object_type.name())
    }

    /// Fails if any criterium in use is unsupported for the type.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedCriterium` naming the first unsupported kind.
    pub fn check_criteria(&self, object_type: &IdentityObjectType, criteria: &SearchCriteria) -> Result<()> {
        for kind in criteria.kinds() {
            if !self.is_criteria_supported(object_type, kind) {
                return Err(Error::unsupported_criterium(format!(
                    "{kind:?} for identity type '{object_type}'"
                )));
            }
        }
        Ok(())
    }

    /// Fails if a relationship is unsupported.
    ///
    /// ## Errors
    ///
    /// Returns `OperationNotSupported` if the triple is not supported.
    pub fn check_relationship(
        &self,
        from: &IdentityObjectType,
        to: &IdentityObjectType,
        kind: RelationshipKind,
    ) -> Result<()> {
        if self.is_relationship_supported(from, to, kind) {
            Ok(())
        } else {
            Err(Error::not_supported(format!(
                "{kind} relationship from '{from}' to '{to}'"
            )))
        }
    }

    /// Fails if named relationships are unsupported.
    ///
    /// ## Errors
    ///
    /// Returns `OperationNotSupported`.
    pub fn check_named_relationships(&self) -> Result<()> {
        if self.named_relationships {
            Ok(())
        } else {
            Err(Error::not_supported("named relationships"))
        }
    }
}

/// Builder for [`FeaturesDescription`].
#[derive(Debug, Default)]
pub struct FeaturesDescriptionBuilder {
    inner: FeaturesDescription,
}

impl FeaturesDescriptionBuilder {
    /// Adds a supported type with the criteria kinds it supports.
    #[must_use]
    pub fn identity_type(
        mut self,
        name: impl Into<String>,
        criteria: impl IntoIterator<Item = CriteriaKind>,
    ) -> Self {
        let name = name.into();
        self.inner
            .criteria
            .insert(name.clone(), criteria.into_iter().collect());
        self.inner.types.insert(name);
        self
    }

    /// Adds a supported relationship.
    #[must_use]
    pub fn relationship(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        kind: RelationshipKind,
    ) -> Self {
        self.inner
            .relationships
            .insert((from.into(), to.into(), kind));
        self
    }

    /// Sets named relationship support.
    #[must_use]
    pub const fn named_relationships(mut self, supported: bool) -> Self {
        self.inner.named_relationships = supported;
        self
    }

    /// Sets relationship name property support.
    #[must_use]
    pub const fn relationship_name_properties(mut self, supported: bool) -> Self {
        self.inner.relationship_name_properties = supported;
        self
    }

    /// Marks a type as supporting credentials.
    #[must_use]
    pub fn credentials(mut self, type_name: impl Into<String>) -> Self {
        self.inner.credentials.insert(type_name.into());
        self
    }

    /// Builds the description.
    #[must_use]
    pub fn build(self) -> FeaturesDescription {
        self.inner
    }
}

/// All criteria kinds.
pub const ALL_CRITERIA: [CriteriaKind; 5] = [
    CriteriaKind::Sort,
    CriteriaKind::SortByAttribute,
    CriteriaKind::Page,
    CriteriaKind::AttributeFilter,
    CriteriaKind::NameFilter,
];

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> FeaturesDescription {
        FeaturesDescription::builder()
            .identity_type("USER", [CriteriaKind::Sort, CriteriaKind::Page])
            .identity_type("OU", ALL_CRITERIA)
            .relationship("OU", "USER", RelationshipKind::Member)
            .relationship("OU", "OU", RelationshipKind::Member)
            .credentials("USER")
            .build()
    }

    #[test]
    fn criteria_checks() {
        let features = features();
        let user = IdentityObjectType::new("USER");

        assert!(features
            .check_criteria(&user, &SearchCriteria::new().paged(0, 5))
            .is_ok());

        let err = features
            .check_criteria(&user, &SearchCriteria::new().name_filter("a*"))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedCriterium(_)));
    }

    #[test]
    fn relationship_checks() {
        let features = features();
        let user = IdentityObjectType::new("USER");
        let ou = IdentityObjectType::new("OU");

        assert!(features
            .check_relationship(&ou, &user, RelationshipKind::Member)
            .is_ok());
        assert!(matches!(
            features.check_relationship(&user, &ou, RelationshipKind::Member),
            Err(Error::OperationNotSupported(_))
        ));
        assert!(!features.is_relationship_kind_supported(RelationshipKind::Role));
        assert!(matches!(
            features.check_named_relationships(),
            Err(Error::OperationNotSupported(_))
        ));
        assert_eq!(features.parent_types_of(&user, RelationshipKind::Member), vec![ou]);
        assert!(features.is_credential_supported(&user));
    }
}
