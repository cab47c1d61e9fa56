//! Engine-side application of search criteria.
//!
//! Results assembled from several store calls (cascades, merged query
//! dimensions) cannot be filtered, sorted and paged by the store. The
//! [`CriteriaApplier`] applies the same modifiers once, to the final list.

use idm_core::Result;
use idm_model::criteria::compare_ignore_case;
use idm_model::{Attributes, IdentityObject, Role, SearchCriteria};
use idm_store::IdentityStore;

/// Applies search criteria to already resolved identity objects.
#[derive(Clone, Copy)]
pub struct CriteriaApplier<'a> {
    store: &'a dyn IdentityStore,
}

impl<'a> CriteriaApplier<'a> {
    /// Creates an applier reading attributes from a store.
    #[must_use]
    pub const fn new(store: &'a dyn IdentityStore) -> Self {
        Self { store }
    }

    /// Filters, sorts and pages a list of identity objects.
    ///
    /// Attributes are only read from the store when an attribute filter or
    /// an attribute sort is in use.
    ///
    /// ## Errors
    ///
    /// Returns an error if reading attributes fails.
    pub async fn apply(
        &self,
        objects: Vec<IdentityObject>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        if criteria.is_empty() {
            return Ok(objects);
        }

        let named = objects
            .into_iter()
            .filter(|o| criteria.matches_name(&o.name));

        let mut kept: Vec<IdentityObject> = if criteria.needs_attributes() {
            let mut with_attributes: Vec<(IdentityObject, Attributes)> = Vec::new();
            for object in named {
                let attributes = self.store.attributes(&object).await?;
                if criteria.attribute_filters.is_empty() || criteria.matches_attributes(&attributes) {
                    with_attributes.push((object, attributes));
                }
            }

            if let Some(attribute) = &criteria.sort_attribute {
                let order = criteria.sort.unwrap_or_default();
                let first = |attributes: &Attributes| {
                    attributes
                        .get(attribute)
                        .and_then(|v| v.first().cloned())
                        .unwrap_or_default()
                };
                with_attributes.sort_by(|(_, a), (_, b)| {
                    order.apply(compare_ignore_case(&first(a), &first(b)))
                });
            }

            with_attributes.into_iter().map(|(o, _)| o).collect()
        } else {
            named.collect()
        };

        if criteria.sort_attribute.is_none() {
            criteria.sort_by_name(&mut kept);
        }

        Ok(criteria.apply_page(kept))
    }
}

/// Filters, sorts and pages plain names such as role type names.
#[must_use]
pub fn apply_to_names(names: Vec<String>, criteria: &SearchCriteria) -> Vec<String> {
    let mut kept: Vec<String> = names
        .into_iter()
        .filter(|n| criteria.matches_name(n))
        .collect();
    if let Some(order) = criteria.sort {
        kept.sort_by(|a, b| order.apply(compare_ignore_case(a, b)));
    }
    criteria.apply_page(kept)
}

/// Filters, sorts and pages roles by role type name.
///
/// Ties are broken by group key and user id so that paging is stable.
#[must_use]
pub fn apply_to_roles(roles: Vec<Role>, criteria: &SearchCriteria) -> Vec<Role> {
    let mut kept: Vec<Role> = roles
        .into_iter()
        .filter(|r| criteria.matches_name(r.role_type().name()))
        .collect();
    if let Some(order) = criteria.sort {
        kept.sort_by(|a, b| {
            order.apply(
                compare_ignore_case(a.role_type().name(), b.role_type().name())
                    .then_with(|| a.group().key().to_string().cmp(&b.group().key().to_string()))
                    .then_with(|| a.user().id().cmp(b.user().id())),
            )
        });
    }
    criteria.apply_page(kept)
}
