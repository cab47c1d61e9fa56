//! Query builders and executors.
//!
//! A builder is a mutable, reusable accumulator of filter dimensions plus
//! shared [`SearchCriteria`]. [`create_query`](UserQueryBuilder::create_query)
//! snapshots it into an immutable query value that a session runs.
//!
//! ## Resolution
//!
//! Each populated dimension is resolved on its own into a candidate list.
//! Set-valued dimensions resolve every seed and union the results. The lists
//! are then AND-merged, keeping the order of the first populated dimension.
//! When exactly one dimension is populated its resolution receives the
//! criteria directly; otherwise the criteria are applied once to the merged
//! list, so paging is never applied to intermediate results.

mod group;
mod role;
mod user;

use async_trait::async_trait;
use idm_core::error::require_non_blank;
use idm_core::{Error, Result};
use idm_model::{Direction, IdentityObject, IdentityObjectType, SearchCriteria, SortOrder};

use crate::attribute::Subject;
use crate::criteria::CriteriaApplier;
use crate::resolver::union_into;
use crate::session::IdentitySession;

pub use group::{GroupQuery, GroupQueryBuilder};
pub use role::{RoleQuery, RoleQueryBuilder};
pub use user::{UserQuery, UserQueryBuilder};

/// An immutable query a session can run.
#[async_trait]
pub trait Query: Send + Sync {
    /// Result element.
    type Item: Send;

    /// Resolves the query against a session's store.
    ///
    /// ## Errors
    ///
    /// Returns `Query` errors for queries without a defined resolution and
    /// every store error met on the way.
    async fn execute(&self, session: &IdentitySession) -> Result<Vec<Self::Item>>;
}

// ============================================================================
// Shared criteria setters
// ============================================================================

/// Secondary modifiers shared by every query builder.
pub trait QueryBuilder {
    /// Gives access to the criteria being accumulated.
    fn criteria_mut(&mut self) -> &mut SearchCriteria;

    /// Sorts results by name, or by the sort attribute when one is set.
    fn sort(&mut self, order: SortOrder) -> &mut Self
    where
        Self: Sized,
    {
        self.criteria_mut().sort = Some(order);
        self
    }

    /// Sorts results by the first value of an attribute.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a blank name.
    fn sort_attribute_name(&mut self, name: &str) -> Result<&mut Self>
    where
        Self: Sized,
    {
        require_non_blank(name, "sort attribute name")?;
        self.criteria_mut().sort_attribute = Some(name.to_string());
        Ok(self)
    }

    /// Returns the window `[first_result, first_result + max_results)`.
    ///
    /// A `max_results` of zero means no upper bound.
    fn page(&mut self, first_result: usize, max_results: usize) -> &mut Self
    where
        Self: Sized,
    {
        let criteria = std::mem::take(self.criteria_mut());
        *self.criteria_mut() = criteria.paged(first_result, max_results);
        self
    }

    /// Requires an attribute to hold values matching every pattern.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a blank name or an empty value list.
    fn attribute_values_filter(&mut self, name: &str, values: &[&str]) -> Result<&mut Self>
    where
        Self: Sized,
    {
        require_non_blank(name, "attribute name")?;
        if values.is_empty() {
            return Err(Error::illegal_argument(format!(
                "attribute filter '{name}' needs at least one value"
            )));
        }
        self.criteria_mut()
            .attribute_filters
            .insert(name.to_string(), values.iter().map(|v| (*v).to_string()).collect());
        Ok(self)
    }

    /// Filters results by a wildcard pattern on their name.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a blank pattern.
    fn id_filter(&mut self, pattern: &str) -> Result<&mut Self>
    where
        Self: Sized,
    {
        require_non_blank(pattern, "id filter")?;
        self.criteria_mut().name_filter = Some(pattern.to_string());
        Ok(self)
    }
}

// ============================================================================
// Dimension resolution
// ============================================================================

/// How one dimension turns a seed into candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dimension {
    /// Users of a seed group, optionally through its subgroups.
    UsersOf { cascade: bool },
    /// Users holding any role in a seed group.
    RoleUsersOf,
    /// Groups one membership hop away from a seed group.
    GroupsAround(Direction),
    /// Groups holding a seed user, optionally transitively.
    GroupsOf { cascade: bool },
    /// Groups in which a seed user holds any role.
    RoleGroupsOf,
}

/// Resolves dimensions for one query.
pub(crate) struct DimensionResolver<'s> {
    session: &'s IdentitySession,
    group_type: Option<IdentityObjectType>,
}

impl<'s> DimensionResolver<'s> {
    /// `group_type` restricts every group-valued dimension.
    pub(crate) const fn new(session: &'s IdentitySession, group_type: Option<IdentityObjectType>) -> Self {
        Self { session, group_type }
    }

    /// Resolves a set-valued dimension: the union of every seed's candidates.
    ///
    /// A single seed receives the criteria; several seeds are resolved
    /// without them and the criteria are applied to the union. Seeds missing
    /// from the store contribute nothing.
    pub(crate) async fn resolve(
        &self,
        dimension: Dimension,
        seeds: &[Subject<'_>],
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        let unfiltered = SearchCriteria::default();
        let per_seed = if seeds.len() == 1 { criteria } else { &unfiltered };

        let mut candidates = Vec::new();
        for seed in seeds {
            let Some(object) = self.seed_object(seed).await? else {
                continue;
            };
            union_into(&mut candidates, self.resolve_seed(dimension, &object, per_seed).await?);
        }

        if seeds.len() > 1 {
            candidates = CriteriaApplier::new(self.session.store())
                .apply(candidates, criteria)
                .await?;
        }
        Ok(candidates)
    }

    /// Resolves a lookup dimension holding at most one object.
    pub(crate) async fn lookup(
        &self,
        found: Option<IdentityObject>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        let found: Vec<IdentityObject> = found
            .into_iter()
            .filter(|o| self.group_type.as_ref().map_or(true, |t| o.is_of_type(t)))
            .collect();
        CriteriaApplier::new(self.session.store())
            .apply(found, criteria)
            .await
    }

    async fn seed_object(&self, seed: &Subject<'_>) -> Result<Option<IdentityObject>> {
        match seed {
            Subject::User(user) => self.session.user_object(user).await,
            Subject::Group(group) => self.session.group_object(group).await,
        }
    }

    async fn resolve_seed(
        &self,
        dimension: Dimension,
        seed: &IdentityObject,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        let resolver = self.session.resolver();
        let group_type = self.group_type.as_ref();
        match dimension {
            Dimension::UsersOf { cascade } => resolver.users_of(seed, cascade, criteria).await,
            Dimension::RoleUsersOf => {
                self.session
                    .roles()
                    .role_neighbours(seed, Direction::Children, Some(self.session.user_type()), criteria)
                    .await
            }
            Dimension::GroupsAround(direction) => {
                resolver.groups(seed, direction, group_type, criteria).await
            }
            Dimension::GroupsOf { cascade } => {
                resolver.groups_of(seed, group_type, cascade, criteria).await
            }
            Dimension::RoleGroupsOf => {
                self.session
                    .roles()
                    .role_neighbours(seed, Direction::Parents, group_type, criteria)
                    .await
            }
        }
    }
}

/// AND-merge of candidate lists, ordered by the first list added.
#[derive(Debug)]
pub(crate) struct DimensionMerge<T> {
    merged: Option<Vec<T>>,
}

impl<T: PartialEq> DimensionMerge<T> {
    pub(crate) const fn new() -> Self {
        Self { merged: None }
    }

    /// Intersects the accumulator with another dimension's candidates.
    pub(crate) fn add(&mut self, candidates: Vec<T>) {
        match &mut self.merged {
            None => self.merged = Some(candidates),
            Some(merged) => merged.retain(|item| candidates.contains(item)),
        }
    }

    /// Returns the merged list; empty if nothing was added.
    pub(crate) fn finish(self) -> Vec<T> {
        self.merged.unwrap_or_default()
    }
}

/// Adds a seed to a dimension unless already present.
pub(crate) fn push_unique<T: PartialEq>(values: &mut Vec<T>, value: T) {
    if !values.contains(&value) {
        values.push(value);
    }
}

/// Criteria handed to dimension resolution: all of them when a single
/// dimension is populated, none otherwise.
pub(crate) fn pushed_criteria(populated: usize, criteria: &SearchCriteria) -> SearchCriteria {
    if populated == 1 {
        criteria.clone()
    } else {
        SearchCriteria::default()
    }
}

/// Applies criteria to a merged list unless a single dimension already did.
pub(crate) async fn finish_merge(
    session: &IdentitySession,
    merge: DimensionMerge<IdentityObject>,
    populated: usize,
    criteria: &SearchCriteria,
) -> Result<Vec<IdentityObject>> {
    let merged = merge.finish();
    if populated == 1 {
        return Ok(merged);
    }
    CriteriaApplier::new(session.store())
        .apply(merged, criteria)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_first_dimension_order() {
        let mut merge = DimensionMerge::new();
        merge.add(vec!["c", "a", "b", "d"]);
        merge.add(vec!["a", "b", "c"]);
        merge.add(vec!["b", "c", "x"]);
        assert_eq!(merge.finish(), ["c", "b"]);
    }

    #[test]
    fn merge_membership_is_commutative() {
        let first = vec![1, 2, 3, 4];
        let second = vec![4, 3, 9];

        let mut forward = DimensionMerge::new();
        forward.add(first.clone());
        forward.add(second.clone());
        let mut backward = DimensionMerge::new();
        backward.add(second);
        backward.add(first);

        let mut forward = forward.finish();
        let mut backward = backward.finish();
        forward.sort_unstable();
        backward.sort_unstable();
        assert_eq!(forward, backward);
    }

    #[test]
    fn empty_merge_is_empty() {
        assert!(DimensionMerge::<u8>::new().finish().is_empty());
    }

    #[test]
    fn criteria_only_pushed_to_a_single_dimension() {
        let criteria = SearchCriteria::new().paged(0, 1);
        assert_eq!(pushed_criteria(1, &criteria), criteria);
        assert!(pushed_criteria(2, &criteria).is_empty());
    }
}
