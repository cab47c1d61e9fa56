//! Cascading relationship resolution over the membership graph.
//!
//! One-hop lookups go straight to the store. Cascades compute the transitive
//! closure with an explicit worklist and a visited set, so cyclic graphs
//! terminate and deep hierarchies do not grow the call stack. Criteria are
//! applied once to the flattened result, never per hop.

use std::collections::HashSet;

use idm_core::Result;
use idm_model::{Direction, IdentityObject, IdentityObjectType, RelationshipKind, SearchCriteria};
use idm_store::IdentityStore;

use crate::criteria::CriteriaApplier;

/// Resolves group and user neighbourhoods, directly or transitively.
#[derive(Clone, Copy)]
pub struct RelationshipResolver<'a> {
    store: &'a dyn IdentityStore,
    user_type: &'a IdentityObjectType,
}

impl<'a> RelationshipResolver<'a> {
    /// Creates a resolver over a store. `user_type` marks the leaves of the
    /// group graph.
    #[must_use]
    pub const fn new(store: &'a dyn IdentityStore, user_type: &'a IdentityObjectType) -> Self {
        Self { store, user_type }
    }

    /// Finds the groups one membership hop away from an identity.
    ///
    /// Without a `group_type`, every non-user type is returned.
    ///
    /// ## Errors
    ///
    /// Returns store failures and unsupported criteria.
    pub async fn groups(
        &self,
        start: &IdentityObject,
        direction: Direction,
        group_type: Option<&IdentityObjectType>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        if group_type.is_some() {
            return self
                .store
                .find_related_identity_objects(start, RelationshipKind::Member, direction, group_type, criteria)
                .await;
        }

        let hop = self.group_hop(start, direction).await?;
        CriteriaApplier::new(self.store).apply(hop, criteria).await
    }

    /// Finds every group reachable from `start` by following membership
    /// edges in one direction.
    ///
    /// Each group appears once. The start group is only reported when a
    /// cycle leads back to it, and it is not expanded a second time. The
    /// cycle back to the start counts as the separate non-trivial path
    /// that reaches it, so it is listed once like any other group.
    /// Traversal passes through groups of every type; `group_type` only
    /// filters the output.
    ///
    /// ## Errors
    ///
    /// Returns the first store failure; no partial result is returned.
    pub async fn cascade_groups(
        &self,
        start: &IdentityObject,
        direction: Direction,
        group_type: Option<&IdentityObjectType>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        let mut visited: HashSet<String> = HashSet::from([start.id.clone()]);
        let mut start_reached = false;
        let mut output: Vec<IdentityObject> = Vec::new();
        let mut worklist: Vec<IdentityObject> = vec![start.clone()];

        while let Some(node) = worklist.pop() {
            let hop = self.group_hop(&node, direction).await?;
            // Reverse so the first neighbour is expanded first.
            for next in hop.into_iter().rev() {
                if next.id == start.id {
                    if !start_reached {
                        start_reached = true;
                        output.push(next);
                    }
                    continue;
                }
                if visited.insert(next.id.clone()) {
                    output.push(next.clone());
                    worklist.push(next);
                }
            }
        }

        tracing::trace!(
            start = %start.name,
            ?direction,
            visited = visited.len(),
            "Cascaded group resolution"
        );

        let output: Vec<IdentityObject> = match group_type {
            Some(t) => output.into_iter().filter(|o| o.is_of_type(t)).collect(),
            None => output,
        };
        CriteriaApplier::new(self.store).apply(output, criteria).await
    }

    /// Finds the users of a group, optionally including the users of every
    /// group below it.
    ///
    /// ## Errors
    ///
    /// Returns store failures and unsupported criteria.
    pub async fn users_of(
        &self,
        group: &IdentityObject,
        cascade: bool,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        if !cascade {
            return self.direct_users(group, criteria).await;
        }

        let unfiltered = SearchCriteria::default();
        let mut users = self.direct_users(group, &unfiltered).await?;
        let closure = self
            .cascade_groups(group, Direction::Children, None, &unfiltered)
            .await?;
        for member_group in &closure {
            union_into(&mut users, self.direct_users(member_group, &unfiltered).await?);
        }

        CriteriaApplier::new(self.store).apply(users, criteria).await
    }

    /// Finds the groups holding an identity, optionally including every
    /// group above them.
    ///
    /// With `cascade`, `group_type` filters the output only; groups of other
    /// types are still traversed.
    ///
    /// ## Errors
    ///
    /// Returns store failures and unsupported criteria.
    pub async fn groups_of(
        &self,
        identity: &IdentityObject,
        group_type: Option<&IdentityObjectType>,
        cascade: bool,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        if !cascade {
            return self
                .groups(identity, Direction::Parents, group_type, criteria)
                .await;
        }

        let unfiltered = SearchCriteria::default();
        let direct = self.group_hop(identity, Direction::Parents).await?;
        let mut groups = direct.clone();
        for parent in &direct {
            let above = self
                .cascade_groups(parent, Direction::Parents, None, &unfiltered)
                .await?;
            union_into(&mut groups, above);
        }

        let groups: Vec<IdentityObject> = match group_type {
            Some(t) => groups.into_iter().filter(|o| o.is_of_type(t)).collect(),
            None => groups,
        };
        CriteriaApplier::new(self.store).apply(groups, criteria).await
    }

    async fn direct_users(
        &self,
        group: &IdentityObject,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        self.store
            .find_related_identity_objects(
                group,
                RelationshipKind::Member,
                Direction::Children,
                Some(self.user_type),
                criteria,
            )
            .await
    }

    async fn group_hop(
        &self,
        start: &IdentityObject,
        direction: Direction,
    ) -> Result<Vec<IdentityObject>> {
        let hop = self
            .store
            .find_related_identity_objects(
                start,
                RelationshipKind::Member,
                direction,
                None,
                &SearchCriteria::default(),
            )
            .await?;
        Ok(hop
            .into_iter()
            .filter(|o| !o.is_of_type(self.user_type))
            .collect())
    }
}

/// Appends the values not yet present, keeping first-seen order.
pub fn union_into<T: PartialEq>(target: &mut Vec<T>, more: Vec<T>) {
    for item in more {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use idm_model::{Attributes, SortOrder};
    use idm_store::MemoryIdentityStore;

    use super::*;

    struct Graph {
        store: MemoryIdentityStore,
        user_type: IdentityObjectType,
    }

    impl Graph {
        fn new() -> Self {
            Self {
                store: MemoryIdentityStore::for_types("mem", "USER", &["ORG", "OU"]),
                user_type: IdentityObjectType::new("USER"),
            }
        }

        fn resolver(&self) -> RelationshipResolver<'_> {
            RelationshipResolver::new(&self.store, &self.user_type)
        }

        async fn node(&self, name: &str, object_type: &str) -> IdentityObject {
            self.store
                .create_identity_object(name, &IdentityObjectType::new(object_type), &Attributes::new())
                .await
                .unwrap()
        }

        async fn link(&self, parent: &IdentityObject, child: &IdentityObject) {
            self.store
                .create_relationship(parent, child, RelationshipKind::Member, None, false)
                .await
                .unwrap();
        }
    }

    fn names(objects: &[IdentityObject]) -> Vec<&str> {
        let mut names: Vec<&str> = objects.iter().map(|o| o.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    #[tokio::test]
    async fn one_hop_excludes_users() {
        let graph = Graph::new();
        let org = graph.node("org", "ORG").await;
        let ou = graph.node("ou", "OU").await;
        let user = graph.node("alice", "USER").await;
        graph.link(&org, &ou).await;
        graph.link(&org, &user).await;

        let children = graph
            .resolver()
            .groups(&org, Direction::Children, None, &SearchCriteria::new())
            .await
            .unwrap();
        assert_eq!(names(&children), ["ou"]);
    }

    #[tokio::test]
    async fn cycle_terminates_and_reports_each_node_once() {
        let graph = Graph::new();
        let a = graph.node("a", "OU").await;
        let b = graph.node("b", "OU").await;
        let c = graph.node("c", "OU").await;
        graph.link(&a, &b).await;
        graph.link(&b, &c).await;
        graph.link(&c, &a).await;

        let closure = graph
            .resolver()
            .cascade_groups(&a, Direction::Children, None, &SearchCriteria::new())
            .await
            .unwrap();
        assert_eq!(names(&closure), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn acyclic_cascade_omits_start_and_filters_output_type() {
        let graph = Graph::new();
        let root = graph.node("root", "ORG").await;
        let mid = graph.node("mid", "ORG").await;
        let leaf = graph.node("leaf", "OU").await;
        graph.link(&root, &mid).await;
        graph.link(&mid, &leaf).await;
        graph.link(&root, &leaf).await;

        let resolver = graph.resolver();
        let all = resolver
            .cascade_groups(&root, Direction::Children, None, &SearchCriteria::new())
            .await
            .unwrap();
        assert_eq!(names(&all), ["leaf", "mid"]);

        let ou = IdentityObjectType::new("OU");
        let only_ou = resolver
            .cascade_groups(&root, Direction::Children, Some(&ou), &SearchCriteria::new())
            .await
            .unwrap();
        assert_eq!(names(&only_ou), ["leaf"]);

        let up = resolver
            .cascade_groups(&leaf, Direction::Parents, None, &SearchCriteria::new())
            .await
            .unwrap();
        assert_eq!(names(&up), ["mid", "root"]);
    }

    #[tokio::test]
    async fn criteria_apply_to_the_flattened_closure() {
        let graph = Graph::new();
        let root = graph.node("root", "ORG").await;
        let mut previous = root.clone();
        for name in ["n1", "n2", "n3", "n4"] {
            let next = graph.node(name, "OU").await;
            graph.link(&previous, &next).await;
            previous = next;
        }

        let criteria = SearchCriteria::new()
            .sorted(SortOrder::Descending)
            .paged(0, 2);
        let closure = graph
            .resolver()
            .cascade_groups(&root, Direction::Children, None, &criteria)
            .await
            .unwrap();
        let ordered: Vec<&str> = closure.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(ordered, ["n4", "n3"]);
    }

    #[tokio::test]
    async fn users_cascade_through_subgroups() {
        let graph = Graph::new();
        let org = graph.node("org", "ORG").await;
        let ou = graph.node("ou", "OU").await;
        let alice = graph.node("alice", "USER").await;
        let bob = graph.node("bob", "USER").await;
        graph.link(&org, &ou).await;
        graph.link(&org, &alice).await;
        graph.link(&ou, &bob).await;
        graph.link(&ou, &alice).await;

        let resolver = graph.resolver();
        let direct = resolver
            .users_of(&org, false, &SearchCriteria::new())
            .await
            .unwrap();
        assert_eq!(names(&direct), ["alice"]);

        let all = resolver
            .users_of(&org, true, &SearchCriteria::new())
            .await
            .unwrap();
        assert_eq!(names(&all), ["alice", "bob"]);

        let groups = resolver
            .groups_of(&bob, None, true, &SearchCriteria::new())
            .await
            .unwrap();
        assert_eq!(names(&groups), ["org", "ou"]);
    }

    #[test]
    fn union_skips_present_values() {
        let mut target = vec![1, 2];
        union_into(&mut target, vec![2, 3, 1, 4]);
        assert_eq!(target, [1, 2, 3, 4]);
    }
}
