//! Membership edges mapped onto directory attributes.
//!
//! A parent type may record its children in a child membership attribute
//! (e.g. `member` on a group entry) and a child type may record its parents
//! in a parent membership attribute (e.g. `memberOf` on a person entry).
//! Reads use the attribute on the identity itself when it is declared and
//! writable; otherwise they fall back to a reverse scan of every type that
//! may sit on the other side of the edge.

use idm_model::{Attributes, Direction, IdentityObject, IdentityObjectType};

use crate::config::{LdapStoreConfig, LdapTypeConfig, MembershipAttribute};
use crate::directory::Modification;
use crate::dn;
use crate::error::{LdapError, LdapResult};
use crate::filter::Filter;
use crate::search::{LdapEntry, LdapSearcher};

/// Builds the identity object of an entry of a known type.
#[must_use]
pub fn entry_identity(type_name: &str, type_config: &LdapTypeConfig, entry: &LdapEntry) -> IdentityObject {
    let name = entry
        .get_attr(&type_config.id_attribute)
        .map(String::from)
        .or_else(|| dn::first_rdn(&entry.dn).map(|(_, value)| value))
        .unwrap_or_default();
    IdentityObject::new(entry.dn.clone(), name, IdentityObjectType::new(type_name))
}

/// Attributes written on every new entry of a type so that membership
/// attributes requiring a value are never empty.
#[must_use]
pub fn placeholder_attributes(type_config: &LdapTypeConfig) -> Attributes {
    [&type_config.parent_membership, &type_config.child_membership]
        .into_iter()
        .flatten()
        .filter(|m| m.is_writable())
        .filter_map(|m| m.placeholder.as_ref().map(|p| (m.name.clone(), vec![p.clone()])))
        .collect()
}

fn reference<'a>(attribute: &MembershipAttribute, identity: &'a IdentityObject) -> &'a str {
    if attribute.is_dn {
        &identity.id
    } else {
        &identity.name
    }
}

fn same_reference(attribute: &MembershipAttribute, stored: &str, wanted: &str) -> bool {
    if attribute.is_dn {
        dn::same(stored, wanted)
    } else {
        stored.eq_ignore_ascii_case(wanted)
    }
}

/// A stored value counts as a reference only when it is not the placeholder.
fn is_reference_to(attribute: &MembershipAttribute, stored: &str, wanted: &str) -> bool {
    !attribute.is_placeholder(stored) && same_reference(attribute, stored, wanted)
}

fn writable(attribute: Option<&MembershipAttribute>) -> Option<&MembershipAttribute> {
    attribute.filter(|a| a.is_writable())
}

/// Resolves and writes membership edges for one store configuration.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipMapper<'c> {
    config: &'c LdapStoreConfig,
}

impl<'c> RelationshipMapper<'c> {
    /// Creates a mapper.
    #[must_use]
    pub const fn new(config: &'c LdapStoreConfig) -> Self {
        Self { config }
    }

    /// Types whose search scope contains `dn_text`.
    #[must_use]
    pub fn types_containing(&self, dn_text: &str) -> Vec<&'c str> {
        self.config
            .identity_types
            .iter()
            .filter(|(_, tc)| {
                tc.context_dns
                    .iter()
                    .any(|context| tc.entry_search_scope.contains(context, dn_text))
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Infers the type of an entry.
    ///
    /// Candidates are the types whose contexts contain the entry and whose
    /// entry filter accepts it, optionally restricted to `allowed`. Several
    /// candidates are told apart by looking the entry's name up in each type
    /// and comparing DNs.
    ///
    /// ## Errors
    ///
    /// Propagates directory failures.
    pub async fn infer_type(
        &self,
        searcher: &mut LdapSearcher<'_>,
        entry: &LdapEntry,
        allowed: Option<&[&str]>,
    ) -> LdapResult<Option<&'c str>> {
        let mut candidates = Vec::new();
        for type_name in self.types_containing(&entry.dn) {
            if allowed.is_some_and(|a| !a.contains(&type_name)) {
                continue;
            }
            let tc = self.config.type_config(type_name)?;
            if tc.entry_filter("*")?.matches(entry) {
                candidates.push(type_name);
            }
        }

        match candidates.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(*only)),
            _ => {
                tracing::debug!(dn = %entry.dn, ?candidates, "Several types match entry, disambiguating by name");
                for type_name in candidates {
                    let tc = self.config.type_config(type_name)?;
                    let Some(name) = entry.get_attr(&tc.id_attribute) else {
                        continue;
                    };
                    let found = searcher.find_by_name(type_name, tc, name).await?;
                    if found.is_some_and(|f| dn::same(&f.dn, &entry.dn)) {
                        return Ok(Some(type_name));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Finds the identities one membership hop away.
    ///
    /// `direction` names what is searched for relative to `identity`;
    /// `target_type` restricts the result to one type. Entries are returned
    /// once each, in discovery order.
    ///
    /// ## Errors
    ///
    /// Propagates directory failures; the first one aborts the resolution.
    pub async fn related(
        &self,
        searcher: &mut LdapSearcher<'_>,
        identity: &IdentityObject,
        direction: Direction,
        target_type: Option<&str>,
    ) -> LdapResult<Vec<(IdentityObject, LdapEntry)>> {
        let type_name = identity.object_type.name();
        let tc = self.config.type_config(type_name)?;

        let other_types: Vec<&str> = match direction {
            Direction::Parents => self.config.parent_types_of(type_name),
            Direction::Children => self.config.child_types_of(type_name),
        }
        .into_iter()
        .filter(|t| target_type.map_or(true, |wanted| wanted == *t))
        .collect();
        if other_types.is_empty() {
            return Ok(Vec::new());
        }

        let own = match direction {
            Direction::Parents => tc.parent_membership.as_ref(),
            Direction::Children => tc.child_membership.as_ref(),
        };
        let found = match writable(own) {
            Some(attribute) => {
                self.read_references(searcher, identity, attribute, &other_types)
                    .await?
            }
            None => {
                self.reverse_scan(searcher, identity, direction, &other_types)
                    .await?
            }
        };

        let mut unique: Vec<(IdentityObject, LdapEntry)> = Vec::with_capacity(found.len());
        for (object, entry) in found {
            if !unique.iter().any(|(o, _)| dn::same(&o.id, &object.id)) {
                unique.push((object, entry));
            }
        }
        Ok(unique)
    }

    async fn read_references(
        &self,
        searcher: &mut LdapSearcher<'_>,
        identity: &IdentityObject,
        attribute: &MembershipAttribute,
        candidates: &[&str],
    ) -> LdapResult<Vec<(IdentityObject, LdapEntry)>> {
        let Some(entry) = searcher.lookup(&identity.id).await? else {
            return Ok(Vec::new());
        };
        let values: Vec<String> = entry
            .values(&attribute.name)
            .iter()
            .filter(|v| !attribute.is_placeholder(v))
            .cloned()
            .collect();

        let mut found = Vec::new();
        for value in values {
            if attribute.is_dn {
                let Some(target) = searcher.lookup(&value).await? else {
                    tracing::debug!(dn = %identity.id, reference = %value, "Skipping dangling membership reference");
                    continue;
                };
                if let Some(type_name) = self.infer_type(searcher, &target, Some(candidates)).await? {
                    let tc = self.config.type_config(type_name)?;
                    found.push((entry_identity(type_name, tc, &target), target));
                }
            } else {
                for type_name in candidates {
                    let tc = self.config.type_config(type_name)?;
                    if let Some(target) = searcher.find_by_name(type_name, tc, &value).await? {
                        found.push((entry_identity(type_name, tc, &target), target));
                    }
                }
            }
        }
        Ok(found)
    }

    async fn reverse_scan(
        &self,
        searcher: &mut LdapSearcher<'_>,
        identity: &IdentityObject,
        direction: Direction,
        other_types: &[&str],
    ) -> LdapResult<Vec<(IdentityObject, LdapEntry)>> {
        let mut found = Vec::new();
        for type_name in other_types {
            let tc = self.config.type_config(type_name)?;
            let far_side = match direction {
                Direction::Parents => tc.child_membership.as_ref(),
                Direction::Children => tc.parent_membership.as_ref(),
            };
            let Some(attribute) = writable(far_side) else {
                continue;
            };

            let filter = Filter::and(vec![
                tc.entry_filter("*")?,
                Filter::eq(&attribute.name, reference(attribute, identity)),
            ]);
            tracing::debug!(identity = %identity.id, r#type = %type_name, filter = %filter, "Reverse membership scan");

            for entry in searcher.search_type(tc, &filter, None).await? {
                found.push((entry_identity(type_name, tc, &entry), entry));
            }
        }
        Ok(found)
    }

    fn sides<'i>(
        &self,
        parent: &'i IdentityObject,
        child: &'i IdentityObject,
    ) -> LdapResult<Vec<(&'i str, &'c MembershipAttribute, &'i str)>> {
        let ptc = self.config.type_config(parent.object_type.name())?;
        let ctc = self.config.type_config(child.object_type.name())?;

        let mut sides = Vec::with_capacity(2);
        if let Some(attribute) = writable(ptc.child_membership.as_ref()) {
            sides.push((parent.id.as_str(), attribute, reference(attribute, child)));
        }
        if let Some(attribute) = writable(ctc.parent_membership.as_ref()) {
            sides.push((child.id.as_str(), attribute, reference(attribute, parent)));
        }
        if sides.is_empty() {
            return Err(LdapError::config(format!(
                "no writable membership attribute links '{}' to '{}'",
                parent.object_type, child.object_type
            )));
        }
        Ok(sides)
    }

    /// Records `child` as a member of `parent`.
    ///
    /// Each writable side is updated with its own modify operation; the two
    /// writes are not atomic. References already present are left alone and
    /// a placeholder value is dropped once a real value is added.
    ///
    /// ## Errors
    ///
    /// Returns `LdapError::NoSuchEntry` if an entry is missing,
    /// `LdapError::Reserved` if the reference equals the attribute's
    /// placeholder, or a configuration error if neither side can be written.
    pub async fn add_membership(
        &self,
        searcher: &mut LdapSearcher<'_>,
        parent: &IdentityObject,
        child: &IdentityObject,
    ) -> LdapResult<()> {
        let sides = self.sides(parent, child)?;
        if let Some((_, attribute, value)) = sides.iter().find(|(_, a, v)| a.is_placeholder(v)) {
            return Err(LdapError::Reserved(format!(
                "'{value}' is the placeholder of '{}' and cannot be recorded as a member",
                attribute.name
            )));
        }
        for (entry_dn, attribute, value) in sides {
            let entry = searcher
                .lookup(entry_dn)
                .await?
                .ok_or_else(|| LdapError::NoSuchEntry(entry_dn.to_string()))?;
            let current = entry.values(&attribute.name);
            if current.iter().any(|v| is_reference_to(attribute, v, value)) {
                continue;
            }

            let mut modifications = vec![Modification::add(&attribute.name, vec![value.to_string()])];
            let placeholders: Vec<String> = current
                .iter()
                .filter(|v| attribute.is_placeholder(v))
                .cloned()
                .collect();
            if !placeholders.is_empty() {
                modifications.push(Modification::delete(&attribute.name, placeholders));
            }

            tracing::debug!(dn = %entry_dn, attribute = %attribute.name, value, "Adding membership reference");
            searcher.context().modify(entry_dn, &modifications).await?;
        }
        Ok(())
    }

    /// Removes `child` from the members of `parent`.
    ///
    /// The placeholder is written back when the last real value goes away.
    /// Returns whether any reference was removed.
    ///
    /// ## Errors
    ///
    /// Propagates directory failures.
    pub async fn remove_membership(
        &self,
        searcher: &mut LdapSearcher<'_>,
        parent: &IdentityObject,
        child: &IdentityObject,
    ) -> LdapResult<bool> {
        let mut removed = false;
        for (entry_dn, attribute, value) in self.sides(parent, child)? {
            let Some(entry) = searcher.lookup(entry_dn).await? else {
                continue;
            };
            let current = entry.values(&attribute.name);
            let (matching, others): (Vec<String>, Vec<String>) = current
                .iter()
                .filter(|v| !attribute.is_placeholder(v))
                .cloned()
                .partition(|v| same_reference(attribute, v, value));
            if matching.is_empty() {
                continue;
            }

            let remaining = others.len();
            let mut modifications = Vec::with_capacity(2);
            if remaining == 0 {
                if let Some(placeholder) = &attribute.placeholder {
                    modifications.push(Modification::add(&attribute.name, vec![placeholder.clone()]));
                }
            }
            modifications.push(Modification::delete(&attribute.name, matching));

            tracing::debug!(dn = %entry_dn, attribute = %attribute.name, value, "Removing membership reference");
            searcher.context().modify(entry_dn, &modifications).await?;
            removed = true;
        }
        Ok(removed)
    }

    /// Checks whether `child` is recorded as a direct member of `parent`.
    ///
    /// ## Errors
    ///
    /// Propagates directory failures.
    pub async fn is_member(
        &self,
        searcher: &mut LdapSearcher<'_>,
        parent: &IdentityObject,
        child: &IdentityObject,
    ) -> LdapResult<bool> {
        let Some((entry_dn, attribute, value)) = self.sides(parent, child)?.into_iter().next() else {
            return Ok(false);
        };
        Ok(searcher
            .lookup(entry_dn)
            .await?
            .is_some_and(|e| e.values(&attribute.name).iter().any(|v| is_reference_to(attribute, v, value))))
    }

    /// Removes every membership reference other entries hold to `identity`.
    ///
    /// ## Errors
    ///
    /// Propagates directory failures.
    pub async fn detach(&self, searcher: &mut LdapSearcher<'_>, identity: &IdentityObject) -> LdapResult<()> {
        for (parent, _) in self.related(searcher, identity, Direction::Parents, None).await? {
            self.remove_membership(searcher, &parent, identity).await?;
        }
        for (child, _) in self.related(searcher, identity, Direction::Children, None).await? {
            self.remove_membership(searcher, identity, &child).await?;
        }
        Ok(())
    }
}
