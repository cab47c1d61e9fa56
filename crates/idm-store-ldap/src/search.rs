//! LDAP search operations.
//!
//! [`LdapSearcher`] runs the searches of one logical operation on one
//! context: per-type searches across every context DN (aborting on the
//! first failure), base lookups, and sorting with a client-side fallback
//! when the server cannot sort.

use std::collections::HashMap;

use idm_model::criteria::compare_ignore_case;
use idm_model::SortOrder;
use ldap3::SearchEntry;

use crate::config::{LdapStoreConfig, LdapTypeConfig, SearchScope};
use crate::directory::{DirectoryContext, SearchRequest, SortKey};
use crate::error::{LdapError, LdapResult};
use crate::filter::Filter;

/// Represents an LDAP entry with parsed attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished Name.
    pub dn: String,

    /// Attributes (all values are multi-valued).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(dn: impl Into<String>, attributes: HashMap<String, Vec<String>>) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// Creates a new LDAP entry from search result.
    #[must_use]
    pub fn from_search_entry(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attributes: entry.attrs,
        }
    }

    /// Gets all values of an attribute, matching the name case-insensitively.
    #[must_use]
    pub fn values(&self, name: &str) -> &[String] {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
            .unwrap_or_default()
    }

    /// Gets a single-valued attribute.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    /// Checks if the entry has an attribute.
    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        !self.values(name).is_empty()
    }
}

/// Runs the searches of one operation on one context.
pub struct LdapSearcher<'a> {
    ctx: &'a mut dyn DirectoryContext,
    config: &'a LdapStoreConfig,
}

impl<'a> LdapSearcher<'a> {
    /// Creates a new searcher.
    pub fn new(ctx: &'a mut dyn DirectoryContext, config: &'a LdapStoreConfig) -> Self {
        Self { ctx, config }
    }

    /// Returns the underlying context.
    pub fn context(&mut self) -> &mut dyn DirectoryContext {
        &mut *self.ctx
    }

    fn request(&self, base: &str, scope: SearchScope, filter: Filter) -> SearchRequest {
        SearchRequest {
            page_size: self.config.max_search_results,
            time_limit: self.config.search_time_limit,
            ..SearchRequest::new(base, scope, filter)
        }
    }

    /// Searches one base.
    ///
    /// ## Errors
    ///
    /// Propagates directory failures.
    pub async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: Filter,
        sort: Option<SortKey>,
    ) -> LdapResult<Vec<LdapEntry>> {
        let mut request = self.request(base, scope, filter);
        if self.config.sort_extension_supported {
            request.sort = sort;
        }

        tracing::trace!(base, scope = ?scope, filter = %request.filter, sort = ?request.sort, "LDAP search");
        self.ctx.search(&request).await
    }

    /// Reads one entry by DN.
    ///
    /// ## Errors
    ///
    /// Propagates directory failures; a missing entry is `Ok(None)`.
    pub async fn lookup(&mut self, dn: &str) -> LdapResult<Option<LdapEntry>> {
        let entries = self
            .search(dn, SearchScope::Base, Filter::present("objectClass"), None)
            .await?;
        Ok(entries.into_iter().next())
    }

    /// Searches every context DN of a type and concatenates the results.
    ///
    /// Any failure aborts the whole search; partial results are never
    /// returned. With `sort` set, the result is ordered by the id attribute,
    /// on the server when it supports sorting a single context and on the
    /// client otherwise.
    ///
    /// ## Errors
    ///
    /// Propagates the first directory failure.
    pub async fn search_type(
        &mut self,
        type_config: &LdapTypeConfig,
        filter: &Filter,
        sort: Option<SortOrder>,
    ) -> LdapResult<Vec<LdapEntry>> {
        let sort_key = sort.map(|order| SortKey {
            attribute: type_config.id_attribute.clone(),
            reverse: order == SortOrder::Descending,
        });

        let mut entries = Vec::new();
        for base in &type_config.context_dns {
            let found = self
                .search(base, type_config.entry_search_scope, filter.clone(), sort_key.clone())
                .await?;
            entries.extend(found);
        }

        let server_sorted = self.config.sort_extension_supported && type_config.context_dns.len() == 1;
        if let Some(order) = sort {
            if !server_sorted {
                tracing::debug!(attribute = %type_config.id_attribute, "Sorting search results on the client");
                sort_entries(&mut entries, &type_config.id_attribute, order);
            }
        }
        Ok(entries)
    }

    /// Finds the single entry of a type with the given name.
    ///
    /// ## Errors
    ///
    /// Returns `LdapError::Inconsistent` if several entries carry the name.
    pub async fn find_by_name(
        &mut self,
        type_name: &str,
        type_config: &LdapTypeConfig,
        name: &str,
    ) -> LdapResult<Option<LdapEntry>> {
        let filter = type_config.exact_entry_filter(name)?;
        let mut entries = self.search_type(type_config, &filter, None).await?;
        if entries.len() > 1 {
            return Err(LdapError::Inconsistent(format!(
                "{} entries of type {type_name} named '{name}'",
                entries.len()
            )));
        }
        Ok(entries.pop())
    }
}

/// Sorts entries by the first value of an attribute.
pub fn sort_entries(entries: &mut [LdapEntry], attribute: &str, order: SortOrder) {
    entries.sort_by(|a, b| {
        let left = a.get_attr(attribute).unwrap_or_default();
        let right = b.get_attr(attribute).unwrap_or_default();
        order.apply(compare_ignore_case(left, right))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dn: &str, cn: &str) -> LdapEntry {
        let mut attrs = HashMap::new();
        attrs.insert("cn".to_string(), vec![cn.to_string()]);
        LdapEntry::new(dn, attrs)
    }

    #[test]
    fn ldap_entry_get_attr() {
        let mut attrs = HashMap::new();
        attrs.insert("cn".to_string(), vec!["John Doe".to_string()]);
        attrs.insert("mail".to_string(), vec!["john@example.com".to_string()]);

        let entry = LdapEntry::new("cn=john,ou=users,dc=example,dc=com", attrs);

        assert_eq!(entry.get_attr("CN"), Some("John Doe"));
        assert_eq!(entry.get_attr("mail"), Some("john@example.com"));
        assert_eq!(entry.get_attr("missing"), None);
        assert!(entry.has_attr("cn"));
        assert!(!entry.has_attr("missing"));
        assert!(entry.values("missing").is_empty());
    }

    #[test]
    fn client_side_sort() {
        let mut entries = vec![
            entry("cn=b,dc=x", "bob"),
            entry("cn=a,dc=x", "Alice"),
            entry("cn=c,dc=x", "carol"),
        ];
        sort_entries(&mut entries, "cn", SortOrder::Descending);
        let names: Vec<_> = entries.iter().filter_map(|e| e.get_attr("cn")).collect();
        assert_eq!(names, ["carol", "bob", "Alice"]);
    }
}
