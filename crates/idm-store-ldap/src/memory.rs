//! In-process directory.
//!
//! Evaluates the same filter tree the real client sends, honours scopes,
//! rejects adds under missing parents and deletes of non-leaf entries, and
//! can optionally apply the sort control. It also counts open contexts and
//! can be switched offline (or made to fail after a number of searches) so
//! release and abort behaviour can be checked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use idm_model::Attributes;
use idm_model::SortOrder;
use parking_lot::RwLock;

use crate::directory::{Directory, DirectoryContext, ModifyOp, Modification, SearchRequest};
use crate::dn;
use crate::error::{LdapError, LdapResult};
use crate::search::{sort_entries, LdapEntry};

#[derive(Debug, Clone)]
struct StoredEntry {
    dn: String,
    attributes: Attributes,
    password: Option<Vec<u8>>,
}

impl StoredEntry {
    fn to_entry(&self, requested: &[String]) -> LdapEntry {
        let all = requested.is_empty() || requested.iter().any(|a| a == "*");
        let attributes: HashMap<String, Vec<String>> = self
            .attributes
            .iter()
            .filter(|(name, _)| all || requested.iter().any(|r| r.eq_ignore_ascii_case(name)))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect();
        LdapEntry::new(self.dn.clone(), attributes)
    }

    fn values_mut(&mut self, attribute: &str) -> Option<&mut Vec<String>> {
        self.attributes
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(attribute))
            .map(|(_, v)| v)
    }

    fn remove_attribute(&mut self, attribute: &str) {
        self.attributes.retain(|k, _| !k.eq_ignore_ascii_case(attribute));
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: RwLock<Vec<StoredEntry>>,
    searches: RwLock<Vec<SearchRequest>>,
    open_contexts: AtomicUsize,
    offline: AtomicBool,
    fail_after: RwLock<Option<usize>>,
    sort_supported: AtomicBool,
}

impl Inner {
    fn check_online(&self) -> LdapResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LdapError::connection("directory is offline"));
        }
        Ok(())
    }

    fn position(entries: &[StoredEntry], dn_text: &str) -> Option<usize> {
        let wanted = dn::normalize(dn_text);
        entries.iter().position(|e| dn::normalize(&e.dn) == wanted)
    }
}

/// In-memory [`Directory`].
///
/// Cloning shares the same directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<Inner>,
}

impl MemoryDirectory {
    /// Creates a directory holding the given suffix entries.
    #[must_use]
    pub fn new(suffixes: &[&str]) -> Self {
        let directory = Self::default();
        {
            let mut entries = directory.inner.entries.write();
            for suffix in suffixes {
                let mut attributes = Attributes::new();
                if let Some((attr, value)) = dn::first_rdn(suffix) {
                    attributes.insert(attr, vec![value]);
                }
                attributes.insert("objectClass".to_string(), vec!["top".to_string()]);
                entries.push(StoredEntry {
                    dn: (*suffix).to_string(),
                    attributes,
                    password: None,
                });
            }
        }
        directory
    }

    /// Enables or disables the sort control.
    #[must_use]
    pub fn with_sort_support(self, supported: bool) -> Self {
        self.inner.sort_supported.store(supported, Ordering::SeqCst);
        self
    }

    /// Number of contexts currently open.
    #[must_use]
    pub fn open_contexts(&self) -> usize {
        self.inner.open_contexts.load(Ordering::SeqCst)
    }

    /// Makes every operation fail with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Lets `count` more searches succeed, then fails every search.
    pub fn fail_searches_after(&self, count: Option<usize>) {
        *self.inner.fail_after.write() = count;
    }

    /// Returns every search received so far.
    #[must_use]
    pub fn searches(&self) -> Vec<SearchRequest> {
        self.inner.searches.read().clone()
    }

    /// Forgets the recorded searches.
    pub fn clear_searches(&self) {
        self.inner.searches.write().clear();
    }

    /// Reads an entry directly.
    #[must_use]
    pub fn entry(&self, dn_text: &str) -> Option<LdapEntry> {
        let entries = self.inner.entries.read();
        Inner::position(&entries, dn_text).map(|i| entries[i].to_entry(&[]))
    }

    /// Returns the raw bytes last written by a password update.
    #[must_use]
    pub fn password_bytes(&self, dn_text: &str) -> Option<Vec<u8>> {
        let entries = self.inner.entries.read();
        Inner::position(&entries, dn_text).and_then(|i| entries[i].password.clone())
    }

    /// Number of stored entries, suffixes included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Checks whether the directory holds no entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn open(&self) -> LdapResult<Box<dyn DirectoryContext>> {
        self.inner.check_online()?;
        self.inner.open_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryContext {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemoryContext {
    inner: Arc<Inner>,
}

impl Drop for MemoryContext {
    fn drop(&mut self) {
        self.inner.open_contexts.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DirectoryContext for MemoryContext {
    async fn search(&mut self, request: &SearchRequest) -> LdapResult<Vec<LdapEntry>> {
        self.inner.check_online()?;
        {
            let mut fail_after = self.inner.fail_after.write();
            if let Some(left) = fail_after.as_mut() {
                if *left == 0 {
                    return Err(LdapError::connection("directory went away during search"));
                }
                *left -= 1;
            }
        }
        self.inner.searches.write().push(request.clone());

        let entries = self.inner.entries.read();
        if Inner::position(&entries, &request.base).is_none() {
            return Ok(Vec::new());
        }

        let mut found: Vec<LdapEntry> = entries
            .iter()
            .filter(|e| request.scope.contains(&request.base, &e.dn))
            .map(|e| e.to_entry(&[]))
            .filter(|e| request.filter.matches(e))
            .collect();

        if let Some(sort) = &request.sort {
            if self.inner.sort_supported.load(Ordering::SeqCst) {
                let order = if sort.reverse {
                    SortOrder::Descending
                } else {
                    SortOrder::Ascending
                };
                sort_entries(&mut found, &sort.attribute, order);
            }
        }

        let requested = &request.attributes;
        Ok(found
            .into_iter()
            .map(|mut e| {
                let all = requested.is_empty() || requested.iter().any(|a| a == "*");
                if !all {
                    e.attributes
                        .retain(|k, _| requested.iter().any(|r| r.eq_ignore_ascii_case(k)));
                }
                e
            })
            .collect())
    }

    async fn add(&mut self, dn_text: &str, attributes: &Attributes) -> LdapResult<()> {
        self.inner.check_online()?;
        dn::validate(dn_text)?;

        let mut entries = self.inner.entries.write();
        if Inner::position(&entries, dn_text).is_some() {
            return Err(LdapError::EntryExists(dn_text.to_string()));
        }
        let parent = dn::parent(dn_text)
            .ok_or_else(|| LdapError::NoSuchEntry(format!("parent of {dn_text}")))?;
        if Inner::position(&entries, &parent).is_none() {
            return Err(LdapError::NoSuchEntry(parent));
        }

        let attributes = attributes
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.push(StoredEntry {
            dn: dn_text.to_string(),
            attributes,
            password: None,
        });
        Ok(())
    }

    async fn modify(&mut self, dn_text: &str, modifications: &[Modification]) -> LdapResult<()> {
        self.inner.check_online()?;

        let mut entries = self.inner.entries.write();
        let index = Inner::position(&entries, dn_text)
            .ok_or_else(|| LdapError::NoSuchEntry(dn_text.to_string()))?;
        let entry = &mut entries[index];

        for m in modifications {
            match m.op {
                ModifyOp::Add => match entry.values_mut(&m.attribute) {
                    Some(values) => {
                        for value in &m.values {
                            if !values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
                                values.push(value.clone());
                            }
                        }
                    }
                    None => {
                        entry.attributes.insert(m.attribute.clone(), m.values.clone());
                    }
                },
                ModifyOp::Delete if m.values.is_empty() => entry.remove_attribute(&m.attribute),
                ModifyOp::Delete => {
                    let now_empty = match entry.values_mut(&m.attribute) {
                        Some(values) => {
                            values.retain(|v| {
                                !m.values
                                    .iter()
                                    .any(|d| v.eq_ignore_ascii_case(d) || dn::same(v, d))
                            });
                            values.is_empty()
                        }
                        None => {
                            return Err(LdapError::modify(format!(
                                "no attribute {} on {dn_text}",
                                m.attribute
                            )))
                        }
                    };
                    if now_empty {
                        entry.remove_attribute(&m.attribute);
                    }
                }
                ModifyOp::Replace => {
                    entry.remove_attribute(&m.attribute);
                    if !m.values.is_empty() {
                        entry.attributes.insert(m.attribute.clone(), m.values.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete(&mut self, dn_text: &str) -> LdapResult<()> {
        self.inner.check_online()?;

        let mut entries = self.inner.entries.write();
        let index = Inner::position(&entries, dn_text)
            .ok_or_else(|| LdapError::NoSuchEntry(dn_text.to_string()))?;
        if entries.iter().any(|e| dn::is_descendant(&e.dn, dn_text)) {
            return Err(LdapError::modify(format!("{dn_text} is not a leaf entry")));
        }
        entries.remove(index);
        Ok(())
    }

    async fn bind(&mut self, dn_text: &str, password: &str) -> LdapResult<bool> {
        self.inner.check_online()?;
        if password.is_empty() {
            return Ok(false);
        }

        let entries = self.inner.entries.read();
        let Some(stored) = Inner::position(&entries, dn_text).and_then(|i| entries[i].password.clone())
        else {
            return Ok(false);
        };
        Ok(stored == password.as_bytes() || decode_utf16le(&stored).is_some_and(|s| s == password))
    }

    async fn set_password(&mut self, dn_text: &str, _attribute: &str, value: Vec<u8>) -> LdapResult<()> {
        self.inner.check_online()?;

        let mut entries = self.inner.entries.write();
        let index = Inner::position(&entries, dn_text)
            .ok_or_else(|| LdapError::NoSuchEntry(dn_text.to_string()))?;
        entries[index].password = Some(value);
        Ok(())
    }
}

fn decode_utf16le(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchScope;
    use crate::directory::SortKey;
    use crate::filter::Filter;

    const BASE: &str = "dc=example,dc=com";

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        let mut map = Attributes::new();
        for (k, v) in pairs {
            map.entry((*k).to_string()).or_default().push((*v).to_string());
        }
        map
    }

    async fn seeded() -> MemoryDirectory {
        let directory = MemoryDirectory::new(&[BASE]);
        let mut ctx = directory.open().await.unwrap();
        ctx.add("ou=People,dc=example,dc=com", &attrs(&[("ou", "People")]))
            .await
            .unwrap();
        for uid in ["carol", "alice", "bob"] {
            ctx.add(
                &format!("uid={uid},ou=People,dc=example,dc=com"),
                &attrs(&[("uid", uid), ("objectClass", "inetOrgPerson")]),
            )
            .await
            .unwrap();
        }
        directory
    }

    #[tokio::test]
    async fn contexts_are_counted_until_dropped() {
        let directory = MemoryDirectory::new(&[BASE]);
        let ctx = directory.open().await.unwrap();
        assert_eq!(directory.open_contexts(), 1);
        drop(ctx);
        assert_eq!(directory.open_contexts(), 0);
    }

    #[tokio::test]
    async fn adds_require_parent() {
        let directory = MemoryDirectory::new(&[BASE]);
        let mut ctx = directory.open().await.unwrap();

        let orphan = ctx
            .add("uid=x,ou=Missing,dc=example,dc=com", &attrs(&[("uid", "x")]))
            .await;
        assert!(matches!(orphan, Err(LdapError::NoSuchEntry(_))));

        ctx.add("ou=People,dc=example,dc=com", &attrs(&[("ou", "People")]))
            .await
            .unwrap();
        let duplicate = ctx
            .add("OU=people,dc=example,dc=com", &attrs(&[("ou", "People")]))
            .await;
        assert!(matches!(duplicate, Err(LdapError::EntryExists(_))));
    }

    #[tokio::test]
    async fn search_honours_scope_filter_and_sort() {
        let directory = seeded().await.with_sort_support(true);
        let mut ctx = directory.open().await.unwrap();

        let mut request = SearchRequest::new(
            "ou=People,dc=example,dc=com",
            SearchScope::OneLevel,
            Filter::parse("(objectClass=inetOrgPerson)").unwrap(),
        );
        request.sort = Some(SortKey {
            attribute: "uid".to_string(),
            reverse: false,
        });
        let found = ctx.search(&request).await.unwrap();
        let uids: Vec<_> = found.iter().filter_map(|e| e.get_attr("uid")).collect();
        assert_eq!(uids, ["alice", "bob", "carol"]);

        let base_only = SearchRequest::new(BASE, SearchScope::Base, Filter::present("objectClass"));
        assert_eq!(ctx.search(&base_only).await.unwrap().len(), 1);

        let missing = SearchRequest::new(
            "ou=Nowhere,dc=example,dc=com",
            SearchScope::Subtree,
            Filter::present("objectClass"),
        );
        assert!(ctx.search(&missing).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsorted_without_support() {
        let directory = seeded().await;
        let mut ctx = directory.open().await.unwrap();
        let mut request = SearchRequest::new(
            "ou=People,dc=example,dc=com",
            SearchScope::OneLevel,
            Filter::present("uid"),
        );
        request.sort = Some(SortKey {
            attribute: "uid".to_string(),
            reverse: false,
        });
        let found = ctx.search(&request).await.unwrap();
        let uids: Vec<_> = found.iter().filter_map(|e| e.get_attr("uid")).collect();
        assert_eq!(uids, ["carol", "alice", "bob"]);
    }

    #[tokio::test]
    async fn modify_and_delete() {
        let directory = seeded().await;
        let mut ctx = directory.open().await.unwrap();
        let dn_text = "uid=alice,ou=People,dc=example,dc=com";

        ctx.modify(dn_text, &[Modification::add("mail", vec!["a@example.com".to_string()])])
            .await
            .unwrap();
        assert_eq!(directory.entry(dn_text).unwrap().get_attr("mail"), Some("a@example.com"));

        ctx.modify(dn_text, &[Modification::delete("mail", vec!["A@example.com".to_string()])])
            .await
            .unwrap();
        assert!(!directory.entry(dn_text).unwrap().has_attr("mail"));

        let non_leaf = ctx.delete("ou=People,dc=example,dc=com").await;
        assert!(non_leaf.is_err());

        ctx.delete(dn_text).await.unwrap();
        assert!(directory.entry(dn_text).is_none());
    }

    #[tokio::test]
    async fn offline_and_failing_searches() {
        let directory = seeded().await;
        let mut ctx = directory.open().await.unwrap();
        let request = SearchRequest::new(BASE, SearchScope::Subtree, Filter::present("uid"));

        directory.fail_searches_after(Some(1));
        assert!(ctx.search(&request).await.is_ok());
        assert!(ctx.search(&request).await.is_err());
        directory.fail_searches_after(None);

        directory.set_offline(true);
        assert!(ctx.search(&request).await.is_err());
        assert!(directory.open().await.is_err());
    }

    #[tokio::test]
    async fn bind_checks_written_password() {
        let directory = seeded().await;
        let mut ctx = directory.open().await.unwrap();
        let dn_text = "uid=bob,ou=People,dc=example,dc=com";

        assert!(!ctx.bind(dn_text, "secret").await.unwrap());
        ctx.set_password(dn_text, "userPassword", b"secret".to_vec())
            .await
            .unwrap();
        assert!(ctx.bind(dn_text, "secret").await.unwrap());
        assert!(!ctx.bind(dn_text, "").await.unwrap());
        assert_eq!(directory.password_bytes(dn_text), Some(b"secret".to_vec()));
    }
}
