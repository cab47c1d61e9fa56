//! LDAP connection pool management.
//!
//! Pooled connections are bound as the configured admin. A checked-out
//! [`LdapConnection`] goes back to the idle list when dropped, unless an
//! operation on it failed at the protocol level.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use idm_model::Attributes;
use ldap3::asn1::{write, ASNTag, Boolean, OctetString, Sequence, Tag, TagClass};
use ldap3::controls::{Control, ControlType, PagedResults, RawControl};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Mod, SearchEntry, SearchOptions};
use parking_lot::Mutex;

use crate::config::{AuthMethod, LdapStoreConfig};
use crate::directory::{Directory, DirectoryContext, ModifyOp, Modification, SearchRequest, SortKey};
use crate::error::{LdapError, LdapResult};
use crate::search::LdapEntry;

/// OID of the server-side sort request control (RFC 2891).
pub const SORT_REQUEST_OID: &str = "1.2.840.113556.1.4.473";

const RC_SUCCESS: u32 = 0;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

type IdleList = Arc<Mutex<Vec<Ldap>>>;

/// Connection pool for LDAP connections.
pub struct LdapConnectionPool {
    config: Arc<LdapStoreConfig>,
    idle: IdleList,
    max_idle: usize,
}

impl LdapConnectionPool {
    /// Creates a new connection pool.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if the connection options are invalid.
    pub fn new(config: Arc<LdapStoreConfig>) -> LdapResult<Self> {
        let max_idle = config.pool_size()?;
        Ok(Self {
            config,
            idle: Arc::new(Mutex::new(Vec::new())),
            max_idle,
        })
    }

    /// Gets a connection from the pool.
    ///
    /// Returns a connection handle that releases back to the pool when dropped.
    ///
    /// ## Errors
    ///
    /// Returns a connection or bind error if a new connection is needed and
    /// cannot be established.
    pub async fn get(&self) -> LdapResult<LdapConnection> {
        let reused = self.idle.lock().pop();
        let ldap = match reused {
            Some(ldap) => ldap,
            None => self.connect_as_admin().await?,
        };

        Ok(LdapConnection {
            ldap: Some(ldap),
            config: Arc::clone(&self.config),
            idle: Arc::clone(&self.idle),
            max_idle: self.max_idle,
            broken: false,
        })
    }

    async fn connect_as_admin(&self) -> LdapResult<Ldap> {
        let mut ldap = connect(&self.config).await?;
        if self.config.auth_method == AuthMethod::Simple {
            ldap.simple_bind(&self.config.admin_dn, &self.config.admin_password)
                .await
                .map_err(|e| LdapError::Bind(e.to_string()))?
                .success()
                .map_err(|e| LdapError::Bind(format!("admin bind failed: {e}")))?;
        }
        tracing::debug!(url = %self.config.provider_url, "Opened LDAP connection");
        Ok(ldap)
    }

    /// Tests the connection to the LDAP server.
    ///
    /// ## Errors
    ///
    /// Returns the connection or bind failure.
    pub async fn test_connection(&self) -> LdapResult<()> {
        let mut conn = self.get().await?;
        conn.ldap()?
            .search("", ldap3::Scope::Base, "(objectClass=*)", vec!["1.1"])
            .await
            .map_err(|e| LdapError::connection(format!("test search failed: {e}")))?;
        Ok(())
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LdapStoreConfig {
        &self.config
    }
}

#[async_trait]
impl Directory for LdapConnectionPool {
    async fn open(&self) -> LdapResult<Box<dyn DirectoryContext>> {
        Ok(Box::new(self.get().await?))
    }
}

async fn connect(config: &LdapStoreConfig) -> LdapResult<Ldap> {
    let settings = LdapConnSettings::new()
        .set_conn_timeout(config.connect_timeout()?)
        .set_starttls(config.starttls()?)
        .set_no_tls_verify(config.no_tls_verify()?);

    let (conn, ldap) = LdapConnAsync::with_settings(settings, &config.provider_url)
        .await
        .map_err(|e| LdapError::Connection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = conn.drive().await {
            tracing::warn!("LDAP connection driver error: {}", e);
        }
    });

    Ok(ldap)
}

/// A connection from the pool.
///
/// When dropped, the connection is returned to the pool.
pub struct LdapConnection {
    ldap: Option<Ldap>,
    config: Arc<LdapStoreConfig>,
    idle: IdleList,
    max_idle: usize,
    broken: bool,
}

impl LdapConnection {
    fn ldap(&mut self) -> LdapResult<&mut Ldap> {
        let timeout: Option<Duration> = self.config.operation_timeout()?;
        let ldap = self
            .ldap
            .as_mut()
            .ok_or_else(|| LdapError::connection("connection already released"))?;
        if let Some(timeout) = timeout {
            ldap.with_timeout(timeout);
        }
        Ok(ldap)
    }

    fn fail(&mut self, err: ldap3::LdapError) -> LdapError {
        self.broken = true;
        err.into()
    }

    async fn search_page(
        &mut self,
        request: &SearchRequest,
        filter: &str,
        cookie: Vec<u8>,
    ) -> LdapResult<(Vec<LdapEntry>, Option<Vec<u8>>)> {
        let mut controls: Vec<RawControl> = vec![PagedResults {
            size: i32::try_from(request.page_size).unwrap_or(i32::MAX),
            cookie,
        }
        .into()];
        if let Some(sort) = &request.sort {
            controls.push(sort_control(sort)?);
        }

        let mut options = SearchOptions::new();
        if let Some(limit) = request.time_limit {
            options = options.timelimit(i32::try_from(limit).unwrap_or(i32::MAX));
        }

        let attributes: Vec<&str> = request.attributes.iter().map(String::as_str).collect();
        let result = self
            .ldap()?
            .with_search_options(options)
            .with_controls(controls)
            .search(&request.base, request.scope.to_ldap3(), filter, attributes)
            .await;
        let ldap3::SearchResult(entries, result) = match result {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e)),
        };

        if result.rc == RC_NO_SUCH_OBJECT {
            return Ok((Vec::new(), None));
        }
        if result.rc != RC_SUCCESS {
            return Err(LdapError::search(format!("{} (rc={})", result.text, result.rc)));
        }

        let next_cookie = result.ctrls.iter().find_map(|Control(kind, raw)| match kind {
            Some(ControlType::PagedResults) => Some(raw.parse::<PagedResults>().cookie),
            _ => None,
        });
        let entries = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(LdapEntry::from_search_entry)
            .collect();
        Ok((entries, next_cookie.filter(|c| !c.is_empty())))
    }
}

impl Drop for LdapConnection {
    fn drop(&mut self) {
        let Some(ldap) = self.ldap.take() else {
            return;
        };
        if self.broken {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(ldap);
        }
    }
}

#[async_trait]
impl DirectoryContext for LdapConnection {
    async fn search(&mut self, request: &SearchRequest) -> LdapResult<Vec<LdapEntry>> {
        let filter = request.filter.to_string();
        let mut entries = Vec::new();
        let mut cookie = Vec::new();
        loop {
            let (page, next) = self.search_page(request, &filter, cookie).await?;
            entries.extend(page);
            match next {
                Some(next) => cookie = next,
                None => break,
            }
        }
        Ok(entries)
    }

    async fn add(&mut self, dn: &str, attributes: &Attributes) -> LdapResult<()> {
        let attrs: Vec<(&str, HashSet<&str>)> = attributes
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| (name.as_str(), values.iter().map(String::as_str).collect()))
            .collect();

        let result = match self.ldap()?.add(dn, attrs).await {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e)),
        };
        match result.rc {
            RC_SUCCESS => Ok(()),
            RC_ENTRY_ALREADY_EXISTS => Err(LdapError::EntryExists(dn.to_string())),
            RC_NO_SUCH_OBJECT => Err(LdapError::NoSuchEntry(format!("parent of {dn}"))),
            rc => Err(LdapError::modify(format!("add {dn}: {} (rc={rc})", result.text))),
        }
    }

    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> LdapResult<()> {
        let mods: Vec<Mod<&str>> = modifications
            .iter()
            .map(|m| {
                let values: HashSet<&str> = m.values.iter().map(String::as_str).collect();
                match m.op {
                    ModifyOp::Add => Mod::Add(m.attribute.as_str(), values),
                    ModifyOp::Delete => Mod::Delete(m.attribute.as_str(), values),
                    ModifyOp::Replace => Mod::Replace(m.attribute.as_str(), values),
                }
            })
            .collect();

        let result = match self.ldap()?.modify(dn, mods).await {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e)),
        };
        match result.rc {
            RC_SUCCESS => Ok(()),
            RC_NO_SUCH_OBJECT => Err(LdapError::NoSuchEntry(dn.to_string())),
            rc => Err(LdapError::modify(format!("modify {dn}: {} (rc={rc})", result.text))),
        }
    }

    async fn delete(&mut self, dn: &str) -> LdapResult<()> {
        let result = match self.ldap()?.delete(dn).await {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e)),
        };
        match result.rc {
            RC_SUCCESS => Ok(()),
            RC_NO_SUCH_OBJECT => Err(LdapError::NoSuchEntry(dn.to_string())),
            rc => Err(LdapError::modify(format!("delete {dn}: {} (rc={rc})", result.text))),
        }
    }

    /// Binds on a separate connection, so the pooled admin binding is kept.
    async fn bind(&mut self, dn: &str, password: &str) -> LdapResult<bool> {
        if password.is_empty() {
            return Ok(false);
        }

        let mut ldap = connect(&self.config).await?;
        let result = ldap
            .simple_bind(dn, password)
            .await
            .map_err(|e| LdapError::Bind(e.to_string()))?;
        if let Err(e) = ldap.unbind().await {
            tracing::debug!(dn, error = %e, "Unbind after credential check failed");
        }

        match result.rc {
            RC_SUCCESS => Ok(true),
            RC_INVALID_CREDENTIALS => Ok(false),
            rc => Err(LdapError::Bind(format!("{} (rc={rc})", result.text))),
        }
    }

    async fn set_password(&mut self, dn: &str, attribute: &str, value: Vec<u8>) -> LdapResult<()> {
        let mods = vec![Mod::Replace(attribute.as_bytes().to_vec(), HashSet::from([value]))];
        let result = match self.ldap()?.modify(dn, mods).await {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e)),
        };
        match result.rc {
            RC_SUCCESS => Ok(()),
            rc => Err(LdapError::modify(format!("password update on {dn} failed (rc={rc})"))),
        }
    }
}

/// Builds the sort request control for one key.
///
/// ```text
/// SortKeyList ::= SEQUENCE OF SEQUENCE {
///     attributeType   AttributeDescription,
///     orderingRule    [0] MatchingRuleId OPTIONAL,
///     reverseOrder    [1] BOOLEAN DEFAULT FALSE }
/// ```
///
/// ## Errors
///
/// Returns `LdapError::Protocol` if the value cannot be encoded.
pub fn sort_control(key: &SortKey) -> LdapResult<RawControl> {
    let mut fields = vec![Tag::OctetString(OctetString {
        inner: key.attribute.as_bytes().to_vec(),
        ..Default::default()
    })];
    if key.reverse {
        fields.push(Tag::Boolean(Boolean {
            class: TagClass::Context,
            id: 1,
            inner: true,
        }));
    }
    let list = Tag::Sequence(Sequence {
        inner: vec![Tag::Sequence(Sequence {
            inner: fields,
            ..Default::default()
        })],
        ..Default::default()
    });

    let mut buf = BytesMut::new();
    write::encode_into(&mut buf, list.into_structure())
        .map_err(|e| LdapError::Protocol(format!("sort control for '{}': {e}", key.attribute)))?;
    Ok(RawControl {
        ctype: SORT_REQUEST_OID.to_string(),
        crit: false,
        val: Some(buf.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_control_encoding() {
        let control = sort_control(&SortKey {
            attribute: "cn".to_string(),
            reverse: false,
        })
        .unwrap();
        assert_eq!(control.ctype, SORT_REQUEST_OID);
        assert!(!control.crit);
        assert_eq!(
            control.val,
            Some(vec![0x30, 0x06, 0x30, 0x04, 0x04, 0x02, b'c', b'n'])
        );

        let reversed = sort_control(&SortKey {
            attribute: "cn".to_string(),
            reverse: true,
        })
        .unwrap();
        assert_eq!(
            reversed.val,
            Some(vec![0x30, 0x09, 0x30, 0x07, 0x04, 0x02, b'c', b'n', 0x81, 0x01, 0xFF])
        );
    }

    #[test]
    fn long_attribute_names_use_long_form_lengths() {
        let control = sort_control(&SortKey {
            attribute: "a".repeat(200),
            reverse: false,
        })
        .unwrap();
        let val = control.val.unwrap();
        assert_eq!(&val[..9], &[0x30, 0x81, 206, 0x30, 0x81, 203, 0x04, 0x81, 200]);
        assert_eq!(val.len(), 209);
    }

    #[test]
    fn pool_creation() {
        let config = crate::config::LdapStoreConfig::builder()
            .provider_url("ldaps://ldap.example.com:636")
            .admin_dn("cn=admin,dc=example,dc=com")
            .admin_password("password")
            .connection_option(crate::config::OPT_POOL_SIZE, "2")
            .identity_type(
                "USER",
                crate::config::LdapTypeConfig::new("uid", "ou=People,dc=example,dc=com"),
            )
            .build()
            .unwrap();

        let pool = LdapConnectionPool::new(Arc::new(config)).unwrap();
        assert_eq!(pool.max_idle, 2);
        assert_eq!(pool.config().max_search_results, 250);
    }
}
