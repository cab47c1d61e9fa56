//! Common test utilities and fixtures.

use std::sync::Arc;

use idm_cache::MemoryCache;
use idm_core::IdentityConfig;
use idm_session::{IdentitySession, InMemoryEventListener};
use idm_store::MemoryIdentityStore;
use idm_store_ldap::{
    LdapIdentityStore, LdapStoreConfig, LdapTypeConfig, MembershipAttribute, MemoryDirectory,
};

pub const BASE: &str = "dc=example,dc=com";
pub const PEOPLE: &str = "ou=People,dc=example,dc=com";
pub const GROUPS: &str = "ou=Groups,dc=example,dc=com";
pub const TEAMS: &str = "ou=Teams,dc=example,dc=com";

/// Initializes tracing once for the whole test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("idm_session=debug,idm_store_ldap=debug")
        .with_test_writer()
        .try_init();
}

/// A session over the in-memory store with the given group types.
pub fn memory_session(group_types: &[&str]) -> (IdentitySession, Arc<InMemoryEventListener>) {
    init_tracing();
    let listener = Arc::new(InMemoryEventListener::new());
    let store = MemoryIdentityStore::for_types("memory", "USER", group_types);
    let session = IdentitySession::new(Arc::new(store), IdentityConfig::default())
        .with_listener(listener.clone());
    (session, listener)
}

/// Directory layout with two group types:
/// `GROUP` entries reference members by DN in `member`,
/// `TEAM` entries reference users by uid in `memberUid`.
pub fn ldap_config() -> anyhow::Result<LdapStoreConfig> {
    let config = LdapStoreConfig::builder()
        .provider_url("ldaps://ldap.example.com")
        .admin_dn("cn=admin,dc=example,dc=com")
        .create_missing_contexts(true)
        .identity_type(
            "USER",
            LdapTypeConfig::new("uid", PEOPLE)
                .entry_search_filter("(&(uid={0})(objectClass=inetOrgPerson))")
                .create_entry_attribute("objectClass", &["top", "inetOrgPerson"])
                .map_attribute("email", "mail"),
        )
        .identity_type(
            "GROUP",
            LdapTypeConfig::new("cn", GROUPS)
                .entry_search_filter("(&(cn={0})(objectClass=groupOfNames))")
                .create_entry_attribute("objectClass", &["top", "groupOfNames"])
                .child_membership(
                    MembershipAttribute::dn("member").with_placeholder("cn=empty-membership-placeholder"),
                )
                .allow_member_type("USER")
                .allow_member_type("GROUP"),
        )
        .identity_type(
            "TEAM",
            LdapTypeConfig::new("cn", TEAMS)
                .entry_search_filter("(&(cn={0})(objectClass=posixGroup))")
                .create_entry_attribute("objectClass", &["top", "posixGroup"])
                .child_membership(MembershipAttribute::names("memberUid"))
                .allow_member_type("USER"),
        )
        .build()?;
    Ok(config)
}

/// A session over the LDAP store and the directory behind it.
pub async fn ldap_session() -> anyhow::Result<(IdentitySession, MemoryDirectory)> {
    init_tracing();
    let directory = MemoryDirectory::new(&[BASE]);
    let store = LdapIdentityStore::new("ldap", ldap_config()?, Arc::new(directory.clone()))
        .await?
        .with_cache(Arc::new(MemoryCache::new()));
    let session = IdentitySession::new(Arc::new(store), IdentityConfig::default());
    Ok((session, directory))
}
