//! LDAP store configuration.
//!
//! A store-level section (connection, paging, sort support) plus one
//! [`LdapTypeConfig`] per identity object type describing where entries of
//! that type live and how membership between types is recorded.

use std::collections::BTreeMap;
use std::time::Duration;

use idm_model::Attributes;
use serde::{Deserialize, Serialize};

use crate::dn;
use crate::error::{LdapError, LdapResult};
use crate::filter::{self, Filter};

/// Default page size for directory searches.
pub const DEFAULT_MAX_SEARCH_RESULTS: u32 = 250;

/// Token substituted with the (escaped) name pattern in entry search filters.
pub const NAME_TOKEN: &str = "{0}";

// ============================================================================
// Enums
// ============================================================================

/// How the store authenticates its own connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMethod {
    /// Simple bind with the admin DN and password.
    #[default]
    Simple,
    /// No bind.
    Anonymous,
}

/// Byte encoding of password values written to the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PasswordEncoding {
    /// UTF-8 bytes.
    #[default]
    Utf8,
    /// UTF-16 little endian (Active Directory `unicodePwd`).
    Utf16Le,
}

impl PasswordEncoding {
    /// Encodes a password, optionally enclosed on both sides.
    #[must_use]
    pub fn encode(self, password: &str, enclose_with: Option<&str>) -> Vec<u8> {
        let enclose = enclose_with.unwrap_or_default();
        let text = format!("{enclose}{password}{enclose}");
        match self {
            Self::Utf8 => text.into_bytes(),
            Self::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        }
    }
}

/// LDAP search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchScope {
    /// Search only the base DN.
    Base,
    /// Search one level below the base DN.
    OneLevel,
    /// Search the entire subtree.
    #[default]
    Subtree,
}

impl SearchScope {
    /// Converts to ldap3 scope.
    #[must_use]
    pub const fn to_ldap3(self) -> ldap3::Scope {
        match self {
            Self::Base => ldap3::Scope::Base,
            Self::OneLevel => ldap3::Scope::OneLevel,
            Self::Subtree => ldap3::Scope::Subtree,
        }
    }

    /// Checks whether `dn` is inside the scope rooted at `base`.
    #[must_use]
    pub fn contains(self, base: &str, dn: &str) -> bool {
        match self {
            Self::Base => dn::same(base, dn),
            Self::OneLevel => dn::parent(dn).is_some_and(|p| dn::same(&p, base)),
            Self::Subtree => dn::same(base, dn) || dn::is_descendant(dn, base),
        }
    }
}

// ============================================================================
// Membership attributes
// ============================================================================

/// A directory attribute recording one side of a membership edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipAttribute {
    /// Attribute name, e.g. `member` or `memberOf`.
    pub name: String,
    /// Whether values are full DNs rather than bare names.
    #[serde(default = "default_true")]
    pub is_dn: bool,
    /// Sentinel value kept when the attribute would otherwise be empty.
    #[serde(default)]
    pub placeholder: Option<String>,
    /// Computed by the directory; read-only, never written.
    #[serde(default)]
    pub is_virtual: bool,
}

const fn default_true() -> bool {
    true
}

impl MembershipAttribute {
    /// An attribute holding DNs.
    #[must_use]
    pub fn dn(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dn: true,
            placeholder: None,
            is_virtual: false,
        }
    }

    /// An attribute holding bare names.
    #[must_use]
    pub fn names(name: impl Into<String>) -> Self {
        Self {
            is_dn: false,
            ..Self::dn(name)
        }
    }

    /// Sets the placeholder value.
    #[must_use]
    pub fn with_placeholder(mut self, value: impl Into<String>) -> Self {
        self.placeholder = Some(value.into());
        self
    }

    /// Marks the attribute as computed by the directory.
    #[must_use]
    pub const fn computed(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Checks whether the store may write this attribute.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        !self.is_virtual
    }

    /// Checks whether a stored value is the placeholder.
    #[must_use]
    pub fn is_placeholder(&self, value: &str) -> bool {
        self.placeholder
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case(value))
    }
}

// ============================================================================
// Per-type configuration
// ============================================================================

/// How entries of one identity object type are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LdapTypeConfig {
    /// Attribute holding the unique name (also the RDN attribute).
    pub id_attribute: String,
    /// Attribute receiving password updates.
    pub password_attribute: Option<String>,
    /// Encoding of written passwords.
    pub password_encoding: PasswordEncoding,
    /// String placed before and after written passwords.
    pub enclose_password_with: Option<String>,
    /// Subtrees holding entries of this type; new entries go to the first.
    pub context_dns: Vec<String>,
    /// Filter template with a single `{0}` name token.
    pub entry_search_filter: Option<String>,
    /// Scope used below each context DN.
    pub entry_search_scope: SearchScope,
    /// Attribute on this entry referencing its parents.
    pub parent_membership: Option<MembershipAttribute>,
    /// Attribute on this entry referencing its children.
    pub child_membership: Option<MembershipAttribute>,
    /// Types allowed as members (children) of this type.
    pub allowed_membership_types: Vec<String>,
    /// Attributes added to every created entry.
    pub create_entry_attributes: Attributes,
    /// Logical attribute name -> directory attribute name.
    pub attribute_mappings: BTreeMap<String, String>,
    /// Logical attributes callers may not modify.
    pub readonly_attributes: Vec<String>,
}

impl Default for LdapTypeConfig {
    fn default() -> Self {
        Self {
            id_attribute: "cn".to_string(),
            password_attribute: None,
            password_encoding: PasswordEncoding::Utf8,
            enclose_password_with: None,
            context_dns: Vec::new(),
            entry_search_filter: None,
            entry_search_scope: SearchScope::OneLevel,
            parent_membership: None,
            child_membership: None,
            allowed_membership_types: Vec::new(),
            create_entry_attributes: Attributes::new(),
            attribute_mappings: BTreeMap::new(),
            readonly_attributes: Vec::new(),
        }
    }
}

impl LdapTypeConfig {
    /// Creates a type stored under one context DN.
    #[must_use]
    pub fn new(id_attribute: impl Into<String>, context_dn: impl Into<String>) -> Self {
        Self {
            id_attribute: id_attribute.into(),
            context_dns: vec![context_dn.into()],
            ..Self::default()
        }
    }

    /// Adds another context DN.
    #[must_use]
    pub fn context_dn(mut self, dn: impl Into<String>) -> Self {
        self.context_dns.push(dn.into());
        self
    }

    /// Sets the entry search filter template.
    #[must_use]
    pub fn entry_search_filter(mut self, template: impl Into<String>) -> Self {
        self.entry_search_filter = Some(template.into());
        self
    }

    /// Sets the entry search scope.
    #[must_use]
    pub const fn entry_search_scope(mut self, scope: SearchScope) -> Self {
        self.entry_search_scope = scope;
        self
    }

    /// Sets the parent membership attribute.
    #[must_use]
    pub fn parent_membership(mut self, attribute: MembershipAttribute) -> Self {
        self.parent_membership = Some(attribute);
        self
    }

    /// Sets the child membership attribute.
    #[must_use]
    pub fn child_membership(mut self, attribute: MembershipAttribute) -> Self {
        self.child_membership = Some(attribute);
        self
    }

    /// Allows a type as member of this type.
    #[must_use]
    pub fn allow_member_type(mut self, type_name: impl Into<String>) -> Self {
        self.allowed_membership_types.push(type_name.into());
        self
    }

    /// Adds a value set to every created entry.
    #[must_use]
    pub fn create_entry_attribute(mut self, name: impl Into<String>, values: &[&str]) -> Self {
        self.create_entry_attributes
            .insert(name.into(), values.iter().map(|v| (*v).to_string()).collect());
        self
    }

    /// Sets the password attribute with its encoding.
    #[must_use]
    pub fn password(
        mut self,
        attribute: impl Into<String>,
        encoding: PasswordEncoding,
        enclose_with: Option<&str>,
    ) -> Self {
        self.password_attribute = Some(attribute.into());
        self.password_encoding = encoding;
        self.enclose_password_with = enclose_with.map(String::from);
        self
    }

    /// Maps a logical attribute to a directory attribute.
    #[must_use]
    pub fn map_attribute(mut self, logical: impl Into<String>, directory: impl Into<String>) -> Self {
        self.attribute_mappings.insert(logical.into(), directory.into());
        self
    }

    /// Marks a logical attribute read-only.
    #[must_use]
    pub fn readonly_attribute(mut self, logical: impl Into<String>) -> Self {
        self.readonly_attributes.push(logical.into());
        self
    }

    /// Returns the directory name of a logical attribute.
    #[must_use]
    pub fn directory_attribute<'a>(&'a self, logical: &'a str) -> &'a str {
        self.attribute_mappings
            .get(logical)
            .map_or(logical, String::as_str)
    }

    /// Returns the logical name of a directory attribute.
    #[must_use]
    pub fn logical_attribute(&self, directory: &str) -> String {
        self.attribute_mappings
            .iter()
            .find(|(_, d)| d.eq_ignore_ascii_case(directory))
            .map_or_else(|| directory.to_string(), |(l, _)| l.clone())
    }

    /// Checks whether a logical attribute is read-only.
    #[must_use]
    pub fn is_readonly(&self, logical: &str) -> bool {
        self.readonly_attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(logical))
    }

    /// Checks whether a directory attribute is one of the membership attributes.
    #[must_use]
    pub fn is_membership_attribute(&self, directory: &str) -> bool {
        [&self.parent_membership, &self.child_membership]
            .into_iter()
            .flatten()
            .any(|m| m.name.eq_ignore_ascii_case(directory))
    }

    /// Builds the entry filter for a name pattern (`*` wildcards allowed).
    ///
    /// ## Errors
    ///
    /// Returns `LdapError::Filter` if the substituted template does not parse.
    pub fn entry_filter(&self, name_pattern: &str) -> LdapResult<Filter> {
        match &self.entry_search_filter {
            Some(template) => {
                let value = filter::escape_pattern(name_pattern);
                Filter::parse(&template.replace(NAME_TOKEN, &value))
            }
            None => Ok(Filter::wildcard(&self.id_attribute, name_pattern)),
        }
    }

    /// Builds the entry filter for one exact name.
    ///
    /// ## Errors
    ///
    /// Returns `LdapError::Filter` if the substituted template does not parse.
    pub fn exact_entry_filter(&self, name: &str) -> LdapResult<Filter> {
        match &self.entry_search_filter {
            Some(template) => Filter::parse(&template.replace(NAME_TOKEN, &filter::escape(name))),
            None => Ok(Filter::eq(&self.id_attribute, name)),
        }
    }

    /// Validates the type section.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error naming the type.
    pub fn validate(&self, type_name: &str) -> LdapResult<()> {
        if self.id_attribute.trim().is_empty() {
            return Err(LdapError::config(format!("{type_name}: id_attribute cannot be empty")));
        }
        if self.context_dns.is_empty() {
            return Err(LdapError::config(format!("{type_name}: at least one context DN is required")));
        }
        for context in &self.context_dns {
            dn::validate(context)
                .map_err(|e| LdapError::config(format!("{type_name}: {e}")))?;
        }
        if let Some(template) = &self.entry_search_filter {
            if template.matches(NAME_TOKEN).count() != 1 {
                return Err(LdapError::config(format!(
                    "{type_name}: entry search filter must contain exactly one {NAME_TOKEN} token"
                )));
            }
            self.entry_filter("*")
                .map_err(|e| LdapError::config(format!("{type_name}: {e}")))?;
        }
        Ok(())
    }
}

// ============================================================================
// Store configuration
// ============================================================================

/// LDAP store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapStoreConfig {
    /// Directory URL (`ldaps://` or `ldap://`).
    pub provider_url: String,

    /// Admin DN used by pooled connections.
    pub admin_dn: String,

    /// Admin password.
    #[serde(skip_serializing, default)]
    pub admin_password: String,

    /// Authentication method of pooled connections.
    #[serde(default)]
    pub auth_method: AuthMethod,

    /// Server-side search time limit in seconds.
    #[serde(default)]
    pub search_time_limit: Option<u32>,

    /// Page size of directory searches.
    #[serde(default = "default_max_search_results")]
    pub max_search_results: u32,

    /// Whether the server supports the sort control.
    #[serde(default)]
    pub sort_extension_supported: bool,

    /// Whether missing context DNs are created when the store starts.
    #[serde(default)]
    pub create_missing_contexts: bool,

    /// Free-form connection parameters.
    #[serde(default)]
    pub connection_options: BTreeMap<String, String>,

    /// Per-type configuration keyed by identity object type name.
    #[serde(default)]
    pub identity_types: BTreeMap<String, LdapTypeConfig>,
}

const fn default_max_search_results() -> u32 {
    DEFAULT_MAX_SEARCH_RESULTS
}

/// Connection option: connect timeout in seconds.
pub const OPT_CONNECT_TIMEOUT: &str = "connect_timeout_secs";
/// Connection option: per-operation timeout in seconds.
pub const OPT_OPERATION_TIMEOUT: &str = "operation_timeout_secs";
/// Connection option: upgrade plain connections with StartTLS.
pub const OPT_STARTTLS: &str = "starttls";
/// Connection option: skip certificate verification.
pub const OPT_NO_TLS_VERIFY: &str = "no_tls_verify";
/// Connection option: number of idle pooled connections kept.
pub const OPT_POOL_SIZE: &str = "pool_size";

impl LdapStoreConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> LdapStoreConfigBuilder {
        LdapStoreConfigBuilder::new()
    }

    /// Validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error for a bad URL, missing bind DN, bad
    /// connection option, bad type section or unknown member type.
    pub fn validate(&self) -> LdapResult<()> {
        self.validate_url()?;

        if self.auth_method == AuthMethod::Simple && self.admin_dn.trim().is_empty() {
            return Err(LdapError::config("admin_dn cannot be empty with simple authentication"));
        }
        if self.max_search_results == 0 {
            return Err(LdapError::config("max_search_results must be positive"));
        }

        self.connect_timeout()?;
        self.operation_timeout()?;
        self.starttls()?;
        self.no_tls_verify()?;
        self.pool_size()?;

        if self.identity_types.is_empty() {
            return Err(LdapError::config("at least one identity type must be configured"));
        }
        for (name, type_config) in &self.identity_types {
            type_config.validate(name)?;
            for member in &type_config.allowed_membership_types {
                if !self.identity_types.contains_key(member) {
                    return Err(LdapError::config(format!(
                        "{name}: allowed membership type '{member}' is not configured"
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_url(&self) -> LdapResult<()> {
        let url = self.provider_url.to_lowercase();
        let host = url
            .strip_prefix("ldaps://")
            .or_else(|| url.strip_prefix("ldap://"))
            .ok_or_else(|| LdapError::config("provider_url must start with ldaps:// or ldap://"))?;
        if host.is_empty() {
            return Err(LdapError::config("provider_url is missing a host"));
        }
        if url.starts_with("ldap://") {
            tracing::warn!(url = %self.provider_url, "Plain LDAP URL configured; credentials travel in cleartext unless StartTLS is enabled");
        }
        Ok(())
    }

    /// Returns the section of a type.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if the type is not configured.
    pub fn type_config(&self, type_name: &str) -> LdapResult<&LdapTypeConfig> {
        self.identity_types
            .get(type_name)
            .ok_or_else(|| LdapError::config(format!("identity type '{type_name}' is not configured")))
    }

    /// Returns the types whose entries may hold `child_type` members.
    #[must_use]
    pub fn parent_types_of(&self, child_type: &str) -> Vec<&str> {
        self.identity_types
            .iter()
            .filter(|(_, c)| c.allowed_membership_types.iter().any(|t| t == child_type))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Returns the types allowed as members of `parent_type`.
    #[must_use]
    pub fn child_types_of(&self, parent_type: &str) -> Vec<&str> {
        self.identity_types
            .get(parent_type)
            .map(|c| c.allowed_membership_types.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn option<T: std::str::FromStr>(&self, key: &str) -> LdapResult<Option<T>> {
        self.connection_options
            .get(key)
            .map(|raw| {
                raw.trim()
                    .parse()
                    .map_err(|_| LdapError::config(format!("invalid value '{raw}' for connection option {key}")))
            })
            .transpose()
    }

    /// Connect timeout (default 5 seconds).
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if the option does not parse.
    pub fn connect_timeout(&self) -> LdapResult<Duration> {
        Ok(Duration::from_secs(self.option(OPT_CONNECT_TIMEOUT)?.unwrap_or(5)))
    }

    /// Per-operation timeout, if configured.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if the option does not parse.
    pub fn operation_timeout(&self) -> LdapResult<Option<Duration>> {
        Ok(self.option(OPT_OPERATION_TIMEOUT)?.map(Duration::from_secs))
    }

    /// Whether StartTLS is requested.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if the option does not parse.
    pub fn starttls(&self) -> LdapResult<bool> {
        Ok(self.option(OPT_STARTTLS)?.unwrap_or(false))
    }

    /// Whether certificate verification is disabled.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if the option does not parse.
    pub fn no_tls_verify(&self) -> LdapResult<bool> {
        Ok(self.option(OPT_NO_TLS_VERIFY)?.unwrap_or(false))
    }

    /// Number of idle connections kept (default 4).
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if the option does not parse.
    pub fn pool_size(&self) -> LdapResult<usize> {
        Ok(self.option(OPT_POOL_SIZE)?.unwrap_or(4))
    }
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for [`LdapStoreConfig`].
#[derive(Debug, Default)]
pub struct LdapStoreConfigBuilder {
    provider_url: Option<String>,
    admin_dn: Option<String>,
    admin_password: Option<String>,
    auth_method: AuthMethod,
    search_time_limit: Option<u32>,
    max_search_results: u32,
    sort_extension_supported: bool,
    create_missing_contexts: bool,
    connection_options: BTreeMap<String, String>,
    identity_types: BTreeMap<String, LdapTypeConfig>,
}

impl LdapStoreConfigBuilder {
    /// Creates a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_search_results: DEFAULT_MAX_SEARCH_RESULTS,
            ..Default::default()
        }
    }

    /// Sets the provider URL.
    #[must_use]
    pub fn provider_url(mut self, url: impl Into<String>) -> Self {
        self.provider_url = Some(url.into());
        self
    }

    /// Sets the admin DN.
    #[must_use]
    pub fn admin_dn(mut self, dn: impl Into<String>) -> Self {
        self.admin_dn = Some(dn.into());
        self
    }

    /// Sets the admin password.
    #[must_use]
    pub fn admin_password(mut self, password: impl Into<String>) -> Self {
        self.admin_password = Some(password.into());
        self
    }

    /// Sets the authentication method.
    #[must_use]
    pub const fn auth_method(mut self, method: AuthMethod) -> Self {
        self.auth_method = method;
        self
    }

    /// Sets the search time limit in seconds.
    #[must_use]
    pub const fn search_time_limit(mut self, seconds: u32) -> Self {
        self.search_time_limit = Some(seconds);
        self
    }

    /// Sets the search page size.
    #[must_use]
    pub const fn max_search_results(mut self, max: u32) -> Self {
        self.max_search_results = max;
        self
    }

    /// Declares server-side sort support.
    #[must_use]
    pub const fn sort_extension_supported(mut self, supported: bool) -> Self {
        self.sort_extension_supported = supported;
        self
    }

    /// Creates missing context DNs at start.
    #[must_use]
    pub const fn create_missing_contexts(mut self, create: bool) -> Self {
        self.create_missing_contexts = create;
        self
    }

    /// Sets a connection option.
    #[must_use]
    pub fn connection_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.connection_options.insert(key.into(), value.into());
        self
    }

    /// Adds an identity type section.
    #[must_use]
    pub fn identity_type(mut self, name: impl Into<String>, config: LdapTypeConfig) -> Self {
        self.identity_types.insert(name.into(), config);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if the provider URL is missing or validation fails.
    pub fn build(self) -> LdapResult<LdapStoreConfig> {
        let config = LdapStoreConfig {
            provider_url: self
                .provider_url
                .ok_or_else(|| LdapError::config("provider_url is required"))?,
            admin_dn: self.admin_dn.unwrap_or_default(),
            admin_password: self.admin_password.unwrap_or_default(),
            auth_method: self.auth_method,
            search_time_limit: self.search_time_limit,
            max_search_results: self.max_search_results,
            sort_extension_supported: self.sort_extension_supported,
            create_missing_contexts: self.create_missing_contexts,
            connection_options: self.connection_options,
            identity_types: self.identity_types,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> LdapStoreConfigBuilder {
        LdapStoreConfig::builder()
            .provider_url("ldaps://ldap.example.com:636")
            .admin_dn("cn=admin,dc=example,dc=com")
            .admin_password("secret")
            .identity_type(
                "USER",
                LdapTypeConfig::new("uid", "ou=People,dc=example,dc=com")
                    .entry_search_filter("(&(objectClass=inetOrgPerson)(uid={0}))"),
            )
            .identity_type(
                "GROUP",
                LdapTypeConfig::new("cn", "ou=Groups,dc=example,dc=com")
                    .child_membership(MembershipAttribute::dn("member"))
                    .allow_member_type("USER")
                    .allow_member_type("GROUP"),
            )
    }

    #[test]
    fn builds_with_defaults() {
        let config = builder().build().unwrap();
        assert_eq!(config.max_search_results, DEFAULT_MAX_SEARCH_RESULTS);
        assert_eq!(config.connect_timeout().unwrap(), Duration::from_secs(5));
        assert_eq!(config.pool_size().unwrap(), 4);
        assert!(!config.starttls().unwrap());
        assert_eq!(config.parent_types_of("USER"), vec!["GROUP"]);
        assert_eq!(config.child_types_of("GROUP"), vec!["USER", "GROUP"]);
    }

    #[test]
    fn plain_ldap_is_accepted() {
        let config = builder().provider_url("ldap://localhost:389").build();
        assert!(config.is_ok());
    }

    #[test]
    fn rejects_bad_urls_and_options() {
        assert!(builder().provider_url("http://example.com").build().is_err());
        assert!(builder().provider_url("ldaps://").build().is_err());
        assert!(builder()
            .connection_option(OPT_CONNECT_TIMEOUT, "soon")
            .build()
            .is_err());
    }

    #[test]
    fn rejects_unknown_member_types() {
        let result = builder()
            .identity_type(
                "ROLE_GROUP",
                LdapTypeConfig::new("cn", "ou=Roles,dc=example,dc=com").allow_member_type("DEVICE"),
            )
            .build();
        assert!(matches!(result, Err(LdapError::Configuration(_))));
    }

    #[test]
    fn filter_template_needs_one_token() {
        let result = builder()
            .identity_type(
                "OU",
                LdapTypeConfig::new("ou", "dc=example,dc=com").entry_search_filter("(ou=x)"),
            )
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn entry_filter_substitutes_escaped_name() {
        let config = builder().build().unwrap();
        let user = config.type_config("USER").unwrap();

        let exact = user.entry_filter("j(doe)").unwrap();
        assert_eq!(
            exact.to_string(),
            "(&(objectClass=inetOrgPerson)(uid=j\\28doe\\29))"
        );

        let group = config.type_config("GROUP").unwrap();
        assert_eq!(group.entry_filter("*").unwrap().to_string(), "(cn=*)");
    }

    #[test]
    fn password_encodings() {
        assert_eq!(PasswordEncoding::Utf8.encode("pw", None), b"pw".to_vec());
        assert_eq!(
            PasswordEncoding::Utf16Le.encode("pw", Some("\"")),
            vec![b'"', 0, b'p', 0, b'w', 0, b'"', 0]
        );
    }

    #[test]
    fn scope_containment() {
        let base = "ou=People,dc=example,dc=com";
        let child = "uid=jdoe,ou=People,dc=example,dc=com";
        let grandchild = "cn=x,uid=jdoe,ou=People,dc=example,dc=com";

        assert!(SearchScope::OneLevel.contains(base, child));
        assert!(!SearchScope::OneLevel.contains(base, grandchild));
        assert!(SearchScope::Subtree.contains(base, grandchild));
        assert!(SearchScope::Base.contains(base, "OU=people, DC=example, DC=com"));
    }

    #[test]
    fn password_is_not_serialized() {
        let config = builder().build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn attribute_mapping_both_ways() {
        let config = LdapTypeConfig::new("uid", "ou=People,dc=example,dc=com")
            .map_attribute("email", "mail")
            .readonly_attribute("email");
        assert_eq!(config.directory_attribute("email"), "mail");
        assert_eq!(config.directory_attribute("phone"), "phone");
        assert_eq!(config.logical_attribute("MAIL"), "email");
        assert!(config.is_readonly("EMAIL"));
    }
}
