//! Distinguished name utilities.
//!
//! Only the structure needed by the store is handled: splitting at
//! unescaped commas, case and whitespace normalization, parent and suffix
//! tests, and building child DNs with RDN escaping.

use crate::error::{LdapError, LdapResult};

/// Splits a DN into its RDN components at unescaped commas.
#[must_use]
pub fn components(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (idx, c) in dn.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                parts.push(dn[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    let last = dn[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

fn normalize_component(rdn: &str) -> String {
    match rdn.split_once('=') {
        Some((attr, value)) => format!(
            "{}={}",
            attr.trim().to_lowercase(),
            value.trim().to_lowercase()
        ),
        None => rdn.trim().to_lowercase(),
    }
}

/// Normalizes a DN for comparison.
#[must_use]
pub fn normalize(dn: &str) -> String {
    components(dn)
        .into_iter()
        .map(normalize_component)
        .collect::<Vec<_>>()
        .join(",")
}

/// Compares two DNs in normalized form.
#[must_use]
pub fn same(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Returns the parent DN.
#[must_use]
pub fn parent(dn: &str) -> Option<String> {
    let parts = components(dn);
    (parts.len() > 1).then(|| parts[1..].join(","))
}

/// Checks whether `dn` lies strictly below `base`.
#[must_use]
pub fn is_descendant(dn: &str, base: &str) -> bool {
    let dn = components(dn);
    let base = components(base);
    if dn.len() <= base.len() {
        return false;
    }
    let offset = dn.len() - base.len();
    dn[offset..]
        .iter()
        .zip(&base)
        .all(|(a, b)| normalize_component(a) == normalize_component(b))
}

/// Returns the attribute and unescaped value of the leading RDN.
#[must_use]
pub fn first_rdn(dn: &str) -> Option<(String, String)> {
    let first = components(dn).into_iter().next()?;
    let (attr, value) = first.split_once('=')?;
    Some((attr.trim().to_string(), unescape(value.trim())))
}

/// Builds `attr=value,parent` with the value escaped.
#[must_use]
pub fn child(attribute: &str, value: &str, parent: &str) -> String {
    format!("{attribute}={},{parent}", ldap3::dn_escape(value))
}

/// Checks that every component has the `attr=value` form.
///
/// ## Errors
///
/// Returns `LdapError::InvalidDn` for an empty DN or a malformed component.
pub fn validate(dn: &str) -> LdapResult<()> {
    let parts = components(dn);
    if parts.is_empty() {
        return Err(LdapError::invalid_dn("empty DN"));
    }
    for part in parts {
        match part.split_once('=') {
            Some((attr, _)) if !attr.trim().is_empty() => {}
            _ => return Err(LdapError::invalid_dn(format!("malformed component '{part}' in '{dn}'"))),
        }
    }
    Ok(())
}

fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            match hex {
                Some(b) => {
                    out.push(b);
                    i += 3;
                }
                None => {
                    out.push(bytes[i + 1]);
                    i += 2;
                }
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_unescaped_commas() {
        assert_eq!(
            components("cn=Doe\\, John,ou=People,dc=example"),
            vec!["cn=Doe\\, John", "ou=People", "dc=example"]
        );
        assert!(components("").is_empty());
    }

    #[test]
    fn normalization_ignores_case_and_spacing() {
        assert!(same("CN=Admins, OU=Groups,dc=Example", "cn=admins,ou=groups,dc=example"));
        assert!(!same("cn=a,dc=x", "cn=b,dc=x"));
    }

    #[test]
    fn parent_and_descendant() {
        let dn = "uid=jdoe,ou=People,dc=example,dc=com";
        assert_eq!(parent(dn).as_deref(), Some("ou=People,dc=example,dc=com"));
        assert_eq!(parent("dc=com"), None);
        assert!(is_descendant(dn, "DC=example, dc=com"));
        assert!(!is_descendant(dn, dn));
        assert!(!is_descendant("dc=com", dn));
    }

    #[test]
    fn child_escapes_and_first_rdn_unescapes() {
        let dn = child("cn", "Doe, John", "ou=People,dc=example");
        assert_eq!(components(&dn).len(), 3);
        assert_eq!(
            first_rdn(&dn),
            Some(("cn".to_string(), "Doe, John".to_string()))
        );
    }

    #[test]
    fn validates_components() {
        assert!(validate("ou=People,dc=example").is_ok());
        assert!(validate("").is_err());
        assert!(validate("People,dc=example").is_err());
    }
}
