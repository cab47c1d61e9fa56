//! End-to-end scenarios.
//!
//! Every scenario runs a full [`IdentitySession`](idm_session::IdentitySession)
//! over either the in-memory identity store or the LDAP store backed by an
//! in-process directory.

mod common;
mod directory;
mod hierarchy;
mod queries;
mod roles;
