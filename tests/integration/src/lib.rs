//! Cross-crate scenario tests for the identity management workspace.
//!
//! The scenarios live in `tests/`; this crate has no library surface.
