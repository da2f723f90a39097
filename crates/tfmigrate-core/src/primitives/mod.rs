//! Reusable rewrite operations for migrators.
//!
//! [`hcl`] edits configuration trees, [`json`] edits state instances. Every
//! operation is a no-op when its input does not match, so migrators can
//! apply them unconditionally.

pub mod hcl;
pub mod json;
