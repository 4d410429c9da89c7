//! JSON equality utilities.
//!
//! Provides deep equality comparison functions for JSON values.
//!
//! The core [`deep_equal`] function is re-exported from the standalone
//! `weave-json-equal` crate. The binary-aware variant [`deep_equal_binary`]
//! remains here since it depends on [`JsonBinary`].

mod deep_equal;

pub use weave_json_equal::deep_equal;

pub use deep_equal::deep_equal_binary;

pub use crate::json_clone::JsonBinary;
