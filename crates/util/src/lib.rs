//! Small shared utilities for the weave CRDT engine: JSON equality and
//! JSON-with-binary cloning helpers used by the codec and test suites.

pub mod json_clone;
pub mod json_equal;
