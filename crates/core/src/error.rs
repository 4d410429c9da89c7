//! Error taxonomy for the engine.
//!
//! `DependencyMissing` is deliberately absent: per the sync protocol a
//! struct with unmet dependencies is parked, not rejected, so it is
//! represented by [`crate::sync::IntegrateOutcome::Parked`] rather than
//! an `Err` variant here. `ObserverFailure` is absent too: a panicking
//! observer is caught and logged at the call site
//! ([`crate::replica::Replica`]'s dispatch helpers), never propagated
//! as a `Result`, since the transaction that triggered it has already
//! committed by the time observers run.

use crate::id::Id;

#[derive(Debug, thiserror::Error)]
pub enum WeaveError {
    #[error("index {index} out of range (len {len}) in {op}")]
    InputRange {
        op: &'static str,
        index: usize,
        len: usize,
    },

    #[error("type {name:?} already defined with a different constructor")]
    SchemaConflict { name: String },

    #[error("remote protocol version {remote} does not match local {local}")]
    ProtocolMismatch { local: u32, remote: u32 },

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("operation references unknown id {0:?}")]
    UnknownId(Id),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of buffer")]
    Eof,
    #[error("variable-length integer exceeded 35 bits")]
    VarIntOverflow,
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
    #[error("unknown struct tag {0}")]
    UnknownTag(u8),
    #[error("malformed json payload: {0}")]
    Json(String),
}

pub type Result<T> = std::result::Result<T, WeaveError>;
