//! `weave-core`: a peer-to-peer structured document CRDT engine.
//!
//! Shared mutable documents (arrays, maps, rich text, and XML trees)
//! that any number of replicas can edit offline and merge without a
//! central authority, à la Yjs. See `Replica` for the entry point.

pub mod codec;
pub mod content;
pub mod delete_store;
pub mod delta;
pub mod error;
pub mod id;
pub mod integrate;
pub mod item;
pub mod relative_position;
pub mod replica;
pub mod store;
pub mod sync;
pub mod transaction;
pub mod types;
pub mod undo;

pub use error::{DecodeError, Result, WeaveError};
pub use id::{Client, Clock, Id, StateVector};
pub use relative_position::RelativePosition;
pub use replica::{Replica, ReplicaOptions};
pub use sync::{IntegrateOutcome, PROTOCOL_VERSION};
pub use transaction::{Event, Transaction};
pub use types::{YArray, YMap, YText, YXmlElement, YXmlFragment, YXmlHook, YXmlText};
pub use undo::{UndoManager, UndoOptions};
