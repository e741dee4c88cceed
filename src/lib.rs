//! Causal-delivery replication runtime for composable local-first
//! CRDTs.
//!
//! This crate is the substrate data-type implementations build on: it
//! assigns causal metadata to local operations, delivers remote
//! operations to the right sub-CRDT exactly once in a causally
//! respectful order, batches local operations into atomic
//! transactions, snapshots/restores full document state, and manages
//! the naming and lifecycle of the tree of sub-CRDTs that make up a
//! document. Concrete CRDT algorithms (counters, registers,
//! sequences, rich text, ...) are out of scope; see
//! [`collab::PrimitiveCollab`] for their contract with the runtime.
#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod buffer;
pub mod collab;
pub mod document;
pub mod error;
pub mod events;
pub mod ledger;
pub mod meta;
pub mod replica;
pub mod save_load;
pub mod time;
pub mod transaction;
pub mod wire;

pub use collab::{CollabId, CollabNode, CollabTree, PrimitiveCollab};
pub use document::{Document, DocumentOptions};
pub use error::{Result, RuntimeError};
pub use events::{Event, UpdateKind};
pub use meta::{LoadMeta, MetaRequest, ReceiveMeta, TrackedVectorClock};
pub use replica::ReplicaId;
