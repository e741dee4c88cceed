//! Wire format.
//!
//! `WireTransaction` and `WireSavedState` are encoded with `postcard`
//! (a compact `serde`-based format) rather than hand-rolled framing —
//! a schema-evolution-tolerant encoding in the spirit of Protocol
//! Buffers, without pulling in a separate IDL/codegen toolchain.

use crate::collab::CollabId;
use crate::error::{Result, RuntimeError};
use crate::replica::ReplicaId;
use crate::time::VectorClock;

/// One `(path, payload)` op within a transaction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WireOp {
    pub path: CollabId,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

/// The over-the-wire representation of a transaction. `vc_keys`/
/// `vc_values` are the parallel-array encoding of the vector clock
/// the metadata layer decided to include.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WireTransaction {
    pub sender_id: ReplicaId,
    pub sender_counter: u32,
    pub vc_keys: Vec<ReplicaId>,
    pub vc_values: Vec<u32>,
    /// First N entries of `vc_keys` that are causally maximal among
    /// the sender's known transactions; omitted when the channel
    /// already guarantees causal delivery.
    pub maximal_vc_key_count: Option<u32>,
    pub wall_clock_time: Option<u64>,
    pub lamport_timestamp: Option<u64>,
    pub ops: Vec<WireOp>,
}

impl WireTransaction {
    /// Reconstructs the parallel-array vector clock as a `VectorClock`
    /// for ready-predicate evaluation.
    pub fn vector_clock(&self) -> VectorClock {
        let mut vc = VectorClock::new();
        for (key, value) in self.vc_keys.iter().zip(self.vc_values.iter()) {
            vc.set(*key, *value);
        }
        vc
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self)
            .map_err(|e| RuntimeError::SerializationError(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(RuntimeError::ProtocolError {
                sender: ReplicaId::from_str_lossy(""),
                counter: 0,
                reason: "empty transaction frame".to_string(),
            });
        }
        postcard::from_bytes(bytes).map_err(|e| RuntimeError::ProtocolError {
            sender: ReplicaId::from_str_lossy(""),
            counter: 0,
            reason: e.to_string(),
        })
    }
}

/// Saved-state wire shape: the recursive tree keyed by parallel
/// arrays rather than a map, so it round-trips through `postcard`
/// without relying on map key ordering being preserved.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct WireSavedStateTree {
    #[serde(with = "serde_bytes_option")]
    pub self_bytes: Option<Vec<u8>>,
    pub children_keys: Vec<String>,
    pub children_values: Vec<WireSavedStateTree>,
}

/// Top-level saved document state.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WireSavedState {
    pub vc_keys: Vec<ReplicaId>,
    pub vc_values: Vec<u32>,
    pub pending_buffer: Vec<Vec<u8>>,
    pub tree: WireSavedStateTree,
}

impl WireSavedState {
    pub fn vector_clock(&self) -> VectorClock {
        let mut vc = VectorClock::new();
        for (key, value) in self.vc_keys.iter().zip(self.vc_values.iter()) {
            vc.set(*key, *value);
        }
        vc
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self)
            .map_err(|e| RuntimeError::SerializationError(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        postcard::from_bytes(bytes)
            .map_err(|e| RuntimeError::SerializationError(e.to_string()))
    }
}

/// `serde_bytes`-equivalent helper for `Option<Vec<u8>>`, since
/// `serde_bytes`'s `with` adapter only covers the non-`Option` case
/// directly.
mod serde_bytes_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wrapper<'a>(#[serde(with = "serde_bytes")] &'a [u8]);
        value.as_ref().map(|v| Wrapper(v)).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(with = "serde_bytes")] Vec<u8>);
        Ok(Option::<Wrapper>::deserialize(d)?.map(|w| w.0))
    }
}
