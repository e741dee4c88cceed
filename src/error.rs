//!
//! Error types surfaced by the replication runtime: one variant per
//! failure mode, `thiserror` messages throughout.

use crate::collab::CollabId;
use crate::replica::ReplicaId;

/// Errors raised by the runtime's entry points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// Malformed transaction header, unknown version, or inconsistent
    /// field lengths. The offending bytes are discarded; the ledger is
    /// unchanged.
    #[error("protocol error decoding transaction from {sender:?}#{counter}: {reason}")]
    ProtocolError {
        sender: ReplicaId,
        counter: u32,
        reason: String,
    },

    /// A transaction op's path has no target Collab, or the target's
    /// payload failed to parse.
    #[error("schema mismatch for {path:?} in transaction from {sender:?}#{counter}: {reason}")]
    SchemaMismatch {
        sender: ReplicaId,
        counter: u32,
        path: CollabId,
        reason: String,
    },

    /// A nested `receive` inside a local transaction, a duplicate
    /// child name, an `idOf` across documents, or another
    /// programmer-level misuse. Fails fast synchronously.
    #[error("usage error: {0}")]
    UsageError(String),

    /// A local operation was attempted on a deleted dynamic child.
    #[error("operation attempted on a deleted child at {0:?}")]
    FrozenOp(CollabId),

    /// `save()` could not produce a complete byte sequence.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The vector-clock ledger's `advance` precondition
    /// (`counter == current + 1`) did not hold.
    #[error("ledger precondition violated for {sender:?}: expected counter {expected}, got {got}")]
    LedgerPrecondition {
        sender: ReplicaId,
        expected: u32,
        got: u32,
    },
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
