//! The receive-side half of the sub-CRDT runtime API: the contract a
//! leaf data type implements so the Collab tree can route ops, save,
//! load, and garbage-collect it without knowing its concrete
//! algorithm.

use crate::error::Result;
use crate::meta::{LoadMeta, ReceiveMeta};

/// Implemented by primitive (leaf) Collabs: counters, registers,
/// sequences, rich text, etc. The concrete algorithms live outside
/// this crate; this trait is their contract with the runtime.
pub trait PrimitiveCollab: std::fmt::Debug {
    /// Applies a remotely-delivered or locally-echoed opaque payload.
    /// Implementations should treat `meta.vector_clock.get(..)` entries
    /// they did not read during their own echoed apply as
    /// possibly-stale zeros: during local echo, every key actually
    /// queried through `get` is recorded and included on the wire, so
    /// reading a key here is itself the way to request it.
    fn receive(&mut self, payload: &[u8], meta: &ReceiveMeta) -> Result<()>;

    /// Produces this Collab's own serialized state, or `None` if it
    /// has nothing to contribute (e.g. it is in its GC-eligible
    /// initial state).
    fn save(&self) -> Option<Vec<u8>>;

    /// Restores state from a previous `save`, or re-initializes to
    /// the default state when `bytes` is `None` (GC'd on a prior
    /// replica). `meta` carries both the local and loaded vector
    /// clocks so the Collab can merge rather than overwrite.
    fn load(&mut self, bytes: Option<&[u8]>, meta: &LoadMeta);

    /// True when this Collab is in its initial state and may be
    /// omitted from saved output.
    fn can_gc(&self) -> bool {
        false
    }
}
