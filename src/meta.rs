//! Metadata layer.
//!
//! Attaches `(senderID, senderCounter, vectorClock, wallClockTime?,
//! lamportTimestamp?)` to outgoing transactions and exposes the full
//! struct to Collabs on receive. Vector-clock key usage is discovered
//! rather than statically declared: reads of `ReceiveMeta::vector_clock`
//! during the sender's own echoed apply are instrumented so the key set
//! serialized on send is exactly "explicitly requested ∪ read-during-echo".

use crate::replica::ReplicaId;
use crate::time::VectorClock;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// What a local op asks the metadata layer to include on send.
#[derive(Debug, Clone, Default)]
pub struct MetaRequest {
    pub vector_clock_keys: HashSet<ReplicaId>,
    pub wall_clock_time: bool,
    pub lamport_timestamp: bool,
}

impl MetaRequest {
    pub fn none() -> Self {
        MetaRequest::default()
    }

    pub fn with_key(mut self, key: ReplicaId) -> Self {
        self.vector_clock_keys.insert(key);
        self
    }

    pub fn with_wall_clock_time(mut self) -> Self {
        self.wall_clock_time = true;
        self
    }

    pub fn with_lamport_timestamp(mut self) -> Self {
        self.lamport_timestamp = true;
        self
    }

    fn merge(&mut self, other: &MetaRequest) {
        self.vector_clock_keys
            .extend(other.vector_clock_keys.iter().cloned());
        self.wall_clock_time |= other.wall_clock_time;
        self.lamport_timestamp |= other.lamport_timestamp;
    }
}

/// Accumulates, over the lifetime of one open transaction, the union
/// of every op's explicit `MetaRequest` plus every vector-clock key
/// actually read by a Collab during its own echoed local apply (the
/// "used keys" set). The `used_keys` set is shared (via `Rc`) with the
/// `TrackedVectorClock` handed to Collabs during that echo, so a read
/// through it is visible here without the transaction manager needing
/// to poll anything.
#[derive(Debug, Default)]
pub struct MetaAccumulator {
    requested: MetaRequest,
    used_keys: Rc<RefCell<HashSet<ReplicaId>>>,
}

impl MetaAccumulator {
    pub fn record_request(&mut self, request: &MetaRequest) {
        self.requested.merge(request);
    }

    /// A cloneable handle onto this accumulator's used-keys set, to be
    /// embedded in the `TrackedVectorClock` passed to a Collab's own
    /// local echo.
    pub fn used_keys_handle(&self) -> Rc<RefCell<HashSet<ReplicaId>>> {
        self.used_keys.clone()
    }

    pub fn wall_clock_time_requested(&self) -> bool {
        self.requested.wall_clock_time
    }

    pub fn lamport_timestamp_requested(&self) -> bool {
        self.requested.lamport_timestamp
    }

    /// The key set to actually serialize: explicit requests union
    /// read-during-echo keys.
    pub fn keys_to_send(&self) -> HashSet<ReplicaId> {
        let mut keys = self.requested.vector_clock_keys.clone();
        keys.extend(self.used_keys.borrow().iter().cloned());
        keys
    }
}

/// The vector clock as exposed to a Collab's `receive`. During the
/// sender's own local echo it is *tracked*: every `get` records the
/// queried key into the transaction's `MetaAccumulator` so it is
/// included on the wire even if no op explicitly requested it. A
/// remotely delivered transaction's clock is untracked — by the time a
/// transaction arrives, the sender has already decided which keys to
/// include, so there is nothing further to accumulate.
#[derive(Debug, Clone)]
pub struct TrackedVectorClock {
    vc: VectorClock,
    used_keys: Option<Rc<RefCell<HashSet<ReplicaId>>>>,
}

impl TrackedVectorClock {
    pub fn untracked(vc: VectorClock) -> Self {
        TrackedVectorClock {
            vc,
            used_keys: None,
        }
    }

    pub fn tracked(vc: VectorClock, used_keys: Rc<RefCell<HashSet<ReplicaId>>>) -> Self {
        TrackedVectorClock {
            vc,
            used_keys: Some(used_keys),
        }
    }

    /// Reads one entry. Entries a Collab never reads may legitimately
    /// be omitted from the wire, so only queried keys are recorded.
    pub fn get(&self, replica: &ReplicaId) -> u32 {
        if let Some(used_keys) = &self.used_keys {
            used_keys.borrow_mut().insert(*replica);
        }
        self.vc.get(replica)
    }

    /// The full clock, without instrumenting any read — for
    /// runtime-internal inspection (e.g. building the wire header)
    /// where reading must not count as a Collab's own usage.
    pub fn snapshot(&self) -> VectorClock {
        self.vc.clone()
    }
}

/// Full metadata exposed to a Collab on receive. Vector-clock entries
/// the sender did not transmit read as 0 and MUST be treated by the
/// Collab as "possibly incorrect 0", per the metadata layer's
/// wire-size-minimizing contract.
#[derive(Debug, Clone)]
pub struct ReceiveMeta {
    pub sender: ReplicaId,
    pub sender_counter: u32,
    pub vector_clock: TrackedVectorClock,
    pub wall_clock_time: Option<u64>,
    pub lamport_timestamp: Option<u64>,
    /// True when this apply is the sender's own synchronous local
    /// echo rather than a remotely delivered transaction.
    pub is_local_echo: bool,
}

/// Metadata passed into `loadPrimitive`: both the local (in-memory,
/// pre-load) and the loaded vector clocks, so a Collab can resolve
/// conflicts between the two at load time.
#[derive(Debug, Clone)]
pub struct LoadMeta {
    pub local_vector_clock: VectorClock,
    pub loaded_vector_clock: VectorClock,
}
