//! The Document: ties the ledger, causal buffer, Collab tree,
//! transaction manager, metadata layer, and event pump into the
//! runtime's external interface.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::buffer::CausalBuffer;
use crate::collab::{CollabId, CollabNode, CollabTree};
use crate::error::{Result, RuntimeError};
use crate::events::{Event, EventPump, UpdateKind};
use crate::ledger::VectorClockLedger;
use crate::meta::{LoadMeta, MetaRequest, ReceiveMeta, TrackedVectorClock};
use crate::replica::ReplicaId;
use crate::save_load;
use crate::time::LamportClock;
use crate::transaction::TransactionManager;
use crate::wire::{WireOp, WireSavedState, WireTransaction};

/// Construction-time configuration: a typed builder rather than a
/// loose options bag.
#[derive(Clone)]
pub struct DocumentOptions {
    pub replica_id: Option<ReplicaId>,
    /// Whether a local op outside an explicit `transact` opens an
    /// auto-transaction that commits immediately. Since this crate has
    /// no task/microtask boundary of its own, "end of the current
    /// synchronous task" collapses to "immediately after the call
    /// that issued it returns".
    pub auto_transactions: bool,
    /// Soft cap on the causal buffer's pending-transaction count.
    /// Exceeding it only logs a warning (`tracing::warn!`); it never
    /// drops already-admitted causal state, since doing so could make
    /// a transaction permanently undeliverable.
    pub causal_buffer_capacity: Option<usize>,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        DocumentOptions {
            replica_id: None,
            auto_transactions: true,
            causal_buffer_capacity: None,
        }
    }
}

impl DocumentOptions {
    pub fn new() -> Self {
        DocumentOptions::default()
    }

    pub fn with_replica_id(mut self, id: ReplicaId) -> Self {
        self.replica_id = Some(id);
        self
    }

    pub fn with_auto_transactions(mut self, enabled: bool) -> Self {
        self.auto_transactions = enabled;
        self
    }

    pub fn with_causal_buffer_capacity(mut self, capacity: usize) -> Self {
        self.causal_buffer_capacity = Some(capacity);
        self
    }
}

/// The replication runtime for one document instance (spec.md §2-§6).
pub struct Document {
    replica_id: ReplicaId,
    ledger: VectorClockLedger,
    buffer: CausalBuffer,
    tree: CollabTree,
    transactions: TransactionManager,
    events: EventPump,
    lamport: LamportClock,
    options: DocumentOptions,
}

impl Document {
    pub fn new(options: DocumentOptions) -> Self {
        let replica_id = options.replica_id.unwrap_or_else(ReplicaId::generate);
        tracing::debug!(replica = %replica_id, "document constructed");
        Document {
            replica_id,
            ledger: VectorClockLedger::new(),
            buffer: CausalBuffer::new(),
            tree: CollabTree::new(),
            transactions: TransactionManager::new(),
            events: EventPump::new(),
            lamport: LamportClock::new(),
            options,
        }
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    pub fn vector_clock(&self) -> crate::time::VectorClock {
        self.ledger.snapshot()
    }

    pub fn tree(&self) -> &CollabTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut CollabTree {
        &mut self.tree
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&Event) + 'static) {
        self.events.subscribe(handler);
    }

    /// Registers a fixed (schema-time) child under `parent`
    /// (spec.md §4.5 "Registration").
    pub fn register(&mut self, parent: &CollabId, name: impl Into<String>, node: CollabNode) -> Result<()> {
        self.tree.register(parent, name, node)
    }

    /// `fromID` (spec.md §6): the live Collab at `id`, or `None` if the
    /// path never existed or was deleted. Since this crate addresses
    /// Collabs by path rather than by a separate handle object
    /// (§6.1), `idOf` has no work left to do beyond cloning the
    /// `CollabId` a caller already holds — there is no handle type to
    /// convert from.
    pub fn from_id(&self, id: &CollabId) -> Option<&CollabNode> {
        match self.tree.resolve(id) {
            crate::collab::Resolution::Found(node) => Some(node),
            _ => None,
        }
    }

    /// Whether a path currently resolves to a live Collab.
    pub fn contains(&self, id: &CollabId) -> bool {
        if id.is_root() {
            return true;
        }
        matches!(self.tree.resolve(id), crate::collab::Resolution::Found(_))
    }

    /// Wraps `f` in a transaction (spec.md §4.6). Nested calls join
    /// the outermost transaction.
    pub fn transact<T>(&mut self, f: impl FnOnce(&mut Document) -> Result<T>) -> Result<T> {
        self.transactions.enter();
        let result = f(self);
        match result {
            Ok(value) => {
                self.finish_transaction()?;
                Ok(value)
            }
            Err(err) => {
                // Still close the scope so a failed nested op does not
                // wedge the manager in a permanently-open state; the
                // partial ops recorded so far are discarded with it,
                // preserving atomicity (spec.md §3 "atomic unit").
                self.transactions.leave();
                Err(err)
            }
        }
    }

    fn finish_transaction(&mut self) -> Result<()> {
        let Some(completed) = self.transactions.leave() else {
            return Ok(());
        };
        if completed.ops.is_empty() {
            return Ok(());
        }

        let sender_counter = completed.sender_counter;
        let wall_clock_time = completed.wall_clock_time;
        let lamport_timestamp = completed.lamport_timestamp;

        let keys_to_send = completed.meta.keys_to_send();
        let mut vc_keys = Vec::with_capacity(keys_to_send.len());
        let mut vc_values = Vec::with_capacity(keys_to_send.len());
        for key in keys_to_send {
            vc_keys.push(key);
            vc_values.push(completed.header_vc.get(&key));
        }

        let ops = completed
            .ops
            .into_iter()
            .map(|op| WireOp {
                path: op.path,
                payload: op.payload,
            })
            .collect();

        let tx = WireTransaction {
            sender_id: self.replica_id,
            sender_counter,
            vc_keys,
            vc_values,
            maximal_vc_key_count: None,
            wall_clock_time,
            lamport_timestamp,
            ops,
        };

        self.ledger.advance(self.replica_id, sender_counter)?;
        let bytes = tx.encode()?;
        self.events.emit_send(bytes);
        self.events.emit_update(UpdateKind::Message, None);
        self.events.emit_change();
        Ok(())
    }

    /// Sends one op from inside a `transact` closure (the send-side
    /// half of the "Sub-CRDT runtime API", spec.md §6.1): records it
    /// in the open transaction and applies it locally right away
    /// (synchronous local echo, rule 3).
    pub fn send(&mut self, path: &CollabId, payload: &[u8], request: MetaRequest) -> Result<()> {
        if !self.transactions.is_open() {
            return Err(RuntimeError::UsageError(
                "send() called outside an open transaction".to_string(),
            ));
        }

        let replica_id = self.replica_id;
        let ledger = &self.ledger;
        let wants_wall_clock_time = request.wall_clock_time;
        let wants_lamport_timestamp = request.lamport_timestamp;
        let sender_counter = self.transactions.record_op(
            path.clone(),
            payload.to_vec(),
            &request,
            || ledger.get(&replica_id) + 1,
            || ledger.snapshot(),
        );

        let wall_clock_time = if wants_wall_clock_time {
            self.transactions.ensure_wall_clock_time(current_millis)
        } else {
            self.transactions.current().and_then(|tx| tx.wall_clock_time)
        };
        let lamport_timestamp = if wants_lamport_timestamp {
            let lamport = &mut self.lamport;
            self.transactions
                .ensure_lamport_timestamp(|| {
                    let current = lamport.get();
                    lamport.tick_past(current)
                })
        } else {
            self.transactions
                .current()
                .and_then(|tx| tx.lamport_timestamp)
        };

        let current = self.transactions.current().expect("just recorded an op");
        let header_vc = current.header_vc.clone();
        let used_keys = current.meta.used_keys_handle();
        let meta = ReceiveMeta {
            sender: replica_id,
            sender_counter,
            vector_clock: TrackedVectorClock::tracked(header_vc, used_keys),
            wall_clock_time,
            lamport_timestamp,
            is_local_echo: true,
        };
        self.tree
            .route_receive(path, payload, &meta, replica_id, sender_counter)
    }

    /// Delivers a caller's auto-transaction (spec.md §4.6 rule 5): a
    /// single op wrapped in its own transaction when the caller has
    /// not opened one explicitly.
    pub fn send_auto(&mut self, path: &CollabId, payload: &[u8], request: MetaRequest) -> Result<()> {
        if self.transactions.is_open() {
            return self.send(path, payload, request);
        }
        if !self.options.auto_transactions {
            return Err(RuntimeError::UsageError(
                "no open transaction and auto_transactions is disabled".to_string(),
            ));
        }
        let path = path.to_owned();
        let payload = payload.to_vec();
        self.transact(move |doc| doc.send(&path, &payload, request))
    }

    /// Wraps remote delivery inside `f`, coalescing any `Change`
    /// events into exactly one at the end of the outermost batch
    /// (spec.md §4.8).
    pub fn batch_remote_updates<T>(&mut self, f: impl FnOnce(&mut Document) -> T) -> T {
        self.events.begin_batch();
        let result = f(self);
        self.events.end_batch();
        result
    }

    /// Receives raw transaction bytes (spec.md §6 `receive`). Forbidden
    /// while a local transaction is open (spec.md §5 re-entrancy rule).
    pub fn receive(&mut self, bytes: &[u8], caller: Option<String>) -> Result<()> {
        if self.transactions.is_open() {
            return Err(RuntimeError::UsageError(
                "receive() invoked inside an open local transaction".to_string(),
            ));
        }
        let tx = WireTransaction::decode(bytes)?;
        self.deliver(tx, caller)
    }

    fn deliver(&mut self, tx: WireTransaction, caller: Option<String>) -> Result<()> {
        if !self.buffer.enqueue(&self.ledger, tx) {
            return Ok(());
        }
        if let Some(capacity) = self.options.causal_buffer_capacity {
            if self.buffer.len() > capacity {
                tracing::warn!(
                    len = self.buffer.len(),
                    capacity,
                    "causal buffer exceeded its configured soft cap"
                );
            }
        }
        self.drain_ready(caller)
    }

    fn drain_ready(&mut self, caller: Option<String>) -> Result<()> {
        let standalone_batch = !self.events.is_batching();
        if standalone_batch {
            self.events.begin_batch();
        }

        let mut outcome = Ok(());
        while let Some(buffered) = self.buffer.next_ready(&self.ledger) {
            if let Err(err) = self.apply_remote(buffered.tx) {
                outcome = Err(err);
                break;
            }
        }

        if outcome.is_ok() {
            self.events
                .emit_update(UpdateKind::Message, caller.clone());
            self.events.emit_change();
        }
        if standalone_batch {
            self.events.end_batch();
        }
        outcome
    }

    fn apply_remote(&mut self, tx: WireTransaction) -> Result<()> {
        // Validate that every op resolves to something appliable
        // before mutating any Collab state, so a transaction that
        // fails partway through leaves every Collab it addresses
        // untouched (spec.md §3 "remote replicas never observe a
        // partial transaction"; §4.3 "is NOT applied; the ledger is
        // unchanged").
        for op in &tx.ops {
            match self.tree.resolve(&op.path) {
                crate::collab::Resolution::Found(CollabNode::Primitive(_))
                | crate::collab::Resolution::Tombstoned => {}
                crate::collab::Resolution::Found(CollabNode::Composite(_)) => {
                    return Err(RuntimeError::SchemaMismatch {
                        sender: tx.sender_id,
                        counter: tx.sender_counter,
                        path: op.path.clone(),
                        reason: "op addressed a composite Collab directly".to_string(),
                    });
                }
                crate::collab::Resolution::NotFound => {
                    return Err(RuntimeError::SchemaMismatch {
                        sender: tx.sender_id,
                        counter: tx.sender_counter,
                        path: op.path.clone(),
                        reason: "no Collab registered at this path".to_string(),
                    });
                }
            }
        }

        let vector_clock = tx.vector_clock();
        let meta = ReceiveMeta {
            sender: tx.sender_id,
            sender_counter: tx.sender_counter,
            vector_clock: TrackedVectorClock::untracked(vector_clock),
            wall_clock_time: tx.wall_clock_time,
            lamport_timestamp: tx.lamport_timestamp,
            is_local_echo: false,
        };
        if let Some(observed) = tx.lamport_timestamp {
            self.lamport.merge(observed);
        }
        for op in &tx.ops {
            self.tree
                .route_receive(&op.path, &op.payload, &meta, tx.sender_id, tx.sender_counter)?;
        }
        self.ledger.advance(tx.sender_id, tx.sender_counter)?;
        Ok(())
    }

    /// Produces the saved-state byte sequence (spec.md §4.7).
    pub fn save(&self) -> Result<Vec<u8>> {
        let vc = self.ledger.snapshot();
        let mut entries: Vec<(ReplicaId, u32)> = vc.0.iter().map(|(r, c)| (*r, *c)).collect();
        entries.sort_by_key(|(replica, _)| *replica);
        let mut vc_keys = Vec::with_capacity(entries.len());
        let mut vc_values = Vec::with_capacity(entries.len());
        for (replica, counter) in entries {
            vc_keys.push(replica);
            vc_values.push(counter);
        }

        let mut pending_buffer = Vec::new();
        for tx in self.buffer.pending_transactions() {
            pending_buffer.push(tx.encode()?);
        }

        let tree = save_load::build_composite_tree(self.tree.root());
        let saved = WireSavedState {
            vc_keys,
            vc_values,
            pending_buffer,
            tree,
        };
        saved.encode()
    }

    /// Loads a previously saved byte sequence (spec.md §4.7).
    /// Idempotent with respect to already-known causal history.
    pub fn load(&mut self, bytes: &[u8], caller: Option<String>) -> Result<()> {
        if self.transactions.is_open() {
            return Err(RuntimeError::UsageError(
                "load() invoked inside an open local transaction".to_string(),
            ));
        }
        let saved = WireSavedState::decode(bytes)?;
        let loaded_vector_clock = saved.vector_clock();
        let local_vector_clock = self.ledger.snapshot();

        self.ledger.merge_max(&loaded_vector_clock);

        let load_meta = LoadMeta {
            local_vector_clock,
            loaded_vector_clock,
        };
        save_load::apply_composite_tree(self.tree.root_mut(), &saved.tree, &load_meta);

        let mut pending = Vec::with_capacity(saved.pending_buffer.len());
        for bytes in &saved.pending_buffer {
            pending.push(WireTransaction::decode(bytes)?);
        }
        self.buffer.inject(&self.ledger, pending);

        self.events.emit_update(UpdateKind::SavedState, caller.clone());
        self.batch_remote_updates(|doc| doc.drain_ready(caller))?;
        Ok(())
    }
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
