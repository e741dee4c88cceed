//! Causal buffer.
//!
//! Holds parsed remote transactions keyed by `(senderID,
//! senderCounter)` until they're causally ready, then releases them
//! in a frozen tie-break order (ascending sender id, then sender
//! counter) by checking each buffered transaction's readiness against
//! a `VectorClockLedger`.

use crate::ledger::VectorClockLedger;
use crate::replica::ReplicaId;
use crate::wire::WireTransaction;
use std::collections::BTreeMap;

/// A transaction that has arrived but not yet been delivered, either
/// because it isn't causally ready or because delivery of the batch
/// it's in hasn't reached it yet.
#[derive(Debug, Clone)]
pub struct BufferedTransaction {
    pub tx: WireTransaction,
}

#[derive(Debug, Default)]
pub struct CausalBuffer {
    // Keyed by (sender, counter) for O(log n) duplicate detection and
    // deterministic (sender, counter)-ascending iteration when
    // scanning for ready entries.
    pending: BTreeMap<(ReplicaId, u32), BufferedTransaction>,
}

impl CausalBuffer {
    pub fn new() -> Self {
        CausalBuffer::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Enqueues a transaction, silently dropping it if it (or a
    /// causally later transaction from the same sender) has already
    /// been applied.
    ///
    /// Returns `true` if the transaction was newly buffered.
    pub fn enqueue(&mut self, ledger: &VectorClockLedger, tx: WireTransaction) -> bool {
        let key = (tx.sender_id, tx.sender_counter);
        if ledger.get(&tx.sender_id) >= tx.sender_counter {
            tracing::trace!(sender = %tx.sender_id, counter = tx.sender_counter, "dropping duplicate transaction");
            return false;
        }
        if self.pending.contains_key(&key) {
            return false;
        }
        tracing::trace!(sender = %tx.sender_id, counter = tx.sender_counter, "buffering transaction");
        self.pending.insert(key, BufferedTransaction { tx });
        true
    }

    /// Removes and returns one transaction, by the frozen tie-break
    /// order, that is ready to apply against `ledger` — or `None` if
    /// nothing currently is. Callers should call this repeatedly,
    /// applying and advancing `ledger` between calls, until it
    /// returns `None`.
    pub fn next_ready(&mut self, ledger: &VectorClockLedger) -> Option<BufferedTransaction> {
        let key = self
            .pending
            .iter()
            .find(|(_, buffered)| {
                ledger.is_ready(
                    &buffered.tx.sender_id,
                    buffered.tx.sender_counter,
                    &buffered.tx.vector_clock(),
                )
            })
            .map(|(k, _)| *k)?;
        self.pending.remove(&key)
    }

    /// All still-pending transactions, for inclusion in saved state
    /// as opaque per-transaction bytes.
    pub fn pending_transactions(&self) -> impl Iterator<Item = &WireTransaction> {
        self.pending.values().map(|b| &b.tx)
    }

    pub fn inject(&mut self, ledger: &VectorClockLedger, txs: Vec<WireTransaction>) {
        for tx in txs {
            self.enqueue(ledger, tx);
        }
    }
}
