//! Vector-clock ledger.
//!
//! Tracks the vector clock of *applied* transactions. Distinct from
//! the bare `VectorClock` data type in `time::vector`: this wraps it
//! with the ledger's specific operation set (`get`/`advance`/
//! `snapshot`/`merge_max`) and the monotonicity precondition on
//! `advance`, which gates every mutation of the applied clock through
//! a single precondition check before the state changes.

use crate::error::{RuntimeError, Result};
use crate::replica::ReplicaId;
use crate::time::VectorClock;

#[derive(Debug, Clone, Default)]
pub struct VectorClockLedger {
    vc: VectorClock,
}

impl VectorClockLedger {
    pub fn new() -> Self {
        VectorClockLedger {
            vc: VectorClock::new(),
        }
    }

    /// Absent sender reads as 0.
    pub fn get(&self, sender: &ReplicaId) -> u32 {
        self.vc.get(sender)
    }

    /// Advances `sender`'s applied counter by exactly one. Fails with
    /// `LedgerPrecondition` if `counter != current + 1` — all
    /// mutation of the ledger happens through this single gate so the
    /// counter-monotonicity invariant cannot be violated by a caller.
    pub fn advance(&mut self, sender: ReplicaId, counter: u32) -> Result<()> {
        let current = self.get(&sender);
        if counter != current + 1 {
            return Err(RuntimeError::LedgerPrecondition {
                sender,
                expected: current + 1,
                got: counter,
            });
        }
        self.vc.set(sender, counter);
        Ok(())
    }

    /// Read-only view of the full applied vector clock.
    pub fn snapshot(&self) -> VectorClock {
        self.vc.clone()
    }

    /// Element-wise max merge, used only during `load`: new
    /// `(sender, counter)` pairs advance the local clock without
    /// going through `advance`'s strict precondition, since a loaded
    /// clock may jump the local replica forward by more than one
    /// transaction at a time.
    pub fn merge_max(&mut self, other: &VectorClock) {
        self.vc.merge_into(other);
    }

    /// True iff a transaction from `sender` with `counter` and causal
    /// context `tx_vc` is ready to apply against this ledger: the
    /// sender's counter is its immediate successor here, and every
    /// other sender referenced in `tx_vc` is already at least as
    /// advanced here as it was for the transaction's sender.
    pub fn is_ready(&self, sender: &ReplicaId, counter: u32, tx_vc: &VectorClock) -> bool {
        if self.get(sender) != counter - 1 {
            return false;
        }
        for (other_sender, &other_counter) in &tx_vc.0 {
            if other_sender == sender {
                continue;
            }
            if self.get(other_sender) < other_counter {
                return false;
            }
        }
        true
    }
}
