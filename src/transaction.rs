//! Transaction manager.
//!
//! Batches local ops into one atomic transaction with a single
//! logical "send". At most one transaction is open at a time; nested
//! `transact` calls join the outermost.

use crate::collab::CollabId;
use crate::meta::{MetaAccumulator, MetaRequest};
use crate::time::VectorClock;

/// One recorded `(path, payload)` op, in submission order.
#[derive(Debug, Clone)]
pub struct PendingOp {
    pub path: CollabId,
    pub payload: Vec<u8>,
}

/// State of the one transaction that may be open at a time.
#[derive(Debug, Default)]
pub struct OpenTransaction {
    pub sender_counter: u32,
    /// The sender's vector clock captured when the transaction opened
    /// (rule 2: "as known to the sender at send time").
    pub header_vc: VectorClock,
    pub meta: MetaAccumulator,
    pub ops: Vec<PendingOp>,
    /// Captured the first time any op in this transaction requests
    /// it, so the value a Collab sees during its own local echo
    /// matches exactly what later goes out on the wire.
    pub wall_clock_time: Option<u64>,
    pub lamport_timestamp: Option<u64>,
}

/// Tracks the single open transaction and the join depth of nested
/// `transact` calls.
#[derive(Debug, Default)]
pub struct TransactionManager {
    current: Option<OpenTransaction>,
    depth: u32,
}

impl TransactionManager {
    pub fn new() -> Self {
        TransactionManager::default()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Enters a transaction scope. A nested call just bumps the depth
    /// counter; it does not start a second transaction.
    pub fn enter(&mut self) {
        self.depth += 1;
    }

    /// Leaves a transaction scope, returning the completed
    /// transaction once the outermost scope closes. Returns `None`
    /// for a join of a still-open outer scope, and `None` for an
    /// outermost scope that recorded zero ops (rule 4: empty
    /// transactions emit nothing).
    pub fn leave(&mut self) -> Option<OpenTransaction> {
        debug_assert!(self.depth > 0, "leave() without a matching enter()");
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.current.take()
        } else {
            None
        }
    }

    /// Records one op. On the first op of the transaction, assigns
    /// the sender counter and captures the header vector clock via
    /// the supplied closures (rule 2).
    pub fn record_op(
        &mut self,
        path: CollabId,
        payload: Vec<u8>,
        request: &MetaRequest,
        next_counter: impl FnOnce() -> u32,
        header_vc: impl FnOnce() -> VectorClock,
    ) -> u32 {
        let tx = self.current.get_or_insert_with(|| OpenTransaction {
            sender_counter: next_counter(),
            header_vc: header_vc(),
            meta: MetaAccumulator::default(),
            ops: Vec::new(),
            wall_clock_time: None,
            lamport_timestamp: None,
        });
        tx.meta.record_request(request);
        tx.ops.push(PendingOp { path, payload });
        tx.sender_counter
    }

    pub fn current(&self) -> Option<&OpenTransaction> {
        self.current.as_ref()
    }

    /// Fills in the transaction's wall-clock time on the first call
    /// that needs it; later calls see the already-captured value.
    /// `None` if no transaction is open.
    pub fn ensure_wall_clock_time(&mut self, make: impl FnOnce() -> u64) -> Option<u64> {
        let tx = self.current.as_mut()?;
        Some(*tx.wall_clock_time.get_or_insert_with(make))
    }

    pub fn ensure_lamport_timestamp(&mut self, make: impl FnOnce() -> u64) -> Option<u64> {
        let tx = self.current.as_mut()?;
        Some(*tx.lamport_timestamp.get_or_insert_with(make))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_enter_only_commits_at_outermost_leave() {
        let mut mgr = TransactionManager::new();
        mgr.enter();
        mgr.enter();
        assert!(mgr.leave().is_none());
        mgr.record_op(
            CollabId::root(),
            vec![1],
            &MetaRequest::none(),
            || 1,
            VectorClock::new,
        );
        let completed = mgr.leave().unwrap();
        assert_eq!(completed.ops.len(), 1);
        assert_eq!(completed.sender_counter, 1);
    }

    #[test]
    fn empty_transaction_yields_no_completed_transaction() {
        let mut mgr = TransactionManager::new();
        mgr.enter();
        assert!(mgr.leave().is_none());
    }

    #[test]
    fn counter_and_header_vc_are_fixed_at_first_op() {
        let mut mgr = TransactionManager::new();
        mgr.enter();
        let mut calls = 0;
        mgr.record_op(CollabId::root(), vec![1], &MetaRequest::none(), || {
            calls += 1;
            5
        }, VectorClock::new);
        mgr.record_op(CollabId::root(), vec![2], &MetaRequest::none(), || {
            calls += 1;
            99
        }, VectorClock::new);
        let completed = mgr.leave().unwrap();
        assert_eq!(calls, 1, "next_counter must only be invoked on the first op");
        assert_eq!(completed.sender_counter, 5);
        assert_eq!(completed.ops.len(), 2);
    }
}
