//! Vector clock data type: a map `senderID -> counter` summarizing
//! the transactions applied from each sender.
//!
//! Same merge-by-max algebra and `PartialOrder` comparison as the
//! logical-clock primitives this crate's `time` module builds on,
//! keyed on `ReplicaId` and `u32` counters to match this crate's wire
//! format (`vcValues: [u32]`).

use crate::replica::ReplicaId;
use std::collections::HashMap;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PartialOrder {
    LessThan,
    GreaterThan,
    Equal,
    Concurrent,
}

/// A map `ReplicaId -> highest counter seen from that sender`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VectorClock(pub HashMap<ReplicaId, u32>);

impl VectorClock {
    pub fn new() -> Self {
        VectorClock(HashMap::new())
    }

    /// Absent entries read as 0.
    pub fn get(&self, replica: &ReplicaId) -> u32 {
        self.0.get(replica).copied().unwrap_or(0)
    }

    pub fn set(&mut self, replica: ReplicaId, counter: u32) {
        self.0.insert(replica, counter);
    }

    /// Element-wise max merge, used both by the ledger's `mergeMax`
    /// during load and by remote-event processing.
    pub fn merge_into(&mut self, other: &VectorClock) {
        for (replica, &counter) in &other.0 {
            let slot = self.0.entry(*replica).or_insert(0);
            *slot = (*slot).max(counter);
        }
    }

    pub fn compare(&self, other: &VectorClock) -> PartialOrder {
        let mut self_le_other = true;
        let mut other_le_self = true;

        let mut keys: std::collections::HashSet<&ReplicaId> = self.0.keys().collect();
        keys.extend(other.0.keys());

        for key in keys {
            let a = self.get(key);
            let b = other.get(key);
            if a > b {
                self_le_other = false;
            }
            if a < b {
                other_le_self = false;
            }
        }

        match (self_le_other, other_le_self) {
            (true, true) => PartialOrder::Equal,
            (true, false) => PartialOrder::LessThan,
            (false, true) => PartialOrder::GreaterThan,
            (false, false) => PartialOrder::Concurrent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(tag: &str) -> ReplicaId {
        ReplicaId::from_str_lossy(tag)
    }

    #[test]
    fn merge_into_takes_elementwise_max() {
        let mut local = VectorClock::new();
        local.set(rid("a"), 5);
        local.set(rid("b"), 3);

        let mut incoming = VectorClock::new();
        incoming.set(rid("a"), 7);
        incoming.set(rid("c"), 4);

        local.merge_into(&incoming);
        assert_eq!(local.get(&rid("a")), 7);
        assert_eq!(local.get(&rid("b")), 3);
        assert_eq!(local.get(&rid("c")), 4);
    }

    #[test]
    fn merge_into_empty_incoming_is_noop() {
        let mut local = VectorClock::new();
        local.set(rid("a"), 5);
        let before = local.clone();
        local.merge_into(&VectorClock::new());
        assert_eq!(local, before);
    }

    #[test]
    fn compare_equal() {
        let mut vc1 = VectorClock::new();
        vc1.set(rid("a"), 1);
        let vc2 = vc1.clone();
        assert_eq!(vc1.compare(&vc2), PartialOrder::Equal);
    }

    #[test]
    fn compare_less_and_greater_than() {
        let mut vc1 = VectorClock::new();
        vc1.set(rid("a"), 1);
        let mut vc2 = vc1.clone();
        vc2.set(rid("a"), 2);

        assert_eq!(vc1.compare(&vc2), PartialOrder::LessThan);
        assert_eq!(vc2.compare(&vc1), PartialOrder::GreaterThan);
    }

    #[test]
    fn compare_concurrent() {
        let mut vc1 = VectorClock::new();
        vc1.set(rid("a"), 2);
        vc1.set(rid("b"), 1);

        let mut vc2 = VectorClock::new();
        vc2.set(rid("a"), 1);
        vc2.set(rid("b"), 2);

        assert_eq!(vc1.compare(&vc2), PartialOrder::Concurrent);
    }
}
