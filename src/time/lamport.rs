//! Optional Lamport clock: `lamportTimestamp` is an optional
//! per-transaction field. Kept as a small, separate utility rather
//! than folded into `VectorClock` — a document keeps its own scalar
//! Lamport counter beside, not inside, its vector clock.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LamportClock(u64);

impl LamportClock {
    pub fn new() -> Self {
        LamportClock(0)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// Advances the clock past `observed` and returns the new local
    /// value: `max(observed, local + 1)`, the standard Lamport tick
    /// rule for an event that happens-after `observed`.
    pub fn tick_past(&mut self, observed: u64) -> u64 {
        self.0 = observed.max(self.0 + 1);
        self.0
    }

    /// Merges in a remote timestamp without generating a new local
    /// event (the Lamport-merge half of receiving a remote op).
    pub fn merge(&mut self, observed: u64) {
        self.0 = self.0.max(observed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_past_advances_monotonically() {
        let mut clock = LamportClock::new();
        assert_eq!(clock.tick_past(0), 1);
        assert_eq!(clock.tick_past(1), 2);
        assert_eq!(clock.tick_past(10), 10);
        assert_eq!(clock.tick_past(1), 11);
    }

    #[test]
    fn merge_never_decreases() {
        let mut clock = LamportClock::new();
        clock.tick_past(5);
        clock.merge(2);
        assert_eq!(clock.get(), 5);
        clock.merge(9);
        assert_eq!(clock.get(), 9);
    }
}
