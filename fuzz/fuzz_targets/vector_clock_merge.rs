#![no_main]

// Harness: vector_clock_merge
// Checks two algebraic properties the ready-predicate depends on
// (spec.md §3): merge is idempotent, and merging is commutative on the
// resulting `get()` values regardless of which side starts as `self`.

use libfuzzer_sys::fuzz_target;
use arbitrary::Arbitrary;

use braid_core::replica::ReplicaId;
use braid_core::time::VectorClock;

#[derive(Arbitrary, Debug, Clone)]
struct Entry {
    replica_tag: u8,
    counter: u32,
}

#[derive(Arbitrary, Debug, Clone)]
struct Input {
    left: Vec<Entry>,
    right: Vec<Entry>,
}

fn build(entries: &[Entry]) -> VectorClock {
    let mut vc = VectorClock::new();
    for entry in entries {
        let tag = format!("r{}", entry.replica_tag % 8);
        let replica = ReplicaId::from_str_lossy(&tag);
        let existing = vc.get(&replica);
        vc.set(replica, existing.max(entry.counter));
    }
    vc
}

fuzz_target!(|input: Input| {
    let left = build(&input.left);
    let right = build(&input.right);

    let mut merged_lr = left.clone();
    merged_lr.merge_into(&right);

    let mut merged_rl = right.clone();
    merged_rl.merge_into(&left);

    for tag in 0u8..8 {
        let replica = ReplicaId::from_str_lossy(&format!("r{tag}"));
        assert_eq!(merged_lr.get(&replica), merged_rl.get(&replica));
    }

    let mut merged_twice = merged_lr.clone();
    merged_twice.merge_into(&right);
    for tag in 0u8..8 {
        let replica = ReplicaId::from_str_lossy(&format!("r{tag}"));
        assert_eq!(merged_lr.get(&replica), merged_twice.get(&replica));
    }
});
