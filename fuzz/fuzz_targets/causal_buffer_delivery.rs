#![no_main]

// Harness: causal_buffer_delivery
// Feeds an arbitrary arrival order of same-sender transactions into the
// causal buffer and checks the buffer only ever reports a transaction
// ready when the ledger's counter for that sender is exactly one behind
// (spec.md §4.3 "ready predicate"), and that repeatedly draining leaves
// nothing ready against the final ledger.

use libfuzzer_sys::fuzz_target;
use arbitrary::Arbitrary;

use braid_core::buffer::CausalBuffer;
use braid_core::collab::CollabId;
use braid_core::ledger::VectorClockLedger;
use braid_core::replica::ReplicaId;
use braid_core::wire::{WireOp, WireTransaction};

#[derive(Arbitrary, Debug, Clone)]
struct Arrival {
    sender_tag: u8,
    counter: u16,
}

fn tx(sender: ReplicaId, counter: u32) -> WireTransaction {
    WireTransaction {
        sender_id: sender,
        sender_counter: counter,
        vc_keys: vec![],
        vc_values: vec![],
        maximal_vc_key_count: None,
        wall_clock_time: None,
        lamport_timestamp: None,
        ops: vec![WireOp {
            path: CollabId::root(),
            payload: vec![],
        }],
    }
}

fuzz_target!(|arrivals: Vec<Arrival>| {
    let mut ledger = VectorClockLedger::new();
    let mut buffer = CausalBuffer::new();

    for arrival in arrivals.iter().take(64) {
        let sender = ReplicaId::from_str_lossy(&format!("r{}", arrival.sender_tag % 4));
        buffer.enqueue(&ledger, tx(sender, arrival.counter as u32 % 32));

        while let Some(buffered) = buffer.next_ready(&ledger) {
            let expected_next = ledger.get(&buffered.tx.sender_id) + 1;
            assert_eq!(buffered.tx.sender_counter, expected_next);
            ledger
                .advance(buffered.tx.sender_id, buffered.tx.sender_counter)
                .expect("ready transactions always satisfy the ledger precondition");
        }
    }

    assert!(buffer.next_ready(&ledger).is_none());
});
