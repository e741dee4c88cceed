#![no_main]

// Harness: wire_saved_state_roundtrip
// Same contract as wire_transaction_roundtrip, for the saved-state
// document format (spec.md §6 "Saved state").

use libfuzzer_sys::fuzz_target;

use braid_core::wire::WireSavedState;

fuzz_target!(|data: &[u8]| {
    if let Ok(saved) = WireSavedState::decode(data) {
        let reencoded = saved.encode().expect("a decoded saved state always re-encodes");
        let saved2 = WireSavedState::decode(&reencoded).expect("re-encoded bytes always decode");
        assert_eq!(saved, saved2);
    }
});
