#![no_main]

// Harness: wire_transaction_roundtrip
// Checks that any bytes postcard accepts as a WireTransaction come back
// unchanged through a decode -> encode -> decode cycle, and that decode
// never panics on arbitrary input.

use libfuzzer_sys::fuzz_target;

use braid_core::wire::WireTransaction;

fuzz_target!(|data: &[u8]| {
    if let Ok(tx) = WireTransaction::decode(data) {
        let reencoded = tx.encode().expect("a decoded transaction always re-encodes");
        let tx2 = WireTransaction::decode(&reencoded).expect("re-encoded bytes always decode");
        assert_eq!(tx, tx2);
    }
});
