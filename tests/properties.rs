//! Property-based tests for the invariants in spec.md §8.

use proptest::prelude::*;

use braid_core::collab::{CollabId, CollabNode, PrimitiveCollab};
use braid_core::{Document, DocumentOptions, LoadMeta, MetaRequest, ReceiveMeta, ReplicaId, Result};

#[derive(Debug, Default)]
struct Counter(i64);

impl PrimitiveCollab for Counter {
    fn receive(&mut self, payload: &[u8], _meta: &ReceiveMeta) -> Result<()> {
        self.0 += i64::from_le_bytes(payload.try_into().unwrap());
        Ok(())
    }
    fn save(&self) -> Option<Vec<u8>> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.to_le_bytes().to_vec())
        }
    }
    fn load(&mut self, bytes: Option<&[u8]>, _meta: &LoadMeta) {
        self.0 = bytes
            .map(|b| i64::from_le_bytes(b.try_into().unwrap()))
            .unwrap_or(0);
    }
    fn can_gc(&self) -> bool {
        self.0 == 0
    }
}

fn rid(tag: &str) -> ReplicaId {
    ReplicaId::from_str_lossy(tag)
}

fn counter_path() -> CollabId {
    CollabId::root().child("counter")
}

fn counter_doc(replica: &str) -> Document {
    let mut doc = Document::new(DocumentOptions::new().with_replica_id(rid(replica)));
    doc.register(
        &CollabId::root(),
        "counter",
        CollabNode::Primitive(Box::new(Counter::default())),
    )
    .unwrap();
    doc
}

fn counter_value(doc: &Document) -> i64 {
    match doc.tree().resolve(&counter_path()) {
        braid_core::collab::Resolution::Found(CollabNode::Primitive(p)) => p
            .save()
            .map(|b| i64::from_le_bytes(b.try_into().unwrap()))
            .unwrap_or(0),
        _ => panic!("expected live primitive"),
    }
}

fn send_frames(doc: &mut Document, deltas: &[i64]) -> Vec<Vec<u8>> {
    use std::cell::RefCell;
    use std::rc::Rc;
    let sent = Rc::new(RefCell::new(Vec::new()));
    let sink = sent.clone();
    doc.subscribe(move |event| {
        if let braid_core::Event::Send { bytes } = event {
            sink.borrow_mut().push(bytes.clone());
        }
    });
    for delta in deltas {
        doc.transact(|d| d.send(&counter_path(), &delta.to_le_bytes(), MetaRequest::none()))
            .unwrap();
    }
    Rc::try_unwrap(sent).unwrap().into_inner()
}

proptest! {
    /// Convergence (spec.md §8): however two replicas interleave each
    /// other's deltas, once every transaction is delivered both ways
    /// they agree on both the counter value and the vector clock.
    #[test]
    fn convergence_holds_for_arbitrary_delta_sequences(
        a_deltas in prop::collection::vec(-100i64..100, 0..8),
        b_deltas in prop::collection::vec(-100i64..100, 0..8),
    ) {
        let mut a = counter_doc("aaa");
        let mut b = counter_doc("bbb");

        let a_frames = send_frames(&mut a, &a_deltas);
        let b_frames = send_frames(&mut b, &b_deltas);

        for frame in &a_frames {
            b.receive(frame, None).unwrap();
        }
        for frame in &b_frames {
            a.receive(frame, None).unwrap();
        }

        prop_assert_eq!(a.vector_clock(), b.vector_clock());
        prop_assert_eq!(counter_value(&a), counter_value(&b));
        prop_assert_eq!(counter_value(&a), a_deltas.iter().sum::<i64>() + b_deltas.iter().sum::<i64>());
    }

    /// Idempotent receive (spec.md §8): delivering the exact same
    /// transaction bytes twice has the same effect as delivering them
    /// once.
    #[test]
    fn idempotent_receive_holds_for_arbitrary_delta(delta in -1000i64..1000) {
        let mut a = counter_doc("aaa");
        let a_frames = send_frames(&mut a, &[delta]);
        let frame = &a_frames[0];

        let mut b = counter_doc("bbb");
        b.receive(frame, None).unwrap();
        let value_after_first = counter_value(&b);
        let vc_after_first = b.vector_clock();

        b.receive(frame, None).unwrap();
        prop_assert_eq!(counter_value(&b), value_after_first);
        prop_assert_eq!(b.vector_clock(), vc_after_first);
    }

    /// Save/load round-trip (spec.md §8): a fresh replica that loads
    /// another's saved bytes ends up with the same vector clock and
    /// counter value.
    #[test]
    fn save_load_round_trip_matches_vector_clock_and_value(
        deltas in prop::collection::vec(-50i64..50, 0..6),
    ) {
        let mut a = counter_doc("aaa");
        let _ = send_frames(&mut a, &deltas);

        let saved = a.save().unwrap();
        let mut c = counter_doc("ccc");
        c.load(&saved, None).unwrap();

        prop_assert_eq!(a.vector_clock(), c.vector_clock());
        prop_assert_eq!(counter_value(&a), counter_value(&c));
    }

    /// Self-echo (spec.md §8): immediately after a local send inside
    /// `transact`, the affected Collab already reflects it.
    #[test]
    fn self_echo_is_visible_inside_the_same_transaction(delta in -1000i64..1000) {
        let mut a = counter_doc("aaa");
        let mut observed = 0i64;
        a.transact(|doc| {
            doc.send(&counter_path(), &delta.to_le_bytes(), MetaRequest::none())?;
            observed = counter_value(doc);
            Ok(())
        })
        .unwrap();
        prop_assert_eq!(observed, delta);
    }
}
