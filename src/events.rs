//! Event pump.
//!
//! Four event kinds at the document level; this module owns three of
//! them generically (`Send`, `Update`, `Change`) and lets custom
//! sub-CRDT events pass through untouched (those live outside this
//! crate). A single event queue per document emits synchronously but
//! tracks nesting depth so `Change` coalesces across a batch.

/// `Update`'s `kind` discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Message,
    SavedState,
}

/// A document-level event.
#[derive(Debug, Clone)]
pub enum Event {
    /// A transaction's serialized bytes, ready to broadcast.
    Send { bytes: Vec<u8> },
    Update {
        kind: UpdateKind,
        caller: Option<String>,
    },
    /// No payload; a hint to refresh UI.
    Change,
}

type Handler = Box<dyn FnMut(&Event)>;

/// Dispatches events synchronously to subscribers, coalescing `Change`
/// across a batch of nested remote deliveries into exactly one.
#[derive(Default)]
pub struct EventPump {
    handlers: Vec<Handler>,
    batch_depth: u32,
    change_pending: bool,
}

impl EventPump {
    pub fn new() -> Self {
        EventPump::default()
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&Event) + 'static) {
        self.handlers.push(Box::new(handler));
    }

    fn dispatch(&mut self, event: Event) {
        for handler in &mut self.handlers {
            handler(&event);
        }
    }

    pub fn emit_send(&mut self, bytes: Vec<u8>) {
        self.dispatch(Event::Send { bytes });
    }

    pub fn emit_update(&mut self, kind: UpdateKind, caller: Option<String>) {
        self.dispatch(Event::Update { kind, caller });
    }

    /// Emits `Change` immediately outside a batch; inside one, defers
    /// it to a single emission at the outermost `end_batch`.
    pub fn emit_change(&mut self) {
        if self.batch_depth > 0 {
            self.change_pending = true;
        } else {
            self.dispatch(Event::Change);
        }
    }

    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Ends one level of batching; at the outermost level, flushes a
    /// pending coalesced `Change` if any deliveries occurred.
    pub fn end_batch(&mut self) {
        debug_assert!(self.batch_depth > 0, "end_batch() without begin_batch()");
        self.batch_depth = self.batch_depth.saturating_sub(1);
        if self.batch_depth == 0 && self.change_pending {
            self.change_pending = false;
            self.dispatch(Event::Change);
        }
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn change_outside_batch_emits_immediately() {
        let mut pump = EventPump::new();
        let seen = Rc::new(RefCell::new(0));
        let seen_clone = seen.clone();
        pump.subscribe(move |event| {
            if matches!(event, Event::Change) {
                *seen_clone.borrow_mut() += 1;
            }
        });
        pump.emit_change();
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn batched_changes_coalesce_to_one() {
        let mut pump = EventPump::new();
        let seen = Rc::new(RefCell::new(0));
        let seen_clone = seen.clone();
        pump.subscribe(move |event| {
            if matches!(event, Event::Change) {
                *seen_clone.borrow_mut() += 1;
            }
        });

        pump.begin_batch();
        pump.emit_change();
        pump.emit_change();
        pump.emit_change();
        assert_eq!(*seen.borrow(), 0, "Change must not fire mid-batch");
        pump.end_batch();
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn zero_deliveries_in_a_batch_emits_no_change() {
        let mut pump = EventPump::new();
        let seen = Rc::new(RefCell::new(0));
        let seen_clone = seen.clone();
        pump.subscribe(move |event| {
            if matches!(event, Event::Change) {
                *seen_clone.borrow_mut() += 1;
            }
        });
        pump.begin_batch();
        pump.end_batch();
        assert_eq!(*seen.borrow(), 0);
    }

    #[test]
    fn nested_batches_only_flush_at_outermost() {
        let mut pump = EventPump::new();
        let seen = Rc::new(RefCell::new(0));
        let seen_clone = seen.clone();
        pump.subscribe(move |event| {
            if matches!(event, Event::Change) {
                *seen_clone.borrow_mut() += 1;
            }
        });
        pump.begin_batch();
        pump.begin_batch();
        pump.emit_change();
        pump.end_batch();
        assert_eq!(*seen.borrow(), 0);
        pump.end_batch();
        assert_eq!(*seen.borrow(), 1);
    }
}
