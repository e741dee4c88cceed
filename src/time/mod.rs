//! Logical-time utilities (Lamport, vector clocks).

pub mod lamport;
pub mod vector;

pub use lamport::LamportClock;
pub use vector::{PartialOrder, VectorClock};
