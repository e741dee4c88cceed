//! The Collab tree: named hierarchy of sub-CRDTs.

pub mod id;
pub mod primitive;
pub mod tree;

pub use id::CollabId;
pub use primitive::PrimitiveCollab;
pub use tree::{derive_dynamic_name, ChildSlot, CollabNode, CollabTree, CompositeCollab, Resolution, ResolutionMut};
