//! The Collab tree.
//!
//! Modeled as a variant: a node is either a `Primitive` leaf (opaque
//! bytes, pluggable algorithm) or a `Composite` interior (a
//! deterministically-ordered map of named children). The tree holds
//! children by direct ownership (`Box`/`BTreeMap`) and never stores a
//! parent back-reference: a Collab never calls "up" into its parent,
//! so no reference cycle can arise. Dispatch instead always starts at
//! the root and walks down a `CollabId` path.

use crate::collab::id::CollabId;
use crate::collab::primitive::PrimitiveCollab;
use crate::error::{Result, RuntimeError};
use crate::meta::ReceiveMeta;
use crate::replica::ReplicaId;
use std::collections::BTreeMap;

/// A slot in a composite's children map: either a live node or a
/// tombstone left behind by deletion. Deletion is terminal: a
/// tombstoned slot never becomes `Live` again.
pub enum ChildSlot {
    Live(CollabNode),
    Tombstone,
}

/// One node of the Collab tree.
pub enum CollabNode {
    Primitive(Box<dyn PrimitiveCollab>),
    Composite(CompositeCollab),
}

impl CollabNode {
    pub(crate) fn can_gc(&self) -> bool {
        match self {
            CollabNode::Primitive(p) => p.can_gc(),
            CollabNode::Composite(c) => c.can_gc(),
        }
    }
}

/// An interior node: an ordered (lexicographic, for save-output
/// determinism across replicas) map of named children, plus whatever
/// structural bytes the runtime itself wants to persist for this
/// container (its own tombstone set). Concrete collection algorithms
/// live outside this crate; this is the generic container the
/// runtime owns outright.
#[derive(Default)]
pub struct CompositeCollab {
    children: BTreeMap<String, ChildSlot>,
}

impl CompositeCollab {
    pub fn new() -> Self {
        CompositeCollab::default()
    }

    /// Registers a fixed (schema-time) child. Duplicate names are a
    /// fatal programmer error.
    pub fn register(&mut self, name: impl Into<String>, node: CollabNode) -> Result<()> {
        let name = name.into();
        if self.children.contains_key(&name) {
            return Err(RuntimeError::UsageError(format!(
                "duplicate child name {:?} registered on the same parent",
                name
            )));
        }
        self.children.insert(name, ChildSlot::Live(node));
        Ok(())
    }

    /// Inserts a dynamically-created child under a deterministically
    /// derived name.
    pub fn insert_dynamic(&mut self, name: String, node: CollabNode) -> Result<()> {
        if matches!(self.children.get(&name), Some(ChildSlot::Live(_))) {
            return Err(RuntimeError::UsageError(format!(
                "dynamic child name {:?} collided with an existing live child",
                name
            )));
        }
        self.children.insert(name, ChildSlot::Live(node));
        Ok(())
    }

    /// Deletes a child, leaving a tombstone in its place. Terminal:
    /// there is no "undelete" at this layer.
    pub fn delete(&mut self, name: &str) {
        self.children.insert(name.to_string(), ChildSlot::Tombstone);
    }

    pub fn get(&self, name: &str) -> Option<&ChildSlot> {
        self.children.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ChildSlot> {
        self.children.get_mut(name)
    }

    /// Deterministic (lexicographic) iteration over live children,
    /// for save-output stability.
    pub fn live_children(&self) -> impl Iterator<Item = (&str, &CollabNode)> {
        self.children.iter().filter_map(|(name, slot)| match slot {
            ChildSlot::Live(node) => Some((name.as_str(), node)),
            ChildSlot::Tombstone => None,
        })
    }

    pub(crate) fn can_gc(&self) -> bool {
        self.children.is_empty()
    }

    /// Names currently tombstoned, for persistence alongside the
    /// generic container's own structural bytes — composites save and
    /// load their own state too, not just their children's.
    pub fn tombstoned_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .children
            .iter()
            .filter(|(_, slot)| matches!(slot, ChildSlot::Tombstone))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Marks `name` tombstoned without requiring a prior live child,
    /// used to rehydrate tombstones from saved state. A name that
    /// already names a live child is left untouched: a
    /// concurrently re-registered live child always wins over a
    /// loaded tombstone for the same name.
    pub fn mark_tombstoned(&mut self, name: &str) {
        if !matches!(self.children.get(name), Some(ChildSlot::Live(_))) {
            self.children.insert(name.to_string(), ChildSlot::Tombstone);
        }
    }
}

impl std::fmt::Debug for CollabNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollabNode::Primitive(p) => f.debug_tuple("Primitive").field(p).finish(),
            CollabNode::Composite(_) => f.debug_struct("Composite").finish_non_exhaustive(),
        }
    }
}

/// Deterministically derives a dynamic child's name from the creating
/// op's identity, so every replica names the same child identically.
pub fn derive_dynamic_name(sender: ReplicaId, sender_counter: u32, local_index: u32) -> String {
    format!("{}-{}-{}", sender, sender_counter, local_index)
}

/// How a `CollabId` resolved against the tree.
pub enum Resolution<'a> {
    /// The path never existed.
    NotFound,
    /// The path existed and was deleted.
    Tombstoned,
    Found(&'a CollabNode),
}

pub enum ResolutionMut<'a> {
    NotFound,
    Tombstoned,
    Found(&'a mut CollabNode),
}

/// The whole tree, rooted at the document root (always a composite).
pub struct CollabTree {
    root: CompositeCollab,
}

impl CollabTree {
    pub fn new() -> Self {
        CollabTree {
            root: CompositeCollab::new(),
        }
    }

    pub fn root(&self) -> &CompositeCollab {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut CompositeCollab {
        &mut self.root
    }

    /// Resolves a path to its parent composite, returning the final
    /// segment name still to look up, or `None` if the path is the
    /// root itself or an intermediate segment isn't a composite.
    fn resolve_parent<'a>(&'a self, id: &CollabId) -> Option<(&'a CompositeCollab, &'a str)> {
        let segments = id.segments();
        if segments.is_empty() {
            return None;
        }
        let mut current = &self.root;
        for segment in &segments[..segments.len() - 1] {
            match current.get(segment) {
                Some(ChildSlot::Live(CollabNode::Composite(c))) => current = c,
                _ => return None,
            }
        }
        Some((current, segments.last().unwrap().as_str()))
    }

    fn resolve_parent_mut<'a>(
        &'a mut self,
        id: &CollabId,
    ) -> Option<(&'a mut CompositeCollab, &'a str)> {
        let segments = id.segments();
        if segments.is_empty() {
            return None;
        }
        let mut current = &mut self.root;
        for segment in &segments[..segments.len() - 1] {
            match current.get_mut(segment) {
                Some(ChildSlot::Live(CollabNode::Composite(c))) => current = c,
                _ => return None,
            }
        }
        Some((current, segments.last().unwrap().as_str()))
    }

    pub fn resolve(&self, id: &CollabId) -> Resolution<'_> {
        if id.is_root() {
            // The root is a Composite but tree methods hand it out via
            // `root()`, not through `Resolution`; callers addressing
            // the root directly for receive/save should use `root()`.
            return Resolution::NotFound;
        }
        match self.resolve_parent(id) {
            None => Resolution::NotFound,
            Some((parent, name)) => match parent.get(name) {
                None => Resolution::NotFound,
                Some(ChildSlot::Tombstone) => Resolution::Tombstoned,
                Some(ChildSlot::Live(node)) => Resolution::Found(node),
            },
        }
    }

    pub fn resolve_mut(&mut self, id: &CollabId) -> ResolutionMut<'_> {
        if id.is_root() {
            return ResolutionMut::NotFound;
        }
        match self.resolve_parent_mut(id) {
            None => ResolutionMut::NotFound,
            Some((parent, name)) => match parent.get_mut(name) {
                None => ResolutionMut::NotFound,
                Some(ChildSlot::Tombstone) => ResolutionMut::Tombstoned,
                Some(ChildSlot::Live(node)) => ResolutionMut::Found(node),
            },
        }
    }

    /// Registers a fixed child at schema-registration time. `parent`
    /// must already exist and be a composite (or be the root).
    pub fn register(&mut self, parent: &CollabId, name: impl Into<String>, node: CollabNode) -> Result<()> {
        let composite = self.composite_mut(parent)?;
        composite.register(name, node)
    }

    pub fn delete(&mut self, parent: &CollabId, name: &str) -> Result<()> {
        let composite = self.composite_mut(parent)?;
        composite.delete(name);
        Ok(())
    }

    fn composite_mut(&mut self, id: &CollabId) -> Result<&mut CompositeCollab> {
        if id.is_root() {
            return Ok(&mut self.root);
        }
        match self.resolve_mut(id) {
            ResolutionMut::Found(CollabNode::Composite(c)) => Ok(c),
            ResolutionMut::Found(CollabNode::Primitive(_)) => Err(RuntimeError::UsageError(
                format!("{} is a primitive Collab, not a composite", id),
            )),
            ResolutionMut::Tombstoned => Err(RuntimeError::FrozenOp(id.clone())),
            ResolutionMut::NotFound => Err(RuntimeError::UsageError(format!(
                "no composite registered at {}",
                id
            ))),
        }
    }

    /// Routes a transaction op to its target leaf and applies it.
    /// `sender`/`sender_counter` are only used to enrich error
    /// context so a surfaced error carries its source.
    pub fn route_receive(
        &mut self,
        path: &CollabId,
        payload: &[u8],
        meta: &ReceiveMeta,
        sender: ReplicaId,
        sender_counter: u32,
    ) -> Result<()> {
        match self.resolve_mut(path) {
            ResolutionMut::Found(CollabNode::Primitive(leaf)) => leaf.receive(payload, meta),
            ResolutionMut::Found(CollabNode::Composite(_)) => Err(RuntimeError::SchemaMismatch {
                sender,
                counter: sender_counter,
                path: path.clone(),
                reason: "op addressed a composite Collab directly".to_string(),
            }),
            ResolutionMut::Tombstoned => {
                if meta.is_local_echo {
                    Err(RuntimeError::FrozenOp(path.clone()))
                } else {
                    tracing::warn!(%path, "dropping op routed to a frozen (deleted) child");
                    Ok(())
                }
            }
            ResolutionMut::NotFound => Err(RuntimeError::SchemaMismatch {
                sender,
                counter: sender_counter,
                path: path.clone(),
                reason: "no Collab registered at this path".to_string(),
            }),
        }
    }

    pub fn can_gc(&self, id: &CollabId) -> bool {
        if id.is_root() {
            return self.root.can_gc();
        }
        match self.resolve(id) {
            Resolution::Found(node) => node.can_gc(),
            _ => false,
        }
    }
}

impl Default for CollabTree {
    fn default() -> Self {
        CollabTree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{LoadMeta, TrackedVectorClock};
    use crate::time::VectorClock;

    #[derive(Debug, Default)]
    struct Counter(i64);

    impl PrimitiveCollab for Counter {
        fn receive(&mut self, payload: &[u8], _meta: &ReceiveMeta) -> Result<()> {
            let delta = i64::from_le_bytes(payload.try_into().unwrap());
            self.0 += delta;
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

    fn meta() -> ReceiveMeta {
        ReceiveMeta {
            sender: ReplicaId::from_str_lossy("a"),
            sender_counter: 1,
            vector_clock: TrackedVectorClock::untracked(VectorClock::new()),
            wall_clock_time: None,
            lamport_timestamp: None,
            is_local_echo: true,
        }
    }

    #[test]
    fn register_then_route_applies_to_leaf() {
        let mut tree = CollabTree::new();
        tree.register(&CollabId::root(), "counter", CollabNode::Primitive(Box::new(Counter::default())))
            .unwrap();

        let path = CollabId::root().child("counter");
        tree.route_receive(&path, &3i64.to_le_bytes(), &meta(), ReplicaId::from_str_lossy("a"), 1)
            .unwrap();

        match tree.resolve(&path) {
            Resolution::Found(CollabNode::Primitive(p)) => assert_eq!(p.save(), Some(3i64.to_le_bytes().to_vec())),
            _ => panic!("expected live primitive"),
        }
    }

    #[test]
    fn duplicate_registration_is_a_usage_error() {
        let mut tree = CollabTree::new();
        tree.register(&CollabId::root(), "x", CollabNode::Primitive(Box::new(Counter::default())))
            .unwrap();
        let err = tree
            .register(&CollabId::root(), "x", CollabNode::Primitive(Box::new(Counter::default())))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UsageError(_)));
    }

    #[test]
    fn routing_to_missing_path_is_schema_mismatch() {
        let mut tree = CollabTree::new();
        let path = CollabId::root().child("ghost");
        let err = tree
            .route_receive(&path, &[], &meta(), ReplicaId::from_str_lossy("a"), 1)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::SchemaMismatch { .. }));
    }

    #[test]
    fn deleted_child_is_frozen_for_local_but_silent_for_remote() {
        let mut tree = CollabTree::new();
        tree.register(&CollabId::root(), "x", CollabNode::Primitive(Box::new(Counter::default())))
            .unwrap();
        tree.delete(&CollabId::root(), "x").unwrap();

        let path = CollabId::root().child("x");
        let local_err = tree
            .route_receive(&path, &0i64.to_le_bytes(), &meta(), ReplicaId::from_str_lossy("a"), 1)
            .unwrap_err();
        assert!(matches!(local_err, RuntimeError::FrozenOp(_)));

        let mut remote_meta = meta();
        remote_meta.is_local_echo = false;
        assert!(tree
            .route_receive(&path, &0i64.to_le_bytes(), &remote_meta, ReplicaId::from_str_lossy("a"), 1)
            .is_ok());
    }

    #[test]
    fn derive_dynamic_name_is_deterministic() {
        let r = ReplicaId::from_str_lossy("a");
        assert_eq!(derive_dynamic_name(r, 1, 0), derive_dynamic_name(r, 1, 0));
        assert_ne!(derive_dynamic_name(r, 1, 0), derive_dynamic_name(r, 1, 1));
    }
}
