//! CollabID: a replica-stable address for a Collab.

use std::fmt;

/// The root-to-node path of edge labels identifying a Collab.
///
/// Serializable and stable across replicas that share the same
/// schema. The empty path addresses the document root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct CollabId(pub Vec<String>);

impl CollabId {
    pub fn root() -> Self {
        CollabId(Vec::new())
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut path = self.0.clone();
        path.push(name.into());
        CollabId(path)
    }

    pub fn parent(&self) -> Option<CollabId> {
        if self.0.is_empty() {
            None
        } else {
            Some(CollabId(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.0.last().map(|s| s.as_str())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CollabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl From<Vec<String>> for CollabId {
    fn from(path: Vec<String>) -> Self {
        CollabId(path)
    }
}
