//! Choice paths addressing pages inside the story tree.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Ordered sequence of zero-based choice indices leading from the root page to a node.
///
/// The empty path is the root. Paths are never mutated in place; [`ChoicePath::child`]
/// derives a new path one level deeper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChoicePath(Vec<usize>);

impl ChoicePath {
    /// The root page path, `[]`.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns the path reached by taking `choice` from this node.
    pub fn child(&self, choice: usize) -> Self {
        let mut indices = Vec::with_capacity(self.0.len() + 1);
        indices.extend_from_slice(&self.0);
        indices.push(choice);
        Self(indices)
    }

    /// Number of choices between the root and this node.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// True for the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Choice indices in replay order.
    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for ChoicePath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl<const N: usize> From<[usize; N]> for ChoicePath {
    fn from(indices: [usize; N]) -> Self {
        Self(indices.to_vec())
    }
}

/// Breadth-first order: shorter paths first, equal lengths compared lexicographically.
impl Ord for ChoicePath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ChoicePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ChoicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (pos, index) in self.0.iter().enumerate() {
            if pos > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{index}")?;
        }
        if self.0.len() == 1 {
            f.write_str(",")?;
        }
        f.write_str(")")
    }
}
