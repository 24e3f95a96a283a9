//! Fitted regression tree arena
//!
//! Trees come out of the fitting step as a flat arena of nodes linked by
//! integer child references. Node 0 is always the root. The arena only lives
//! until the tree has been flattened into the fixed-depth array layout.

use serde::{Deserialize, Serialize};

use crate::errors::{IllumCoreError, Result};

/// A regression tree node (internal or leaf)
///
/// For internal nodes:
/// - `feature_idx` indexes into the per-channel feature block
/// - `left` / `right` point to child node indices
/// - `leaf` is `None`
///
/// For leaf nodes `leaf` holds the prediction and both children are `None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Feature index to split on (ignored for leaves)
    pub feature_idx: usize,

    /// Split threshold, samples with `x <= threshold` go left
    pub threshold: f32,

    /// Left child index
    pub left: Option<usize>,

    /// Right child index
    pub right: Option<usize>,

    /// Leaf value (Some for leaf nodes, None for internal nodes)
    pub leaf: Option<f32>,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(feature_idx: usize, threshold: f32, left: usize, right: usize) -> Self {
        Self {
            feature_idx,
            threshold,
            left: Some(left),
            right: Some(right),
            leaf: None,
        }
    }

    /// Create a new leaf node
    pub fn leaf(value: f32) -> Self {
        Self {
            feature_idx: 0,
            threshold: 0.0,
            left: None,
            right: None,
            leaf: Some(value),
        }
    }

    /// Check if this node is a leaf
    pub fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }
}

/// A fitted binary regression tree stored as a node arena
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FittedTree {
    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,
}

impl FittedTree {
    /// Create a tree from an arena of nodes
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// A tree made of a single leaf
    pub fn constant(value: f32) -> Self {
        Self {
            nodes: vec![Node::leaf(value)],
        }
    }

    /// Get the root node
    pub fn root(&self) -> Option<&Node> {
        self.nodes.first()
    }

    /// Number of nodes in the arena
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the arena has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of leaves reachable from the root
    pub fn leaf_count(&self) -> usize {
        self.walk().filter(|&(id, _)| self.nodes[id].is_leaf()).count()
    }

    /// Depth of the deepest reachable node; a lone root leaf has depth 0.
    ///
    /// Only meaningful for trees that pass [`FittedTree::validate`].
    pub fn depth(&self) -> usize {
        self.walk().map(|(_, depth)| depth).max().unwrap_or(0)
    }

    /// Depth-first walk yielding `(node_id, depth)` for every reachable node.
    /// Out-of-range children are skipped and the walk stops descending past
    /// `len()` levels, so broken arenas cannot loop forever.
    fn walk(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let limit = self.nodes.len();
        let mut stack = if self.nodes.is_empty() {
            Vec::new()
        } else {
            vec![(0usize, 0usize)]
        };

        std::iter::from_fn(move || {
            let (id, depth) = stack.pop()?;
            let node = &self.nodes[id];
            if depth < limit {
                for child in [node.right, node.left].into_iter().flatten() {
                    if child < limit {
                        stack.push((child, depth + 1));
                    }
                }
            }
            Some((id, depth))
        })
    }

    /// Validate tree structure
    ///
    /// Every child reference must be in bounds, leaves must not have
    /// children and no node may be reachable twice. Internal nodes missing a
    /// child are accepted here and rejected later by the flattener, which
    /// notices the uncovered leaf slots or an internal node at the leaf level.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(IllumCoreError::InvalidTree("tree has no nodes".to_string()));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                if node.left.is_some() || node.right.is_some() {
                    return Err(IllumCoreError::InvalidTree(format!(
                        "leaf node {i} has children"
                    )));
                }
                continue;
            }

            for child in [node.left, node.right].into_iter().flatten() {
                if child >= self.nodes.len() {
                    return Err(IllumCoreError::InvalidTree(format!(
                        "node {i} has out-of-range child {child}"
                    )));
                }
            }
        }

        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![0usize];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id], true) {
                return Err(IllumCoreError::InvalidTree(format!(
                    "node {id} is reachable more than once"
                )));
            }
            let node = &self.nodes[id];
            stack.extend([node.left, node.right].into_iter().flatten());
        }

        Ok(())
    }

    /// Evaluate this tree on a feature block by following child links.
    ///
    /// Returns `None` when the walk hits a missing child or a feature index
    /// outside `features`.
    pub fn evaluate(&self, features: &[f32]) -> Option<f32> {
        let mut idx = 0usize;

        for _ in 0..=self.nodes.len() {
            let node = self.nodes.get(idx)?;
            if let Some(value) = node.leaf {
                return Some(value);
            }

            let x = *features.get(node.feature_idx)?;
            idx = if x <= node.threshold { node.left? } else { node.right? };
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> FittedTree {
        // root splits on feature 1; left child is a leaf, right child splits again
        FittedTree::new(vec![
            Node::internal(1, 0.4, 1, 2),
            Node::leaf(0.25),
            Node::internal(0, 0.6, 3, 4),
            Node::leaf(0.5),
            Node::leaf(0.75),
        ])
    }

    #[test]
    fn test_node_creation() {
        let internal = Node::internal(3, 0.125, 1, 2);
        assert_eq!(internal.feature_idx, 3);
        assert_eq!(internal.left, Some(1));
        assert_eq!(internal.right, Some(2));
        assert!(!internal.is_leaf());

        let leaf = Node::leaf(-0.5);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.leaf, Some(-0.5));
    }

    #[test]
    fn test_depth_and_leaves() {
        let tree = sample_tree();
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(FittedTree::constant(1.0).depth(), 0);
    }

    #[test]
    fn test_tree_evaluation() {
        let tree = sample_tree();
        assert_eq!(tree.evaluate(&[0.9, 0.3]), Some(0.25));
        assert_eq!(tree.evaluate(&[0.6, 0.4]), Some(0.25)); // equal goes left
        assert_eq!(tree.evaluate(&[0.6, 0.5]), Some(0.5));
        assert_eq!(tree.evaluate(&[0.7, 0.5]), Some(0.75));
        assert_eq!(tree.evaluate(&[0.7]), None);
    }

    #[test]
    fn test_tree_validation() {
        assert!(sample_tree().validate().is_ok());
        assert!(FittedTree::default().validate().is_err());

        let out_of_range = FittedTree::new(vec![
            Node::internal(0, 0.5, 1, 7),
            Node::leaf(0.1),
        ]);
        assert!(out_of_range.validate().is_err());

        let shared = FittedTree::new(vec![
            Node::internal(0, 0.5, 1, 1),
            Node::leaf(0.1),
        ]);
        assert!(shared.validate().is_err());

        let cyclic = FittedTree::new(vec![
            Node::internal(0, 0.5, 1, 2),
            Node::internal(0, 0.5, 0, 2),
            Node::leaf(0.1),
        ]);
        assert!(cyclic.validate().is_err());
    }

    #[test]
    fn test_missing_child_passes_validation() {
        let mut tree = sample_tree();
        tree.nodes[2].right = None;
        assert!(tree.validate().is_ok());
        assert_eq!(tree.evaluate(&[0.7, 0.5]), None);
    }
}
