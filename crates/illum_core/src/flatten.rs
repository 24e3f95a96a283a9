//! Fixed-depth flat layout for fitted trees.
//!
//! A fitted tree of any shape is re-expressed as a complete binary tree of
//! depth `D` stored in three arrays:
//!
//! ```text
//! feature_idx / thresh_vals (2^D - 1 entries, heap order):
//! Level 0:           [0]
//! Level 1:        [1]   [2]
//! Level 2:      [3][4] [5][6]
//!
//! leaf_vals (2^D entries): the virtual children of the last internal level,
//! left to right.
//! ```
//!
//! Node `i` has children `2i + 1` and `2i + 2`. A leaf that the fitter placed
//! above depth `D` is replicated over every leaf slot its subtree would have
//! covered, so evaluation always descends exactly `D` levels.

use std::ops::Range;

use crate::errors::{IllumCoreError, Result};
use crate::tree::FittedTree;

/// Deepest layout the encoder accepts (`2^16` leaf slots per tree).
pub const MAX_ENCODABLE_DEPTH: usize = 16;

/// Feature index written to internal slots no fitted node reaches.
pub const DEFAULT_FEATURE_INDEX: u8 = 0;

/// Threshold written to internal slots no fitted node reaches.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Number of internal slots in a complete tree of the given depth.
#[inline]
pub const fn internal_slots(depth: usize) -> usize {
    (1 << depth) - 1
}

/// Number of leaf slots in a complete tree of the given depth.
#[inline]
pub const fn leaf_slots(depth: usize) -> usize {
    1 << depth
}

/// Reject depths the fixed layout cannot represent.
pub fn check_depth(depth: usize) -> Result<()> {
    if depth == 0 || depth > MAX_ENCODABLE_DEPTH {
        return Err(IllumCoreError::DepthOutOfRange {
            depth,
            max: MAX_ENCODABLE_DEPTH,
        });
    }
    Ok(())
}

/// Leaf slots covered by the heap node `heap_index` sitting at `depth` once
/// its subtree is expanded down to `max_depth`.
///
/// Requires `depth <= max_depth` and `heap_index` to lie on level `depth`.
pub fn leaf_span(heap_index: usize, depth: usize, max_depth: usize) -> Range<usize> {
    let width = 1usize << (max_depth - depth);
    let start = width * heap_index + (width - 1) - internal_slots(max_depth);
    start..start + width
}

/// One tree in the fixed-depth array layout
#[derive(Debug, Clone, PartialEq)]
pub struct FlatTree {
    depth: usize,
    feature_idx: Vec<u8>,
    thresh_vals: Vec<f32>,
    leaf_vals: Vec<f32>,
}

impl FlatTree {
    /// Layout depth `D`
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Split feature per internal slot (`2^D - 1` entries)
    pub fn feature_idx(&self) -> &[u8] {
        &self.feature_idx
    }

    /// Split threshold per internal slot (`2^D - 1` entries)
    pub fn thresh_vals(&self) -> &[f32] {
        &self.thresh_vals
    }

    /// Leaf values (`2^D` entries)
    pub fn leaf_vals(&self) -> &[f32] {
        &self.leaf_vals
    }

    /// Evaluate the flat tree on one feature block
    pub fn evaluate(&self, features: &[f32]) -> Option<f32> {
        evaluate_flat(
            self.depth,
            &self.feature_idx,
            &self.thresh_vals,
            &self.leaf_vals,
            features,
        )
    }
}

/// Evaluate a tree stored in the flat layout using index arithmetic only.
///
/// Descends exactly `depth` levels, going left when
/// `features[feature_idx[i]] <= thresh_vals[i]`. Returns `None` if a split
/// references a feature outside `features` or the slices are too short.
pub fn evaluate_flat(
    depth: usize,
    feature_idx: &[u8],
    thresh_vals: &[f32],
    leaf_vals: &[f32],
    features: &[f32],
) -> Option<f32> {
    let mut idx = 0usize;
    for _ in 0..depth {
        let x = *features.get(usize::from(*feature_idx.get(idx)?))?;
        idx = if x <= *thresh_vals.get(idx)? {
            2 * idx + 1
        } else {
            2 * idx + 2
        };
    }
    leaf_vals.get(idx - internal_slots(depth)).copied()
}

/// Flatten a fitted tree into the fixed-depth array layout.
///
/// Fails if the tree is structurally invalid, deeper than `max_depth`, splits
/// on a feature that does not fit in `u8`, or leaves any leaf slot uncovered.
pub fn flatten(tree: &FittedTree, max_depth: usize) -> Result<FlatTree> {
    check_depth(max_depth)?;
    tree.validate()?;

    let depth = tree.depth();
    if depth > max_depth {
        return Err(IllumCoreError::TreeTooDeep { depth, max_depth });
    }

    let mut flattener = Flattener {
        tree,
        max_depth,
        feature_idx: vec![DEFAULT_FEATURE_INDEX; internal_slots(max_depth)],
        thresh_vals: vec![DEFAULT_THRESHOLD; internal_slots(max_depth)],
        leaf_vals: vec![None; leaf_slots(max_depth)],
    };
    flattener.visit(0, 0, 0)?;
    flattener.finish()
}

struct Flattener<'a> {
    tree: &'a FittedTree,
    max_depth: usize,
    feature_idx: Vec<u8>,
    thresh_vals: Vec<f32>,
    leaf_vals: Vec<Option<f32>>,
}

impl Flattener<'_> {
    fn visit(&mut self, node_id: usize, heap_index: usize, depth: usize) -> Result<()> {
        let node = &self.tree.nodes[node_id];

        if let Some(value) = node.leaf {
            for slot in &mut self.leaf_vals[leaf_span(heap_index, depth, self.max_depth)] {
                *slot = Some(value);
            }
            return Ok(());
        }

        // internal nodes have no slot on the leaf level
        if depth >= self.max_depth {
            return Err(IllumCoreError::TreeTooDeep {
                depth: depth + 1,
                max_depth: self.max_depth,
            });
        }

        self.feature_idx[heap_index] =
            u8::try_from(node.feature_idx).map_err(|_| IllumCoreError::FeatureIndexOverflow {
                node: node_id,
                feature_index: node.feature_idx,
            })?;
        self.thresh_vals[heap_index] = node.threshold;

        if let Some(left) = node.left {
            self.visit(left, 2 * heap_index + 1, depth + 1)?;
        }
        if let Some(right) = node.right {
            self.visit(right, 2 * heap_index + 2, depth + 1)?;
        }
        Ok(())
    }

    fn finish(self) -> Result<FlatTree> {
        let leaf_vals = self
            .leaf_vals
            .into_iter()
            .enumerate()
            .map(|(slot, value)| value.ok_or(IllumCoreError::UnwrittenLeafSlot { slot }))
            .collect::<Result<Vec<f32>>>()?;

        Ok(FlatTree {
            depth: self.max_depth,
            feature_idx: self.feature_idx,
            thresh_vals: self.thresh_vals,
            leaf_vals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    /// Complete tree of exactly `depth` levels; leaves are numbered left to right.
    fn balanced_tree(depth: usize) -> FittedTree {
        let mut nodes = Vec::new();
        build_balanced(&mut nodes, 0, depth, &mut 0);
        FittedTree::new(nodes)
    }

    fn build_balanced(nodes: &mut Vec<Node>, level: usize, depth: usize, next_leaf: &mut u32) -> usize {
        let id = nodes.len();
        if level == depth {
            nodes.push(Node::leaf(*next_leaf as f32 + 1.0));
            *next_leaf += 1;
            return id;
        }
        nodes.push(Node::internal(level % 2, 0.1 * (level + 1) as f32, 0, 0));
        let left = build_balanced(nodes, level + 1, depth, next_leaf);
        let right = build_balanced(nodes, level + 1, depth, next_leaf);
        nodes[id].left = Some(left);
        nodes[id].right = Some(right);
        id
    }

    #[test]
    fn test_slot_counts() {
        assert_eq!(internal_slots(1), 1);
        assert_eq!(leaf_slots(1), 2);
        assert_eq!(internal_slots(4), 15);
        assert_eq!(leaf_slots(4), 16);
    }

    #[test]
    fn test_leaf_span() {
        assert_eq!(leaf_span(0, 0, 3), 0..8);
        assert_eq!(leaf_span(1, 1, 3), 0..4);
        assert_eq!(leaf_span(2, 1, 3), 4..8);
        assert_eq!(leaf_span(5, 2, 3), 4..6);
        assert_eq!(leaf_span(14, 3, 3), 7..8);
    }

    #[test]
    fn test_balanced_trees_fill_every_slot() {
        for depth in 1..=6 {
            let flat = flatten(&balanced_tree(depth), depth).unwrap();
            assert_eq!(flat.feature_idx().len(), internal_slots(depth));
            assert_eq!(flat.thresh_vals().len(), internal_slots(depth));
            assert_eq!(flat.leaf_vals().len(), leaf_slots(depth));

            let expected: Vec<f32> = (1..=leaf_slots(depth)).map(|v| v as f32).collect();
            assert_eq!(flat.leaf_vals(), expected.as_slice());
        }
    }

    #[test]
    fn test_pruned_leaf_fills_its_span_only() {
        // depth-1 leaf on the left, depth-3 subtree on the right
        let mut nodes = vec![Node::internal(0, 0.5, 1, 2), Node::leaf(0.3)];
        let right = balanced_tree(2);
        let offset = nodes.len();
        for mut node in right.nodes {
            node.left = node.left.map(|c| c + offset);
            node.right = node.right.map(|c| c + offset);
            nodes.push(node);
        }
        let tree = FittedTree::new(nodes);

        let flat = flatten(&tree, 3).unwrap();
        assert_eq!(&flat.leaf_vals()[0..4], &[0.3; 4]);
        assert_eq!(&flat.leaf_vals()[4..8], &[1.0, 2.0, 3.0, 4.0]);

        // internal slots below the pruned leaf keep their defaults
        assert_eq!(flat.feature_idx()[1], DEFAULT_FEATURE_INDEX);
        assert_eq!(flat.thresh_vals()[3], DEFAULT_THRESHOLD);
        assert_eq!(flat.thresh_vals()[4], DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_root_leaf_expands_to_all_slots() {
        let flat = flatten(&FittedTree::constant(0.42), 4).unwrap();
        assert!(flat.leaf_vals().iter().all(|&v| v == 0.42));
        assert!(flat.thresh_vals().iter().all(|&v| v == DEFAULT_THRESHOLD));
        assert_eq!(flat.evaluate(&[0.9]), Some(0.42));
    }

    #[test]
    fn test_negative_one_leaf_is_not_a_hole() {
        let tree = FittedTree::new(vec![
            Node::internal(0, 0.5, 1, 2),
            Node::leaf(-1.0),
            Node::leaf(2.0),
        ]);
        let flat = flatten(&tree, 2).unwrap();
        assert_eq!(flat.leaf_vals(), &[-1.0, -1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_too_deep_tree_is_rejected() {
        let err = flatten(&balanced_tree(3), 2).unwrap_err();
        assert!(matches!(
            err,
            IllumCoreError::TreeTooDeep { depth: 3, max_depth: 2 }
        ));
    }

    #[test]
    fn test_missing_child_leaves_unwritten_slot() {
        let mut tree = balanced_tree(2);
        tree.nodes[0].right = None;
        let err = flatten(&tree, 2).unwrap_err();
        assert!(matches!(err, IllumCoreError::UnwrittenLeafSlot { slot: 2 }));
    }

    #[test]
    fn test_internal_node_at_leaf_level_is_too_deep() {
        let childless = Node {
            feature_idx: 0,
            threshold: 0.5,
            left: None,
            right: None,
            leaf: None,
        };
        let one_child = Node {
            right: None,
            ..Node::internal(0, 0.5, 3, 0)
        };

        let tree = FittedTree::new(vec![
            Node::internal(0, 0.5, 1, 2),
            Node::leaf(0.1),
            childless,
        ]);
        assert!(tree.validate().is_ok());
        assert!(matches!(
            flatten(&tree, 1),
            Err(IllumCoreError::TreeTooDeep { depth: 2, max_depth: 1 })
        ));

        let tree = FittedTree::new(vec![
            Node::internal(0, 0.5, 1, 2),
            Node::leaf(0.1),
            one_child,
            Node::leaf(0.2),
        ]);
        assert!(matches!(
            flatten(&tree, 1),
            Err(IllumCoreError::TreeTooDeep { depth: 2, max_depth: 1 })
        ));
    }

    #[test]
    fn test_wide_feature_index_is_rejected() {
        let tree = FittedTree::new(vec![
            Node::internal(300, 0.5, 1, 2),
            Node::leaf(0.0),
            Node::leaf(1.0),
        ]);
        assert!(matches!(
            flatten(&tree, 1),
            Err(IllumCoreError::FeatureIndexOverflow { node: 0, feature_index: 300 })
        ));
    }

    #[test]
    fn test_depth_bounds() {
        let tree = FittedTree::constant(0.1);
        assert!(matches!(flatten(&tree, 0), Err(IllumCoreError::DepthOutOfRange { .. })));
        assert!(matches!(
            flatten(&tree, MAX_ENCODABLE_DEPTH + 1),
            Err(IllumCoreError::DepthOutOfRange { .. })
        ));
        assert!(flatten(&tree, MAX_ENCODABLE_DEPTH).is_ok());
    }

    #[test]
    fn test_flat_evaluation_matches_tree() {
        let tree = balanced_tree(3);
        let flat = flatten(&tree, 3).unwrap();
        for x0 in [0.0, 0.15, 0.25, 0.35, 0.9] {
            for x1 in [0.0, 0.15, 0.25, 0.35, 0.9] {
                let block = [x0, x1];
                assert_eq!(flat.evaluate(&block), tree.evaluate(&block));
            }
        }
    }
}
