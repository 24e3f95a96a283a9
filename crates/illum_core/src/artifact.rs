//! Flat-array model artifact
//!
//! The artifact is the only thing that crosses from training to the runtime
//! evaluator. It holds every flattened tree of the ensemble concatenated in
//! a fixed order:
//!
//! ```text
//! for window in 0..num_trees
//!     for channel in 0..num_features
//!         for axis in [r, g]
//!             feature_idx ++= tree.feature_idx
//!             thresh_vals ++= tree.thresh_vals
//!             leaf_vals   ++= tree.leaf_vals
//! ```
//!
//! Structured artifacts (YAML / canonical JSON) can be loaded back and are
//! checked against an embedded Blake3 hash of their numeric content. Source
//! artifacts (C++ header / Rust module) are write-only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::errors::{IllumCoreError, Result};
use crate::flatten::{
    check_depth, evaluate_flat, internal_slots, leaf_slots, FlatTree, MAX_ENCODABLE_DEPTH,
};
use crate::serde_canon::{hash_canonical_hex, to_canonical_json};
use crate::source::{render_cpp, render_rust, SourceStyle};

/// Artifact layout version
pub const FORMAT_VERSION: u32 = 1;

/// Feature channels per window; fixed by the feature extractor
pub const NUM_FEATURE_CHANNELS: usize = 4;

/// Chromaticity axis a tree predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetAxis {
    R,
    G,
}

impl TargetAxis {
    /// Axes in encoding order
    pub const ALL: [TargetAxis; 2] = [TargetAxis::R, TargetAxis::G];

    /// Position of the axis within a channel's tree pair
    pub fn index(self) -> usize {
        match self {
            TargetAxis::R => 0,
            TargetAxis::G => 1,
        }
    }
}

impl fmt::Display for TargetAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAxis::R => f.write_str("r"),
            TargetAxis::G => f.write_str("g"),
        }
    }
}

/// Trees stored per window
pub const TREES_PER_WINDOW: usize = NUM_FEATURE_CHANNELS * TargetAxis::ALL.len();

/// Serialization target of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// YAML key/value container (`.yml`, `.yaml`)
    Yaml,
    /// Canonical JSON key/value container (`.json`)
    Json,
    /// C++ array literals (`.hpp`, `.h`)
    CppHeader,
    /// Rust `const` arrays (`.rs`)
    RustModule,
}

impl OutputFormat {
    /// Pick the format from the output file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "yml" | "yaml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "hpp" | "h" => Ok(Self::CppHeader),
            "rs" => Ok(Self::RustModule),
            _ => Err(IllumCoreError::UnsupportedFormat(format!(
                "{} (expected .yml, .yaml, .json, .hpp, .h or .rs)",
                path.display()
            ))),
        }
    }

    /// Whether a companion reader can load this format back
    pub fn is_structured(self) -> bool {
        matches!(self, Self::Yaml | Self::Json)
    }
}

/// Flat model consumed by the runtime evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Layout version (always 1 for now)
    pub format_version: u32,

    /// Number of windows in the ensemble
    pub num_trees: u32,

    /// Leaf slots per tree, `2^depth`
    pub num_tree_nodes: u32,

    /// Feature channels per window
    pub num_features: u32,

    /// Split feature per internal slot, all trees concatenated
    pub feature_idx: Vec<u8>,

    /// Split threshold per internal slot, all trees concatenated
    pub thresh_vals: Vec<f32>,

    /// Leaf values, all trees concatenated
    pub leaf_vals: Vec<f32>,

    /// Blake3 hash (hex) of the canonical numeric content
    pub model_hash: String,
}

/// Fields covered by the model hash
#[derive(Serialize)]
struct HashedContent<'a> {
    format_version: u32,
    num_trees: u32,
    num_tree_nodes: u32,
    num_features: u32,
    feature_idx: &'a [u8],
    thresh_vals: &'a [f32],
    leaf_vals: &'a [f32],
}

impl ModelArtifact {
    /// Depth of every tree in the artifact
    pub fn tree_depth(&self) -> usize {
        self.num_tree_nodes.trailing_zeros() as usize
    }

    /// Total number of flattened trees
    pub fn tree_count(&self) -> usize {
        self.num_trees as usize * self.num_features as usize * TargetAxis::ALL.len()
    }

    /// Compute the Blake3 hash of the numeric content
    pub fn compute_hash(&self) -> Result<String> {
        hash_canonical_hex(&HashedContent {
            format_version: self.format_version,
            num_trees: self.num_trees,
            num_tree_nodes: self.num_tree_nodes,
            num_features: self.num_features,
            feature_idx: &self.feature_idx,
            thresh_vals: &self.thresh_vals,
            leaf_vals: &self.leaf_vals,
        })
    }

    /// Validate layout, array lengths and the embedded hash
    pub fn validate(&self) -> Result<()> {
        self.validate_layout()?;

        let expected = self.compute_hash()?;
        if expected != self.model_hash {
            return Err(IllumCoreError::InvalidArtifact(format!(
                "model hash mismatch: stored {}, computed {}",
                self.model_hash, expected
            )));
        }
        Ok(())
    }

    fn validate_layout(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(IllumCoreError::InvalidArtifact(format!(
                "unsupported format version: {}",
                self.format_version
            )));
        }

        if self.num_features as usize != NUM_FEATURE_CHANNELS {
            return Err(IllumCoreError::InvalidArtifact(format!(
                "expected {} feature channels, got {}",
                NUM_FEATURE_CHANNELS, self.num_features
            )));
        }

        if !self.num_tree_nodes.is_power_of_two() {
            return Err(IllumCoreError::InvalidArtifact(format!(
                "num_tree_nodes must be a power of two, got {}",
                self.num_tree_nodes
            )));
        }
        check_depth(self.tree_depth()).map_err(|_| {
            IllumCoreError::InvalidArtifact(format!(
                "tree depth {} outside 1..={}",
                self.tree_depth(),
                MAX_ENCODABLE_DEPTH
            ))
        })?;

        if self.num_trees == 0 {
            return Err(IllumCoreError::InvalidArtifact(
                "artifact holds no trees".to_string(),
            ));
        }

        let internal_len = self.tree_count() * internal_slots(self.tree_depth());
        let leaf_len = self.tree_count() * leaf_slots(self.tree_depth());
        for (name, actual, expected) in [
            ("feature_idx", self.feature_idx.len(), internal_len),
            ("thresh_vals", self.thresh_vals.len(), internal_len),
            ("leaf_vals", self.leaf_vals.len(), leaf_len),
        ] {
            if actual != expected {
                return Err(IllumCoreError::InvalidArtifact(format!(
                    "{name} has {actual} entries, expected {expected}"
                )));
            }
        }

        if let Some(pos) = self
            .thresh_vals
            .iter()
            .chain(&self.leaf_vals)
            .position(|v| !v.is_finite())
        {
            return Err(IllumCoreError::InvalidArtifact(format!(
                "non-finite value at position {pos} of thresh_vals ++ leaf_vals"
            )));
        }

        Ok(())
    }

    /// Evaluate one tree on a feature block
    pub fn evaluate_tree(
        &self,
        window: usize,
        channel: usize,
        axis: TargetAxis,
        block: &[f32],
    ) -> Option<f32> {
        if window >= self.num_trees as usize || channel >= self.num_features as usize {
            return None;
        }

        let depth = self.tree_depth();
        let position = (window * self.num_features as usize + channel) * TargetAxis::ALL.len()
            + axis.index();
        let internal = internal_slots(depth);
        let leaves = leaf_slots(depth);

        evaluate_flat(
            depth,
            self.feature_idx.get(position * internal..(position + 1) * internal)?,
            self.thresh_vals.get(position * internal..(position + 1) * internal)?,
            self.leaf_vals.get(position * leaves..(position + 1) * leaves)?,
            block,
        )
    }

    /// Predict `(r, g)` chromaticity for one image's feature blocks.
    ///
    /// Averages the per-channel predictions of every window.
    pub fn predict<B: AsRef<[f32]>>(&self, features: &[B]) -> Option<(f32, f32)> {
        if features.len() != self.num_features as usize {
            return None;
        }

        let mut sum = [0.0f32; 2];
        for window in 0..self.num_trees as usize {
            for (channel, block) in features.iter().enumerate() {
                for axis in TargetAxis::ALL {
                    sum[axis.index()] += self.evaluate_tree(window, channel, axis, block.as_ref())?;
                }
            }
        }

        let count = (self.num_trees as usize * features.len()) as f32;
        Some((sum[0] / count, sum[1] / count))
    }

    /// Render the artifact in the given format.
    ///
    /// `params` is only used by the source formats, which record it in their
    /// header comment.
    pub fn render(&self, format: OutputFormat, params: &BTreeMap<String, String>) -> Result<String> {
        let style = SourceStyle::default();
        Ok(match format {
            OutputFormat::Yaml => serde_yaml::to_string(self)?,
            OutputFormat::Json => to_canonical_json(self)?,
            OutputFormat::CppHeader => render_cpp(self, params, &style),
            OutputFormat::RustModule => render_rust(self, params, &style),
        })
    }

    /// Write the artifact to `path`, choosing the format from its extension
    pub fn save<P: AsRef<Path>>(
        &self,
        path: P,
        params: &BTreeMap<String, String>,
    ) -> Result<OutputFormat> {
        let path = path.as_ref();
        let format = OutputFormat::from_path(path)?;
        let text = self.render(format, params)?;
        fs::write(path, text)?;
        debug!(path = %path.display(), ?format, "model artifact written");
        Ok(format)
    }

    /// Load and validate a structured artifact
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = OutputFormat::from_path(path)?;
        let text = fs::read_to_string(path)?;
        Self::parse(format, &text)
    }

    /// Parse and validate a structured artifact from text
    pub fn parse(format: OutputFormat, text: &str) -> Result<Self> {
        let artifact: ModelArtifact = match format {
            OutputFormat::Yaml => serde_yaml::from_str(text)?,
            OutputFormat::Json => serde_json::from_str(text)?,
            OutputFormat::CppHeader | OutputFormat::RustModule => {
                return Err(IllumCoreError::UnsupportedFormat(format!(
                    "{format:?} artifacts cannot be loaded back"
                )))
            }
        };
        artifact.validate()?;
        Ok(artifact)
    }
}

/// Accumulates flattened trees in encoding order
#[derive(Debug)]
pub struct ArtifactBuilder {
    depth: usize,
    feature_idx: Vec<u8>,
    thresh_vals: Vec<f32>,
    leaf_vals: Vec<f32>,
    trees: usize,
}

impl ArtifactBuilder {
    /// Start an artifact whose trees all have the given depth
    pub fn new(depth: usize) -> Result<Self> {
        check_depth(depth)?;
        Ok(Self {
            depth,
            feature_idx: Vec::new(),
            thresh_vals: Vec::new(),
            leaf_vals: Vec::new(),
            trees: 0,
        })
    }

    /// Append the next tree in encoding order
    pub fn push(&mut self, tree: &FlatTree) -> Result<()> {
        if tree.depth() != self.depth {
            return Err(IllumCoreError::InvalidArtifact(format!(
                "tree {} has depth {}, artifact depth is {}",
                self.trees,
                tree.depth(),
                self.depth
            )));
        }
        self.feature_idx.extend_from_slice(tree.feature_idx());
        self.thresh_vals.extend_from_slice(tree.thresh_vals());
        self.leaf_vals.extend_from_slice(tree.leaf_vals());
        self.trees += 1;
        Ok(())
    }

    /// Number of trees pushed so far
    pub fn len(&self) -> usize {
        self.trees
    }

    /// Check if no trees were pushed
    pub fn is_empty(&self) -> bool {
        self.trees == 0
    }

    /// Seal the artifact; the tree count must fill whole windows
    pub fn finish(self) -> Result<ModelArtifact> {
        if self.trees % TREES_PER_WINDOW != 0 {
            return Err(IllumCoreError::InvalidArtifact(format!(
                "{} trees do not fill whole windows of {}",
                self.trees, TREES_PER_WINDOW
            )));
        }
        let num_trees = u32::try_from(self.trees / TREES_PER_WINDOW).map_err(|_| {
            IllumCoreError::InvalidArtifact(format!("too many trees: {}", self.trees))
        })?;

        let mut artifact = ModelArtifact {
            format_version: FORMAT_VERSION,
            num_trees,
            num_tree_nodes: 1u32 << self.depth,
            num_features: NUM_FEATURE_CHANNELS as u32,
            feature_idx: self.feature_idx,
            thresh_vals: self.thresh_vals,
            leaf_vals: self.leaf_vals,
            model_hash: String::new(),
        };
        artifact.validate_layout()?;
        artifact.model_hash = artifact.compute_hash()?;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::flatten;
    use crate::tree::{FittedTree, Node};

    fn stump(feature: usize, threshold: f32, left: f32, right: f32) -> FittedTree {
        FittedTree::new(vec![
            Node::internal(feature, threshold, 1, 2),
            Node::leaf(left),
            Node::leaf(right),
        ])
    }

    /// One window; tree k predicts `k / 10` on the left and `k / 10 + 0.05` on the right
    fn one_window_artifact() -> ModelArtifact {
        let mut builder = ArtifactBuilder::new(1).unwrap();
        for k in 0..TREES_PER_WINDOW {
            let base = k as f32 / 10.0;
            let flat = flatten(&stump(k % 2, 0.5, base, base + 0.05), 1).unwrap();
            builder.push(&flat).unwrap();
        }
        builder.finish().unwrap()
    }

    #[test]
    fn test_output_format_from_path() {
        assert_eq!(OutputFormat::from_path(Path::new("m.yml")).unwrap(), OutputFormat::Yaml);
        assert_eq!(OutputFormat::from_path(Path::new("m.YAML")).unwrap(), OutputFormat::Yaml);
        assert_eq!(OutputFormat::from_path(Path::new("m.json")).unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_path(Path::new("m.hpp")).unwrap(), OutputFormat::CppHeader);
        assert_eq!(OutputFormat::from_path(Path::new("m.rs")).unwrap(), OutputFormat::RustModule);
        assert!(matches!(
            OutputFormat::from_path(Path::new("m.bin")),
            Err(IllumCoreError::UnsupportedFormat(_))
        ));
        assert!(OutputFormat::from_path(Path::new("model")).is_err());
        assert!(OutputFormat::Json.is_structured());
        assert!(!OutputFormat::CppHeader.is_structured());
    }

    #[test]
    fn test_builder_lengths_and_metadata() {
        let artifact = one_window_artifact();
        assert_eq!(artifact.num_trees, 1);
        assert_eq!(artifact.num_tree_nodes, 2);
        assert_eq!(artifact.num_features, 4);
        assert_eq!(artifact.tree_depth(), 1);
        assert_eq!(artifact.feature_idx.len(), 8);
        assert_eq!(artifact.thresh_vals.len(), 8);
        assert_eq!(artifact.leaf_vals.len(), 16);
        assert!(artifact.validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_partial_window() {
        let mut builder = ArtifactBuilder::new(1).unwrap();
        let flat = flatten(&FittedTree::constant(0.3), 1).unwrap();
        builder.push(&flat).unwrap();
        assert!(matches!(builder.finish(), Err(IllumCoreError::InvalidArtifact(_))));
    }

    #[test]
    fn test_builder_rejects_mixed_depths() {
        let mut builder = ArtifactBuilder::new(2).unwrap();
        let flat = flatten(&FittedTree::constant(0.3), 1).unwrap();
        assert!(builder.push(&flat).is_err());
        assert!(builder.is_empty());
    }

    #[test]
    fn test_evaluate_tree_addresses_encoding_order() {
        let artifact = one_window_artifact();
        // channel 1, axis g is tree k = 3: splits on feature 1
        assert_eq!(artifact.evaluate_tree(0, 1, TargetAxis::G, &[0.0, 0.2]), Some(0.3));
        assert_eq!(artifact.evaluate_tree(0, 1, TargetAxis::G, &[0.0, 0.7]), Some(3.0 / 10.0 + 0.05));
        // channel 2, axis r is tree k = 4: splits on feature 0
        assert_eq!(artifact.evaluate_tree(0, 2, TargetAxis::R, &[0.9, 0.0]), Some(4.0 / 10.0 + 0.05));
        assert_eq!(artifact.evaluate_tree(1, 0, TargetAxis::R, &[0.0, 0.0]), None);
        assert_eq!(artifact.evaluate_tree(0, 4, TargetAxis::R, &[0.0, 0.0]), None);
    }

    #[test]
    fn test_predict_averages_channels() {
        let artifact = one_window_artifact();
        let features = vec![vec![0.0f32, 0.0]; 4];
        let (r, g) = artifact.predict(&features).unwrap();
        // left leaves: r trees k = 0, 2, 4, 6; g trees k = 1, 3, 5, 7
        assert!((r - 0.3).abs() < 1e-6);
        assert!((g - 0.4).abs() < 1e-6);
        assert!(artifact.predict(&features[..3]).is_none());
    }

    #[test]
    fn test_yaml_and_json_round_trip_bit_exact() {
        let artifact = one_window_artifact();
        for format in [OutputFormat::Yaml, OutputFormat::Json] {
            let text = artifact.render(format, &BTreeMap::new()).unwrap();
            let loaded = ModelArtifact::parse(format, &text).unwrap();
            assert_eq!(loaded.num_trees, artifact.num_trees);
            assert_eq!(loaded.num_tree_nodes, artifact.num_tree_nodes);
            assert_eq!(loaded.feature_idx, artifact.feature_idx);
            let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
            assert_eq!(bits(&loaded.thresh_vals), bits(&artifact.thresh_vals));
            assert_eq!(bits(&loaded.leaf_vals), bits(&artifact.leaf_vals));
            assert_eq!(loaded.model_hash, artifact.model_hash);
        }
    }

    #[test]
    fn test_tampering_is_detected() {
        let mut artifact = one_window_artifact();
        artifact.leaf_vals[3] = 0.9;
        let text = artifact.render(OutputFormat::Json, &BTreeMap::new()).unwrap();
        let err = ModelArtifact::parse(OutputFormat::Json, &text).unwrap_err();
        assert!(err.to_string().contains("hash mismatch"));
    }

    #[test]
    fn test_length_mismatch_is_detected() {
        let mut artifact = one_window_artifact();
        artifact.leaf_vals.pop();
        artifact.model_hash = artifact.compute_hash().unwrap();
        assert!(matches!(artifact.validate(), Err(IllumCoreError::InvalidArtifact(_))));
    }

    #[test]
    fn test_source_formats_cannot_be_parsed() {
        assert!(matches!(
            ModelArtifact::parse(OutputFormat::CppHeader, ""),
            Err(IllumCoreError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_cpp_render() {
        let artifact = one_window_artifact();
        let mut params = BTreeMap::new();
        params.insert("--num_trees".to_string(), "1".to_string());
        let text = artifact.render(OutputFormat::CppHeader, &params).unwrap();

        assert!(text.starts_with("/* This file was automatically generated"));
        assert!(text.contains(" *  --num_trees 1\n"));
        assert!(text.contains(&artifact.model_hash));
        assert!(text.contains("const int _num_trees = 1;\n"));
        assert!(text.contains("const int _num_tree_nodes = 2;\n"));
        assert!(text.contains("= {0,1,0,1,0,1,0,1};"));
        assert!(text.contains(
            "float _thresh_vals[_num_trees*num_features*2*(_num_tree_nodes-1)] = {0.500f,0.500f,"
        ));
        assert!(text.contains("= {0.000f,0.050f,0.100f,0.150f,"));
    }

    #[test]
    fn test_rust_render() {
        let artifact = one_window_artifact();
        let text = artifact.render(OutputFormat::RustModule, &BTreeMap::new()).unwrap();
        assert!(text.contains("pub const NUM_TREES: usize = 1;"));
        assert!(text.contains("pub static FEATURE_IDX: [u8; NUM_TREES * NUM_FEATURES * 2 * (NUM_TREE_NODES - 1)] = [0,1,0,1,0,1,0,1];"));
        assert!(text.contains("= [0.000,0.050,0.100,0.150,"));
    }
}
