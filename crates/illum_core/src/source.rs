//! Source-embeddable renderings of a model artifact.
//!
//! Both renderers print the same three concatenated arrays as literals and
//! prefix them with a comment listing the parameters the model was generated
//! with. The comment is for humans only.

use std::collections::BTreeMap;

use crate::artifact::ModelArtifact;

/// Numeric formatting used by the source renderers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStyle {
    /// Digits printed after the decimal point for thresholds and leaf values
    pub precision: usize,
}

impl Default for SourceStyle {
    fn default() -> Self {
        Self { precision: 3 }
    }
}

impl SourceStyle {
    /// Format one float with the configured number of decimals
    pub fn format_float(&self, value: f32) -> String {
        format!("{:.*}", self.precision, value)
    }

    fn float_list(&self, values: &[f32], suffix: &str) -> String {
        values
            .iter()
            .map(|&v| format!("{}{suffix}", self.format_float(v)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn int_list(values: &[u8]) -> String {
    values
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parameter_lines(params: &BTreeMap<String, String>, prefix: &str) -> String {
    let mut out = String::new();
    for (key, value) in params {
        out.push_str(&format!("{prefix}  {key} {value}\n"));
    }
    out
}

/// Render the artifact as a C++ header with array literals
pub fn render_cpp(
    artifact: &ModelArtifact,
    params: &BTreeMap<String, String>,
    style: &SourceStyle,
) -> String {
    let mut out = String::new();
    out.push_str("/* This file was automatically generated by the illuminant model encoder\n");
    out.push_str(" * using the following parameters:\n");
    out.push_str(&parameter_lines(params, " *"));
    out.push_str(&format!(" * model hash: {}\n", artifact.model_hash));
    out.push_str(" */\n");

    out.push_str(&format!("const int num_features = {};\n", artifact.num_features));
    out.push_str(&format!("const int _num_trees = {};\n", artifact.num_trees));
    out.push_str(&format!("const int _num_tree_nodes = {};\n", artifact.num_tree_nodes));
    out.push_str(&format!(
        "unsigned char _feature_idx[_num_trees*num_features*2*(_num_tree_nodes-1)] = {{{}}};\n",
        int_list(&artifact.feature_idx)
    ));
    out.push_str(&format!(
        "float _thresh_vals[_num_trees*num_features*2*(_num_tree_nodes-1)] = {{{}}};\n",
        style.float_list(&artifact.thresh_vals, "f")
    ));
    out.push_str(&format!(
        "float _leaf_vals[_num_trees*num_features*2*_num_tree_nodes] = {{{}}};\n",
        style.float_list(&artifact.leaf_vals, "f")
    ));
    out
}

/// Render the artifact as a Rust module with `const` arrays
pub fn render_rust(
    artifact: &ModelArtifact,
    params: &BTreeMap<String, String>,
    style: &SourceStyle,
) -> String {
    let mut out = String::new();
    out.push_str("// This file was automatically generated by the illuminant model encoder\n");
    out.push_str("// using the following parameters:\n");
    out.push_str(&parameter_lines(params, "//"));
    out.push_str(&format!("// model hash: {}\n", artifact.model_hash));
    out.push('\n');

    out.push_str(&format!("pub const NUM_FEATURES: usize = {};\n", artifact.num_features));
    out.push_str(&format!("pub const NUM_TREES: usize = {};\n", artifact.num_trees));
    out.push_str(&format!("pub const NUM_TREE_NODES: usize = {};\n", artifact.num_tree_nodes));
    out.push_str(&format!(
        "pub static FEATURE_IDX: [u8; NUM_TREES * NUM_FEATURES * 2 * (NUM_TREE_NODES - 1)] = [{}];\n",
        int_list(&artifact.feature_idx)
    ));
    out.push_str(&format!(
        "pub static THRESH_VALS: [f32; NUM_TREES * NUM_FEATURES * 2 * (NUM_TREE_NODES - 1)] = [{}];\n",
        style.float_list(&artifact.thresh_vals, "")
    ));
    out.push_str(&format!(
        "pub static LEAF_VALS: [f32; NUM_TREES * NUM_FEATURES * 2 * NUM_TREE_NODES] = [{}];\n",
        style.float_list(&artifact.leaf_vals, "")
    ));
    out
}
