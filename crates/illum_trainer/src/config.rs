//! Trainer configuration
//!
//! Defaults match the reference training tool. A TOML file may override any
//! subset of the fields; command-line flags are applied on top by the binary.

use illum_core::MAX_ENCODABLE_DEPTH;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::errors::TrainerError;

/// How window members are emphasised over the rest of the training set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleWeighting {
    /// Window members carry an integer sample weight of `num_trees`
    Weight,
    /// Window members are repeated `num_trees` times with weight 1
    Replicate,
}

impl SampleWeighting {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleWeighting::Weight => "weight",
            SampleWeighting::Replicate => "replicate",
        }
    }
}

/// Ensemble training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainerConfig {
    /// Number of overlapping windows (one tree group per window)
    pub num_trees: usize,
    /// Maximum depth of every regression tree, also the flat layout depth
    pub max_tree_depth: usize,
    /// Minimum total sample weight in each child of a split
    pub min_samples_leaf: u32,
    /// Seed handed to every fit
    pub seed: u64,
    /// Window member emphasis
    pub weighting: SampleWeighting,
    /// Fit windows on the rayon thread pool
    pub parallel: bool,
    /// Fewer instances than this is treated as an empty training set
    pub min_instances: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            num_trees: 20,
            max_tree_depth: 4,
            min_samples_leaf: 1,
            seed: 1234,
            weighting: SampleWeighting::Weight,
            parallel: false,
            min_instances: 1,
        }
    }
}

impl TrainerConfig {
    /// Parse a configuration from TOML; missing fields keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, TrainerError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, TrainerError> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject configurations that cannot produce an encodable model
    pub fn validate(&self) -> Result<(), TrainerError> {
        if self.num_trees == 0 {
            return Err(TrainerError::Config("num_trees must be positive".to_string()));
        }
        if self.max_tree_depth == 0 || self.max_tree_depth > MAX_ENCODABLE_DEPTH {
            return Err(TrainerError::Config(format!(
                "max_tree_depth must be within 1..={}, got {}",
                MAX_ENCODABLE_DEPTH, self.max_tree_depth
            )));
        }
        if self.min_samples_leaf == 0 {
            return Err(TrainerError::Config(
                "min_samples_leaf must be positive".to_string(),
            ));
        }
        if self.min_instances == 0 {
            return Err(TrainerError::Config(
                "min_instances must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parameters recorded in the header of source artifacts
    pub fn generation_params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("--num_trees".to_string(), self.num_trees.to_string()),
            ("--max_tree_depth".to_string(), self.max_tree_depth.to_string()),
            ("--min_samples_leaf".to_string(), self.min_samples_leaf.to_string()),
            ("--seed".to_string(), self.seed.to_string()),
            ("--weighting".to_string(), self.weighting.as_str().to_string()),
            ("--min_instances".to_string(), self.min_instances.to_string()),
        ])
    }
}
