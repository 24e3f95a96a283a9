//! Learned colour balance trainer
//!
//! Fits the windowed regression-tree ensemble that predicts illuminant
//! chromaticity from per-channel image features, and encodes it as a flat
//! model artifact. Fitting is deterministic for a given seed.

pub mod cart;
pub mod config;
pub mod dataset;
pub mod deterministic;
pub mod encoder;
pub mod ensemble;
pub mod errors;

use illum_core::ModelArtifact;
use std::path::Path;
use tracing::{debug, info};

pub use cart::{CartFitter, Sample, TreeConfig, TreeFitter};
pub use config::{SampleWeighting, TrainerConfig};
pub use dataset::{chromaticity, Dataset, TrainingInstance};
pub use deterministic::LcgRng;
pub use encoder::encode;
pub use ensemble::{window_ranges, window_stride, Ensemble, EnsembleBuilder};
pub use errors::TrainerError;

/// Fit the ensemble on `instances` and encode it at the configured depth
pub fn train_model<F: TreeFitter>(
    instances: &[TrainingInstance],
    config: &TrainerConfig,
    fitter: &F,
) -> Result<ModelArtifact, TrainerError> {
    let ensemble = EnsembleBuilder::new(config.clone(), fitter).build(instances)?;
    encode(&ensemble, config.max_tree_depth)
}

/// Train a model directly from a CSV file with the built-in CART fitter
pub fn train_model_from_csv(
    path: &Path,
    config: &TrainerConfig,
) -> Result<ModelArtifact, TrainerError> {
    info!("Loading dataset from: {}", path.display());
    let dataset = Dataset::from_csv(path).map_err(|err| TrainerError::DatasetLoad {
        path: path.to_path_buf(),
        source: err.into(),
    })?;
    info!(
        "Loaded {} instances with feature blocks of width {}",
        dataset.len(),
        dataset.block_width()
    );
    for (i, (min, max)) in dataset.feature_stats().iter().enumerate() {
        debug!("  Feature {}: min={}, max={}", i, min, max);
    }

    let fitter = CartFitter::new(TreeConfig {
        min_samples_leaf: config.min_samples_leaf,
    });
    train_model(dataset.instances(), config, &fitter)
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
