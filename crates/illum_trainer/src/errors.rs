use illum_core::{IllumCoreError, TargetAxis};
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the ensemble trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("failed to load dataset {path}")]
    DatasetLoad {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no training instances: found {found}, need at least {required}")]
    EmptyTrainingSet { found: usize, required: usize },

    #[error("tree fitting error: {0}")]
    Fit(String),

    #[error("fitting window {window}, channel {channel}, axis {axis} failed: {reason}")]
    FitFailed {
        window: usize,
        channel: usize,
        axis: TargetAxis,
        reason: String,
    },

    #[error("encoding window {window}, channel {channel}, axis {axis} failed: {source}")]
    Encode {
        window: usize,
        channel: usize,
        axis: TargetAxis,
        #[source]
        source: IllumCoreError,
    },

    #[error(transparent)]
    Core(#[from] IllumCoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}
