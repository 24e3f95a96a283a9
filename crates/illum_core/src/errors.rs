//! Error types for the flat model encoding layer

use thiserror::Error;

/// Errors that can occur while flattening trees or handling model artifacts
#[derive(Error, Debug)]
pub enum IllumCoreError {
    /// Requested encoding depth is outside the supported range
    #[error("Tree depth must be within 1..={max}, got {depth}")]
    DepthOutOfRange { depth: usize, max: usize },

    /// Fitted tree is deeper than the fixed layout can hold
    #[error("Tree exceeds maximum encodable depth: depth {depth} > {max_depth}")]
    TreeTooDeep { depth: usize, max_depth: usize },

    /// Split feature does not fit the `u8` feature index array
    #[error("Feature index {feature_index} at node {node} does not fit an unsigned 8-bit slot")]
    FeatureIndexOverflow { node: usize, feature_index: usize },

    /// A leaf slot was left unwritten after flattening
    #[error("Leaf slot {slot} was never written while flattening")]
    UnwrittenLeafSlot { slot: usize },

    /// Tree arena is structurally broken
    #[error("Invalid tree: {0}")]
    InvalidTree(String),

    /// Output format not supported
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Artifact contents are inconsistent
    #[error("Invalid model artifact: {0}")]
    InvalidArtifact(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for flat model operations
pub type Result<T> = std::result::Result<T, IllumCoreError>;
