//! Flat-array model core for learned colour balance
//!
//! Turns fitted illuminant regression trees into the fixed-depth array
//! layout used by the runtime evaluator, and reads/writes the resulting
//! model artifacts.
//!
//! Modules:
//! - `tree`: fitted tree arena produced by the fitting step
//! - `flatten`: fixed-depth heap layout and flat evaluation
//! - `artifact`: concatenated model artifact, formats and companion reader
//! - `source`: C++ / Rust array literal renderers
//! - `serde_canon`: canonical JSON and Blake3 hashing
//! - `errors`: error types

pub mod artifact;
pub mod errors;
pub mod flatten;
pub mod serde_canon;
pub mod source;
pub mod tree;

pub use artifact::{
    ArtifactBuilder, ModelArtifact, OutputFormat, TargetAxis, FORMAT_VERSION,
    NUM_FEATURE_CHANNELS, TREES_PER_WINDOW,
};
pub use errors::{IllumCoreError, Result};
pub use flatten::{flatten, leaf_span, FlatTree, MAX_ENCODABLE_DEPTH};
pub use source::SourceStyle;
pub use tree::{FittedTree, Node};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
