//! Ensemble encoding
//!
//! Flattens every fitted tree to the fixed layout depth and concatenates
//! them window by window, channel by channel, red before green.

use illum_core::{flatten, ArtifactBuilder, ModelArtifact, TargetAxis, NUM_FEATURE_CHANNELS};
use tracing::info;

use crate::ensemble::Ensemble;
use crate::errors::TrainerError;

/// Encode an ensemble into a flat model artifact of depth `max_depth`
pub fn encode(ensemble: &Ensemble, max_depth: usize) -> Result<ModelArtifact, TrainerError> {
    if ensemble.windows.is_empty() {
        return Err(TrainerError::Config(
            "cannot encode an ensemble without windows".to_string(),
        ));
    }

    let mut builder = ArtifactBuilder::new(max_depth)?;
    for (window, trees) in ensemble.windows.iter().enumerate() {
        if trees.channels.len() != NUM_FEATURE_CHANNELS {
            return Err(TrainerError::Fit(format!(
                "window {window} has {} channels, expected {NUM_FEATURE_CHANNELS}",
                trees.channels.len()
            )));
        }
        for (channel, pair) in trees.channels.iter().enumerate() {
            for axis in TargetAxis::ALL {
                let flat = flatten(pair.get(axis), max_depth).map_err(|source| {
                    TrainerError::Encode {
                        window,
                        channel,
                        axis,
                        source,
                    }
                })?;
                builder.push(&flat)?;
            }
        }
    }

    let artifact = builder.finish()?;
    info!(
        "Encoded {} trees at depth {} (hash {})",
        artifact.tree_count(),
        max_depth,
        artifact.model_hash
    );
    Ok(artifact)
}
