//! CSV dataset loading
//!
//! Each line holds one training image: the four per-channel feature blocks
//! (channel-major, all blocks the same width) followed by the ground-truth
//! illuminant `R,G,B`. Blank lines and `#` comments are skipped.

use anyhow::{Context, Result};
use illum_core::{TargetAxis, NUM_FEATURE_CHANNELS};
use std::path::Path;

use crate::errors::TrainerError;

/// Guards the chromaticity division against black illuminants
pub const ILLUMINANT_EPS: f64 = 0.001;

/// Red and green chromaticity of an illuminant, `c / (R + G + B + eps)`
pub fn chromaticity(illuminant: [f64; 3]) -> (f32, f32) {
    let sum: f64 = illuminant.iter().sum::<f64>() + ILLUMINANT_EPS;
    ((illuminant[0] / sum) as f32, (illuminant[1] / sum) as f32)
}

/// One training image: per-channel features and target chromaticity
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingInstance {
    features: Vec<Vec<f32>>,
    target_r: f32,
    target_g: f32,
}

impl TrainingInstance {
    pub fn new(features: Vec<Vec<f32>>, target_r: f32, target_g: f32) -> Self {
        Self {
            features,
            target_r,
            target_g,
        }
    }

    /// Build an instance from a raw illuminant colour
    pub fn from_illuminant(features: Vec<Vec<f32>>, illuminant: [f64; 3]) -> Self {
        let (target_r, target_g) = chromaticity(illuminant);
        Self::new(features, target_r, target_g)
    }

    /// All feature blocks, one per channel
    pub fn features(&self) -> &[Vec<f32>] {
        &self.features
    }

    /// Feature block of one channel
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.features[channel]
    }

    pub fn target_r(&self) -> f32 {
        self.target_r
    }

    pub fn target_g(&self) -> f32 {
        self.target_g
    }

    /// Target value for the given chromaticity axis
    pub fn target(&self, axis: TargetAxis) -> f32 {
        match axis {
            TargetAxis::R => self.target_r,
            TargetAxis::G => self.target_g,
        }
    }
}

/// Check that every instance has the fixed channel count and one shared,
/// non-empty block width. Returns that width (0 for an empty slice).
pub fn check_instances(instances: &[TrainingInstance]) -> Result<usize, TrainerError> {
    let Some(first) = instances.first() else {
        return Ok(0);
    };
    let width = first.features.first().map_or(0, Vec::len);
    if width == 0 {
        return Err(TrainerError::Dataset(
            "instance 0 has an empty feature block".to_string(),
        ));
    }

    for (i, instance) in instances.iter().enumerate() {
        if instance.features.len() != NUM_FEATURE_CHANNELS {
            return Err(TrainerError::Dataset(format!(
                "instance {i}: expected {NUM_FEATURE_CHANNELS} feature channels, got {}",
                instance.features.len()
            )));
        }
        if let Some(c) = instance.features.iter().position(|b| b.len() != width) {
            return Err(TrainerError::Dataset(format!(
                "instance {i}, channel {c}: expected block width {width}, got {}",
                instance.features[c].len()
            )));
        }
        let values_finite = instance.features.iter().flatten().all(|v| v.is_finite());
        if !values_finite || !instance.target_r.is_finite() || !instance.target_g.is_finite() {
            return Err(TrainerError::Dataset(format!(
                "instance {i} contains a non-finite value"
            )));
        }
    }
    Ok(width)
}

/// Training dataset
#[derive(Clone, Debug)]
pub struct Dataset {
    instances: Vec<TrainingInstance>,
    block_width: usize,
}

impl Dataset {
    /// Wrap already-extracted instances
    pub fn from_instances(instances: Vec<TrainingInstance>) -> Result<Self, TrainerError> {
        let block_width = check_instances(&instances)?;
        Ok(Self {
            instances,
            block_width,
        })
    }

    /// Load dataset from CSV file
    /// Expected format: ch0_0,..,ch0_w,...,ch3_w,R,G,B
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).context("Failed to read CSV file")?;
        Self::from_csv_str(&content)
    }

    /// Parse dataset rows from CSV text
    pub fn from_csv_str(content: &str) -> Result<Self> {
        let mut instances = Vec::new();
        let mut column_count = 0;

        for (line_idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
            if column_count == 0 {
                if parts.len() < 3 + NUM_FEATURE_CHANNELS
                    || (parts.len() - 3) % NUM_FEATURE_CHANNELS != 0
                {
                    anyhow::bail!(
                        "Line {}: expected {} feature blocks of equal width plus R,G,B, got {} columns",
                        line_idx + 1,
                        NUM_FEATURE_CHANNELS,
                        parts.len()
                    );
                }
                column_count = parts.len();
            } else if parts.len() != column_count {
                anyhow::bail!(
                    "Line {}: expected {} columns, got {}",
                    line_idx + 1,
                    column_count,
                    parts.len()
                );
            }

            let values = parts
                .iter()
                .enumerate()
                .map(|(i, part)| {
                    part.parse::<f64>().with_context(|| {
                        format!("Line {}, column {}: invalid number", line_idx + 1, i + 1)
                    })
                })
                .collect::<Result<Vec<f64>>>()?;

            let (feature_values, illuminant) = values.split_at(column_count - 3);
            let width = feature_values.len() / NUM_FEATURE_CHANNELS;
            let features = feature_values
                .chunks(width)
                .map(|block| block.iter().map(|&v| v as f32).collect())
                .collect();

            instances.push(TrainingInstance::from_illuminant(
                features,
                [illuminant[0], illuminant[1], illuminant[2]],
            ));
        }

        if instances.is_empty() {
            anyhow::bail!("Dataset is empty");
        }

        Ok(Self::from_instances(instances)?)
    }

    /// Get number of instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Width of each per-channel feature block
    pub fn block_width(&self) -> usize {
        self.block_width
    }

    pub fn instances(&self) -> &[TrainingInstance] {
        &self.instances
    }

    /// Per-feature (min, max) over all channels, channel-major
    pub fn feature_stats(&self) -> Vec<(f32, f32)> {
        let mut stats = vec![(f32::MAX, f32::MIN); NUM_FEATURE_CHANNELS * self.block_width];

        for instance in &self.instances {
            for (i, &val) in instance.features.iter().flatten().enumerate() {
                stats[i].0 = stats[i].0.min(val);
                stats[i].1 = stats[i].1.max(val);
            }
        }

        stats
    }
}
