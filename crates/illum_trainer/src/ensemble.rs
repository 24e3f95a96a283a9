//! Windowed ensemble builder
//!
//! Instances are sorted by red chromaticity and cut into `num_trees`
//! overlapping windows of `2 * stride` instances, where
//! `stride = ceil(N / (num_trees + 1))`. For every window one tree pair
//! `(r, g)` is fitted per feature channel on the whole training set, with the
//! window's members emphasised `num_trees` times over everyone else.

use illum_core::{FittedTree, TargetAxis, NUM_FEATURE_CHANNELS};
use rayon::prelude::*;
use std::ops::Range;
use tracing::{debug, info};

use crate::cart::{Sample, TreeFitter};
use crate::config::{SampleWeighting, TrainerConfig};
use crate::dataset::{check_instances, TrainingInstance};
use crate::errors::TrainerError;

/// The two trees fitted for one feature channel
#[derive(Debug, Clone, PartialEq)]
pub struct AxisPair {
    pub r: FittedTree,
    pub g: FittedTree,
}

impl AxisPair {
    pub fn get(&self, axis: TargetAxis) -> &FittedTree {
        match axis {
            TargetAxis::R => &self.r,
            TargetAxis::G => &self.g,
        }
    }
}

/// Trees fitted for one window, one pair per feature channel
#[derive(Debug, Clone, PartialEq)]
pub struct WindowTrees {
    /// Window range over the sorted instance set
    pub range: Range<usize>,
    pub channels: Vec<AxisPair>,
}

/// All fitted trees, indexed `[window][channel]`
#[derive(Debug, Clone, PartialEq)]
pub struct Ensemble {
    pub max_depth: usize,
    pub windows: Vec<WindowTrees>,
}

impl Ensemble {
    /// Number of windows
    pub fn num_trees(&self) -> usize {
        self.windows.len()
    }
}

/// Distance between consecutive window starts
pub fn window_stride(n: usize, num_trees: usize) -> usize {
    n.div_ceil(num_trees + 1)
}

/// Window ranges over a sorted set of `n` instances, clipped to `n`
pub fn window_ranges(n: usize, num_trees: usize) -> Vec<Range<usize>> {
    let stride = window_stride(n, num_trees);
    (0..num_trees)
        .map(|t| {
            let start = (t * stride).min(n);
            start..(start + 2 * stride).min(n)
        })
        .collect()
}

/// Indices into the sorted set with their sample weights, window members
/// first, then every other instance once.
pub fn window_samples(
    n: usize,
    window: &Range<usize>,
    emphasis: u32,
    weighting: SampleWeighting,
) -> Vec<(usize, u32)> {
    let mut out = Vec::with_capacity(n + window.len() * emphasis as usize);
    match weighting {
        SampleWeighting::Weight => out.extend(window.clone().map(|i| (i, emphasis))),
        SampleWeighting::Replicate => {
            for _ in 0..emphasis {
                out.extend(window.clone().map(|i| (i, 1)));
            }
        }
    }
    out.extend((0..n).filter(|i| !window.contains(i)).map(|i| (i, 1)));
    out
}

/// Sort instances ascending by red chromaticity, keeping ties in input order
pub fn sort_by_target_r(instances: &[TrainingInstance]) -> Vec<&TrainingInstance> {
    let mut sorted: Vec<&TrainingInstance> = instances.iter().collect();
    sorted.sort_by(|a, b| a.target_r().total_cmp(&b.target_r()));
    sorted
}

/// Builds the windowed ensemble with a pluggable tree fitter
pub struct EnsembleBuilder<'f, F: TreeFitter> {
    config: TrainerConfig,
    fitter: &'f F,
}

impl<'f, F: TreeFitter> EnsembleBuilder<'f, F> {
    pub fn new(config: TrainerConfig, fitter: &'f F) -> Self {
        Self { config, fitter }
    }

    /// Fit every window, channel and axis. Any failure aborts the build.
    pub fn build(&self, instances: &[TrainingInstance]) -> Result<Ensemble, TrainerError> {
        self.config.validate()?;
        if instances.len() < self.config.min_instances {
            return Err(TrainerError::EmptyTrainingSet {
                found: instances.len(),
                required: self.config.min_instances,
            });
        }
        check_instances(instances)?;

        let sorted = sort_by_target_r(instances);
        let ranges = window_ranges(sorted.len(), self.config.num_trees);
        info!(
            "Building {} windows over {} instances (stride {}, depth {})",
            ranges.len(),
            sorted.len(),
            window_stride(sorted.len(), self.config.num_trees),
            self.config.max_tree_depth
        );

        let windows = if self.config.parallel {
            ranges
                .into_par_iter()
                .enumerate()
                .map(|(t, range)| self.build_window(t, range, &sorted))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            ranges
                .into_iter()
                .enumerate()
                .map(|(t, range)| self.build_window(t, range, &sorted))
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Ensemble {
            max_depth: self.config.max_tree_depth,
            windows,
        })
    }

    fn build_window(
        &self,
        window: usize,
        range: Range<usize>,
        sorted: &[&TrainingInstance],
    ) -> Result<WindowTrees, TrainerError> {
        info!(
            "Fitting window {}/{} (instances {}..{})",
            window + 1,
            self.config.num_trees,
            range.start,
            range.end
        );

        let emphasis = u32::try_from(self.config.num_trees)
            .map_err(|_| TrainerError::Config("num_trees does not fit u32".to_string()))?;
        let weighted = window_samples(sorted.len(), &range, emphasis, self.config.weighting);

        let channels = (0..NUM_FEATURE_CHANNELS)
            .map(|channel| {
                let r = self.fit_one(window, channel, TargetAxis::R, &weighted, sorted)?;
                let g = self.fit_one(window, channel, TargetAxis::G, &weighted, sorted)?;
                Ok(AxisPair { r, g })
            })
            .collect::<Result<Vec<_>, TrainerError>>()?;

        Ok(WindowTrees { range, channels })
    }

    fn fit_one(
        &self,
        window: usize,
        channel: usize,
        axis: TargetAxis,
        weighted: &[(usize, u32)],
        sorted: &[&TrainingInstance],
    ) -> Result<FittedTree, TrainerError> {
        let samples: Vec<Sample<'_>> = weighted
            .iter()
            .map(|&(i, weight)| Sample {
                features: sorted[i].channel(channel),
                target: sorted[i].target(axis),
                weight,
            })
            .collect();

        let tree = self
            .fitter
            .fit(&samples, self.config.max_tree_depth, self.config.seed)
            .map_err(|err| TrainerError::FitFailed {
                window,
                channel,
                axis,
                reason: err.to_string(),
            })?;

        debug!(
            window,
            channel,
            %axis,
            nodes = tree.len(),
            depth = tree.depth(),
            "tree fitted"
        );
        Ok(tree)
    }
}
