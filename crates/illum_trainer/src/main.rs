//! Learned colour balance trainer CLI
//!
//! Fits the windowed tree ensemble from a CSV dataset and writes the flat
//! model artifact (YAML, JSON, C++ header or Rust module).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use illum_core::{ModelArtifact, OutputFormat};
use illum_trainer::{train_model_from_csv, SampleWeighting, TrainerConfig};
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "illum-train")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deterministic tree ensemble trainer for learned colour balance", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit an ensemble and write the encoded model
    Train(TrainArgs),
    /// Load a structured model and print its layout
    Inspect {
        /// Model file (.yml, .yaml or .json)
        model: PathBuf,
    },
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Input CSV dataset (four feature blocks, then illuminant R,G,B)
    #[arg(short, long)]
    input: PathBuf,

    /// Output model path; the extension picks the format
    #[arg(short, long)]
    output: PathBuf,

    /// TOML configuration file applied before the flags below
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of windows
    #[arg(long)]
    num_trees: Option<usize>,

    /// Maximum tree depth, also the flat layout depth
    #[arg(long)]
    max_tree_depth: Option<usize>,

    /// Seed handed to every fit
    #[arg(long)]
    seed: Option<u64>,

    /// Fit windows in parallel
    #[arg(long)]
    parallel: bool,

    /// Emphasise window members by replication instead of sample weights
    #[arg(long)]
    replicate: bool,
}

impl TrainArgs {
    fn resolve_config(&self) -> Result<TrainerConfig> {
        let mut config = match &self.config {
            Some(path) => TrainerConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => TrainerConfig::default(),
        };
        if let Some(num_trees) = self.num_trees {
            config.num_trees = num_trees;
        }
        if let Some(depth) = self.max_tree_depth {
            config.max_tree_depth = depth;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.parallel {
            config.parallel = true;
        }
        if self.replicate {
            config.weighting = SampleWeighting::Replicate;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Command::Train(args) => train(args),
        Command::Inspect { model } => inspect(model),
    }
}

fn train(args: TrainArgs) -> Result<()> {
    info!("Illuminant ensemble trainer v{}", env!("CARGO_PKG_VERSION"));

    // Reject unknown extensions before any work is done
    let format = OutputFormat::from_path(&args.output)?;
    let config = args.resolve_config()?;

    info!("Training configuration:");
    info!("  Windows: {}", config.num_trees);
    info!("  Max depth: {}", config.max_tree_depth);
    info!("  Min samples per leaf: {}", config.min_samples_leaf);
    info!("  Seed: {}", config.seed);
    info!("  Weighting: {}", config.weighting.as_str());
    info!("  Parallel: {}", config.parallel);

    let artifact = train_model_from_csv(&args.input, &config).context("Training failed")?;

    let mut params = config.generation_params();
    params.insert("--input".to_string(), args.input.display().to_string());

    info!("Saving {:?} model to: {}", format, args.output.display());
    artifact
        .save(&args.output, &params)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    info!("✓ Training completed successfully");
    info!("  Model: {}", args.output.display());
    info!("  Hash: {}", artifact.model_hash);

    Ok(())
}

fn inspect(model: PathBuf) -> Result<()> {
    let artifact = ModelArtifact::load(&model)
        .with_context(|| format!("Failed to load {}", model.display()))?;

    info!("Model: {}", model.display());
    info!("  Format version: {}", artifact.format_version);
    info!("  Windows: {}", artifact.num_trees);
    info!("  Trees: {}", artifact.tree_count());
    info!("  Depth: {}", artifact.tree_depth());
    info!("  Leaf slots per tree: {}", artifact.num_tree_nodes);
    info!("  Hash: {}", artifact.model_hash);
    debug!("  feature_idx: {:?}", artifact.feature_idx);
    debug!("  thresh_vals: {:?}", artifact.thresh_vals);
    debug!("  leaf_vals: {:?}", artifact.leaf_vals);

    Ok(())
}
