//! fakelens CLI for deepfake detection with visual explanations.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burn::prelude::*;
use fakelens_core::backend::DefaultBackend;
use fakelens_detect::{Detector, DetectorConfig};
use fakelens_models::{save_checkpoint, CheckpointMetadata, ViTClassifier, ViTClassifierConfig};

/// Backend type for inference and explanations.
type InferBackend = DefaultBackend;

type VitDetector = Detector<InferBackend, ViTClassifier<InferBackend>>;

#[derive(Parser)]
#[command(name = "fakelens")]
#[command(author, version)]
#[command(about = "Deepfake detection with Grad-CAM explanations")]
#[command(long_about = "fakelens: classify images as FAKE or REAL and show where the model looked.

EXAMPLES:
  # Create a randomly initialized checkpoint to try the pipeline
  fakelens init-checkpoint --output ./runs/vit --seed 42

  # Classify an image and write the heatmap overlay next to the report
  fakelens detect photo.jpg --checkpoint ./runs/vit --out-dir ./out

  # Classification only
  fakelens detect photo.jpg --checkpoint ./runs/vit --no-visualization

  # Show model info and health
  fakelens info --checkpoint ./runs/vit")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an image and print the detection report as JSON
    Detect {
        /// Image file (PNG or JPEG)
        image: PathBuf,

        /// Checkpoint directory (overrides the config file)
        #[arg(long, value_name = "DIR")]
        checkpoint: Option<PathBuf>,

        /// Detector config file (JSON)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Skip the heatmap visualization
        #[arg(long, default_value = "false")]
        no_visualization: bool,

        /// Write original.png and overlay.png into this directory
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },
    /// Print model info and health as JSON
    Info {
        /// Checkpoint directory (overrides the config file)
        #[arg(long, value_name = "DIR")]
        checkpoint: Option<PathBuf>,

        /// Detector config file (JSON)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Write a randomly initialized checkpoint
    InitCheckpoint {
        /// Output checkpoint directory
        #[arg(long, value_name = "DIR")]
        output: PathBuf,

        /// Random seed; drawn at random when omitted
        #[arg(long, value_name = "SEED")]
        seed: Option<u64>,

        /// Model name stored in the metadata
        #[arg(long, default_value = "fakelens-vit", value_name = "NAME")]
        name: String,

        /// Square input resolution
        #[arg(long, default_value = "224", value_name = "PX")]
        image_size: usize,

        /// Patch size
        #[arg(long, default_value = "16", value_name = "PX")]
        patch_size: usize,

        /// Hidden size of the encoder
        #[arg(long, default_value = "768", value_name = "N")]
        d_model: usize,

        /// Attention heads per block
        #[arg(long, default_value = "12", value_name = "N")]
        n_heads: usize,

        /// Number of encoder blocks
        #[arg(long, default_value = "12", value_name = "N")]
        n_layers: usize,

        /// MLP hidden size
        #[arg(long, default_value = "3072", value_name = "N")]
        d_ff: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Detect {
            image,
            checkpoint,
            config,
            no_visualization,
            out_dir,
        } => handle_detect(image, checkpoint, config, no_visualization, out_dir),
        Commands::Info { checkpoint, config } => handle_info(checkpoint, config),
        Commands::InitCheckpoint {
            output,
            seed,
            name,
            image_size,
            patch_size,
            d_model,
            n_heads,
            n_layers,
            d_ff,
        } => {
            let model_config = ViTClassifierConfig::new(image_size, patch_size)
                .with_encoder(d_model, n_heads, n_layers, d_ff);
            handle_init_checkpoint(output, seed, name, model_config)
        }
    }
}

/// Build a detector from the optional config file and checkpoint override.
fn load_detector(checkpoint: Option<PathBuf>, config: Option<PathBuf>) -> Result<VitDetector> {
    let mut detector_config = match config {
        Some(path) => DetectorConfig::from_file(&path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => DetectorConfig::default(),
    };
    if let Some(dir) = checkpoint {
        detector_config = detector_config.with_checkpoint_dir(dir);
    }
    if detector_config.checkpoint_dir.is_none() {
        bail!("No checkpoint given. Pass --checkpoint DIR or set checkpoint_dir in the config file.");
    }

    let device = Default::default();
    VitDetector::from_checkpoint(detector_config, device).context("Failed to load detector")
}

fn handle_detect(
    image: PathBuf,
    checkpoint: Option<PathBuf>,
    config: Option<PathBuf>,
    no_visualization: bool,
    out_dir: Option<PathBuf>,
) -> Result<()> {
    let detector = load_detector(checkpoint, config)?;
    let bytes = std::fs::read(&image).with_context(|| format!("Failed to read {:?}", image))?;

    let with_visualization = if no_visualization { Some(false) } else { None };
    let (report, artifact) = detector
        .analyze(&bytes, with_visualization)
        .with_context(|| format!("Detection failed for {:?}", image))?;

    println!("{}", report.to_json()?);

    if let Some(dir) = out_dir {
        match artifact {
            Some(artifact) => {
                write_png(&dir, "original.png", &artifact.original_png)?;
                write_png(&dir, "overlay.png", &artifact.overlay_png)?;
                eprintln!("Saved original.png and overlay.png to {:?}", dir);
            }
            None => eprintln!("No visualization produced; nothing written to {:?}", dir),
        }
    }

    Ok(())
}

fn write_png(dir: &Path, name: &str, png: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let path = dir.join(name);
    std::fs::write(&path, png).with_context(|| format!("Failed to write {:?}", path))
}

fn handle_info(checkpoint: Option<PathBuf>, config: Option<PathBuf>) -> Result<()> {
    let detector = load_detector(checkpoint, config)?;
    let info = serde_json::json!({
        "model_info": detector.model_info(),
        "health": detector.health(),
        "explain": detector.config().explain,
    });
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn handle_init_checkpoint(
    output: PathBuf,
    seed: Option<u64>,
    name: String,
    model_config: ViTClassifierConfig,
) -> Result<()> {
    if model_config.patch_size == 0 || model_config.image_size % model_config.patch_size != 0 {
        bail!(
            "Image size {} is not a multiple of patch size {}",
            model_config.image_size,
            model_config.patch_size
        );
    }
    if model_config.n_heads == 0 || model_config.d_model % model_config.n_heads != 0 {
        bail!(
            "Hidden size {} is not divisible by {} heads",
            model_config.d_model,
            model_config.n_heads
        );
    }

    let seed = seed.unwrap_or_else(rand::random);
    InferBackend::seed(seed);

    let device = Default::default();
    let model: ViTClassifier<InferBackend> = model_config.init(&device);

    println!("Model configuration:");
    println!("  Architecture: ViTClassifier");
    println!("  Input: {}x{}", model_config.image_size, model_config.image_size);
    println!("  Patches: {}x{}", model_config.grid_size(), model_config.grid_size());
    println!("  Encoder: {} blocks, hidden {}", model_config.n_layers, model_config.d_model);
    println!("  Parameters: {}", model.num_params());
    println!("  Seed: {}", seed);

    let metadata = CheckpointMetadata::new(&model_config)
        .with_model_name(name)
        .with_init_seed(seed);
    save_checkpoint(&model, &metadata, &output)
        .with_context(|| format!("Failed to save checkpoint to {:?}", output))?;

    println!("\nSaved checkpoint to {:?}", output);
    println!("Note: weights are untrained; predictions are not meaningful.");
    Ok(())
}
