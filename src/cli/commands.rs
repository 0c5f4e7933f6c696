// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands `train`, `export` and `predict`
// and all their configurable flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune the classifier head and export it for the browser
    Train(TrainArgs),

    /// Re-export the latest checkpoint in TensorFlow.js format
    Export(ExportArgs),

    /// Classify a single image with the latest checkpoint
    Predict(PredictArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// One subdirectory per class, named after the class
    #[arg(long, default_value = "data/images")]
    pub data_dir: String,

    /// Where the TensorFlow.js model is written
    #[arg(long, default_value = "public/model")]
    pub output_dir: String,

    /// Directory for per-epoch checkpoints, config and metrics
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Images are resized to IMAGE_SIZE × IMAGE_SIZE
    #[arg(long, default_value_t = 224)]
    pub image_size: usize,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Must equal the number of class folders in --data-dir
    #[arg(long, default_value_t = 5)]
    pub num_classes: usize,

    /// Adam step size
    #[arg(long, default_value_t = 1e-3)]
    pub learning_rate: f64,

    /// Fraction of images held out for validation
    #[arg(long, default_value_t = 0.2)]
    pub validation_split: f64,

    /// Seed for the train/validation split and epoch shuffling
    #[arg(long, default_value_t = 123)]
    pub seed: u64,

    /// Data loader worker threads
    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// MobileNetV2 width multiplier (alpha)
    #[arg(long, default_value_t = 1.0)]
    pub width_multiplier: f64,

    /// Pretrained backbone weights: torchvision mobilenet_v2 state
    /// dict (.pth / .pt) or a Burn record (.mpk)
    #[arg(long, conflicts_with = "random_backbone")]
    pub backbone_weights: Option<String>,

    /// Train on a randomly initialised backbone (smoke tests only)
    #[arg(long)]
    pub random_backbone: bool,

    /// Use the CPU adapter instead of a GPU
    #[arg(long)]
    pub cpu: bool,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:         a.data_dir,
            output_dir:       a.output_dir,
            checkpoint_dir:   a.checkpoint_dir,
            image_size:       a.image_size,
            batch_size:       a.batch_size,
            epochs:           a.epochs,
            num_classes:      a.num_classes,
            learning_rate:    a.learning_rate,
            validation_split: a.validation_split,
            seed:             a.seed,
            num_workers:      a.num_workers,
            width_multiplier: a.width_multiplier,
            backbone_weights: a.backbone_weights,
            random_backbone:  a.random_backbone,
            cpu:              a.cpu,
            ..TrainConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value = "public/model")]
    pub output_dir: String,

    #[arg(long)]
    pub cpu: bool,
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Image file to classify
    #[arg(long)]
    pub image: PathBuf,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long)]
    pub cpu: bool,
}
