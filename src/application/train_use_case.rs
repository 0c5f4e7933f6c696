// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full fine-tuning pipeline in order:
//
//   Step 1: Discover labelled images   (Layer 4 - data)
//   Step 2: Check the class count
//   Step 3: Split train/validation     (Layer 4 - data)
//   Step 4: Decode + cache datasets    (Layer 4 - data)
//   Step 5: Build + freeze the model   (Layer 5 - ml)
//   Step 6: Save config and classes    (Layer 6 - infra)
//   Step 7: Run training loop          (Layer 5 - ml)
//   Step 8: Export for the browser     (Layer 6 - infra)
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, ensure, Result};
use burn::{module::AutodiffModule, prelude::*, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{
    dataset::ImageDataset,
    loader::ImageFolderLoader,
    preprocessor::Preprocessor,
    splitter::{split_train_val, DEFAULT_SPLIT_SEED, DEFAULT_VALIDATION_SPLIT},
};
use crate::domain::{class_set::DEFAULT_NUM_CLASSES, traits::ImageSource};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{History, MetricsLogger},
    tfjs::TfjsExporter,
};
use crate::ml::{
    backbone::{MobileNetV2Config, BN_EPSILON},
    pretrained::WeightsFormat,
    model::WasteClassifierConfig,
    trainer::{fit, select_device, FitContext, TrainBackend},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Saved next to the checkpoints so export/predict can rebuild
// the exact architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:         String,
    pub output_dir:       String,
    pub checkpoint_dir:   String,
    pub image_size:       usize,
    pub batch_size:       usize,
    pub epochs:           usize,
    pub num_classes:      usize,
    pub learning_rate:    f64,
    pub validation_split: f64,
    pub seed:             u64,
    pub num_workers:      usize,
    pub width_multiplier: f64,
    pub hidden_units:     usize,
    pub dropout:          f64,
    /// Backbone batch-norm epsilon (Keras 1e-3, torchvision 1e-5)
    #[serde(default = "default_bn_epsilon")]
    pub bn_epsilon:       f64,
    /// ImageNet backbone weights: Burn record (.mpk) or torchvision state dict (.pth)
    pub backbone_weights: Option<String>,
    pub random_backbone:  bool,
    pub cpu:              bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:         "data/images".to_string(),
            output_dir:       "public/model".to_string(),
            checkpoint_dir:   "checkpoints".to_string(),
            image_size:       224,
            batch_size:       32,
            epochs:           10,
            num_classes:      DEFAULT_NUM_CLASSES,
            learning_rate:    1e-3,
            validation_split: DEFAULT_VALIDATION_SPLIT,
            seed:             DEFAULT_SPLIT_SEED,
            num_workers:      1,
            width_multiplier: 1.0,
            hidden_units:     128,
            dropout:          0.2,
            bn_epsilon:       BN_EPSILON,
            backbone_weights: None,
            random_backbone:  false,
            cpu:              false,
        }
    }
}

fn default_bn_epsilon() -> f64 {
    BN_EPSILON
}

impl TrainConfig {
    pub fn model_config(&self, num_classes: usize) -> WasteClassifierConfig {
        let backbone = MobileNetV2Config::new()
            .with_width_multiplier(self.width_multiplier)
            .with_bn_epsilon(self.bn_epsilon);
        WasteClassifierConfig::new(num_classes, backbone)
            .with_hidden_units(self.hidden_units)
            .with_dropout(self.dropout)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline on the WGPU backend
    pub fn execute(&self) -> Result<History> {
        let device = select_device(self.config.cpu);
        run_pipeline::<TrainBackend>(&self.config, device)
    }
}

/// torchvision weights were trained with their own batch-norm
/// epsilon; the saved config records it so export matches.
fn resolve_bn_epsilon(cfg: &TrainConfig) -> TrainConfig {
    let mut cfg = cfg.clone();
    let format_epsilon = cfg
        .backbone_weights
        .as_deref()
        .and_then(|path| WeightsFormat::from_path(Path::new(path)).bn_epsilon());
    if let Some(epsilon) = format_epsilon {
        cfg.bn_epsilon = epsilon;
    }
    cfg
}

/// The pipeline itself, generic so tests can drive it on NdArray.
pub fn run_pipeline<B: AutodiffBackend>(cfg: &TrainConfig, device: B::Device) -> Result<History> {
    ensure!(cfg.image_size > 0, "Image size must be positive");
    ensure!(cfg.batch_size > 0, "Batch size must be positive");

    // ── Step 1: Discover images, labelled by folder ──────────────────────────
    tracing::info!("Loading images from '{}'", cfg.data_dir);
    let (classes, images) = ImageFolderLoader::new(&cfg.data_dir).load_all()?;

    // ── Step 2: The output layer is sized by --num-classes ───────────────────
    if classes.len() != cfg.num_classes {
        bail!(
            "Found {} class folders ({}) but --num-classes is {}",
            classes.len(),
            classes.names().join(", "),
            cfg.num_classes
        );
    }
    tracing::info!("Classes: {}", classes.names().join(", "));

    // ── Step 3: Seeded 80/20 split; both subsets must be populated ───────────
    let total = images.len();
    let (train_images, val_images) = split_train_val(images, cfg.validation_split, cfg.seed)?;
    ensure!(
        !train_images.is_empty() && !val_images.is_empty(),
        "Splitting {} images with validation split {} leaves {} for training and {} for validation; \
         both subsets need at least one image",
        total,
        cfg.validation_split,
        train_images.len(),
        val_images.len()
    );
    tracing::info!(
        "Split: {} train, {} validation",
        train_images.len(),
        val_images.len()
    );

    // ── Step 4: Decode every image once ──────────────────────────────────────
    let preprocessor  = Preprocessor::new(cfg.image_size);
    let train_dataset = ImageDataset::from_images(&train_images, &preprocessor)?;
    let val_dataset   = ImageDataset::from_images(&val_images, &preprocessor)?;
    tracing::info!(
        "Cached {} train and {} validation images",
        train_dataset.sample_count(),
        val_dataset.sample_count()
    );
    tracing::debug!(
        "Train class histogram: {:?}",
        train_dataset.class_histogram(classes.len())
    );

    // ── Step 5: Pretrained backbone, frozen; fresh head ──────────────────────
    // Nothing is written to the checkpoint directory until the
    // backbone has loaded, so a failed start leaves the previous
    // run intact.
    let cfg = &resolve_bn_epsilon(cfg);
    let mut model = cfg.model_config(classes.len()).init::<B>(&device);
    match (&cfg.backbone_weights, cfg.random_backbone) {
        (Some(path), _) => {
            model.backbone = model.backbone.load_pretrained(Path::new(path), &device)?;
        }
        (None, true) => {
            tracing::warn!("Training on a randomly initialised backbone");
        }
        (None, false) => {
            bail!("No backbone weights given: pass --backbone-weights PATH or --random-backbone");
        }
    }
    let model = model.freeze_backbone();
    tracing::info!(
        "Model: {} parameters, {} trainable",
        model.num_params(),
        model.trainable_params()
    );

    // ── Step 6: New run: drop old weights, save config + class order ─────────
    let checkpoints = CheckpointManager::new(&cfg.checkpoint_dir)?;
    checkpoints.clear_models()?;
    checkpoints.save_config(cfg)?;
    checkpoints.save_classes(&classes)?;
    let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

    // ── Step 7: Fit ──────────────────────────────────────────────────────────
    let ctx = FitContext {
        cfg,
        preprocessor,
        checkpoints: &checkpoints,
        metrics:     &metrics,
    };
    let (model, history) = fit(&ctx, model, train_dataset, val_dataset, device)?;

    // ── Step 8: Export the inference model (dropout disabled) ────────────────
    TfjsExporter::new(&cfg.output_dir).export(&model.valid(), &classes, cfg.image_size)?;
    println!("Model saved in TensorFlow.js format");

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use image::{Rgb, RgbImage};
    use std::fs;

    fn write_fixture(root: &Path, classes: &[(&str, u8)], per_class: usize) {
        for (name, shade) in classes {
            let dir = root.join(name);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let value = shade.saturating_add(i as u8);
                RgbImage::from_pixel(40, 30, Rgb([value, value, value]))
                    .save(dir.join(format!("{i}.png")))
                    .unwrap();
            }
        }
    }

    fn smoke_config(root: &Path, num_classes: usize) -> TrainConfig {
        TrainConfig {
            data_dir:         root.join("images").display().to_string(),
            output_dir:       root.join("public/model").display().to_string(),
            checkpoint_dir:   root.join("checkpoints").display().to_string(),
            image_size:       32,
            batch_size:       4,
            epochs:           1,
            num_classes,
            width_multiplier: 0.35,
            hidden_units:     8,
            random_backbone:  true,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_default_config_matches_training_constants() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.image_size, 224);
        assert_eq!(cfg.batch_size, 32);
        assert_eq!(cfg.epochs, 10);
        assert_eq!(cfg.num_classes, 5);
        assert_eq!(cfg.seed, 123);
        assert_eq!(cfg.validation_split, 0.2);
    }

    #[test]
    fn test_pipeline_trains_and_exports() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(&tmp.path().join("images"), &[("metal", 30), ("paper", 220)], 5);
        let cfg = smoke_config(tmp.path(), 2);

        let history = run_pipeline::<Autodiff<NdArray>>(&cfg, Default::default()).unwrap();
        assert_eq!(history.epochs.len(), 1);

        let out = Path::new(&cfg.output_dir);
        assert!(out.join("model.json").exists());
        assert!(out.join("metadata.json").exists());
        assert!(fs::read_dir(out)
            .unwrap()
            .any(|e| e.unwrap().file_name().to_string_lossy().starts_with("group1-shard")));

        let checkpoints = CheckpointManager::new(&cfg.checkpoint_dir).unwrap();
        assert_eq!(checkpoints.load_classes().unwrap().names(), ["metal", "paper"]);
        assert_eq!(checkpoints.load_config().unwrap().image_size, 32);
    }

    #[test]
    fn test_class_count_mismatch_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(&tmp.path().join("images"), &[("metal", 30), ("paper", 220)], 2);
        let cfg = smoke_config(tmp.path(), 5);

        let err = run_pipeline::<Autodiff<NdArray>>(&cfg, Default::default()).unwrap_err();
        assert!(err.to_string().contains("--num-classes"));
    }

    #[test]
    fn test_missing_backbone_weights_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(&tmp.path().join("images"), &[("metal", 30), ("paper", 220)], 5);
        let cfg = TrainConfig { random_backbone: false, ..smoke_config(tmp.path(), 2) };

        assert!(run_pipeline::<Autodiff<NdArray>>(&cfg, Default::default()).is_err());
    }

    #[test]
    fn test_empty_validation_subset_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        // floor(0.2 * 4) = 0 validation images
        write_fixture(&tmp.path().join("images"), &[("metal", 30), ("paper", 220)], 2);
        let cfg = smoke_config(tmp.path(), 2);

        let err = run_pipeline::<Autodiff<NdArray>>(&cfg, Default::default()).unwrap_err();
        assert!(err.to_string().contains("0 for validation"));
        assert!(!Path::new(&cfg.output_dir).join("model.json").exists());
    }

    #[test]
    fn test_failed_start_leaves_previous_run_exportable() {
        use crate::application::export_use_case::export_latest;
        use crate::infra::tfjs::ExportMetadata;

        let tmp = tempfile::tempdir().unwrap();
        write_fixture(&tmp.path().join("images"), &[("metal", 30), ("paper", 220)], 5);
        let first = smoke_config(tmp.path(), 2);
        run_pipeline::<Autodiff<NdArray>>(&first, Default::default()).unwrap();

        // Second run: other classes, other width, no backbone weights
        write_fixture(&tmp.path().join("images_b"), &[("glass", 30), ("wood", 220)], 5);
        let second = TrainConfig {
            data_dir:         tmp.path().join("images_b").display().to_string(),
            width_multiplier: 0.5,
            random_backbone:  false,
            ..smoke_config(tmp.path(), 2)
        };
        assert!(run_pipeline::<Autodiff<NdArray>>(&second, Default::default()).is_err());

        let checkpoints = CheckpointManager::new(&first.checkpoint_dir).unwrap();
        assert_eq!(checkpoints.load_classes().unwrap().names(), ["metal", "paper"]);
        assert_eq!(checkpoints.load_config().unwrap().width_multiplier, 0.35);

        let out = tmp.path().join("re-export");
        export_latest::<NdArray>(&first.checkpoint_dir, out.to_str().unwrap(), Default::default())
            .unwrap();
        let metadata: ExportMetadata =
            serde_json::from_str(&fs::read_to_string(out.join("metadata.json")).unwrap()).unwrap();
        assert_eq!(metadata.classes, ["metal", "paper"]);
    }

    #[test]
    fn test_new_run_discards_previous_epochs() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(&tmp.path().join("images"), &[("metal", 30), ("paper", 220)], 5);
        let long = TrainConfig { epochs: 2, ..smoke_config(tmp.path(), 2) };
        run_pipeline::<Autodiff<NdArray>>(&long, Default::default()).unwrap();

        let short = smoke_config(tmp.path(), 2);
        run_pipeline::<Autodiff<NdArray>>(&short, Default::default()).unwrap();

        let checkpoints = CheckpointManager::new(&short.checkpoint_dir).unwrap();
        assert_eq!(checkpoints.latest_epoch().unwrap(), 1);
        assert!(!Path::new(&short.checkpoint_dir).join("model_epoch_2.mpk").exists());
    }

    #[test]
    fn test_torchvision_weights_use_their_bn_epsilon() {
        let torch = TrainConfig {
            backbone_weights: Some("weights/mobilenet_v2.pth".to_string()),
            ..TrainConfig::default()
        };
        assert_eq!(resolve_bn_epsilon(&torch).bn_epsilon, 1e-5);
        assert_eq!(resolve_bn_epsilon(&torch).model_config(5).backbone.bn_epsilon, 1e-5);

        let burn = TrainConfig {
            backbone_weights: Some("weights/backbone.mpk".to_string()),
            ..TrainConfig::default()
        };
        assert_eq!(resolve_bn_epsilon(&burn).bn_epsilon, BN_EPSILON);
    }
}
