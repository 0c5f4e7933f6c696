// ============================================================
// Layer 5 — Training Loop
// ============================================================
// compile + fit: Adam on sparse categorical cross-entropy,
// reporting loss and accuracy for both subsets every epoch.
//
// Burn notes:
//   - Training runs on an AutodiffBackend so loss.backward() works
//   - model.valid() returns the model on B::InnerBackend; the
//     validation batcher must produce tensors on that backend too
//   - Only head parameters carry gradients (the backbone is
//     frozen), so the optimiser never touches backbone weights
//
// Reference: Kingma & Ba (2015) Adam

use anyhow::{ensure, Result};
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::ImageBatcher, dataset::ImageDataset, preprocessor::Preprocessor};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, History, MetricsLogger},
};
use crate::ml::model::{count_correct, WasteClassifier};

/// Keras' Adam epsilon (Burn defaults to 1e-5)
pub const ADAM_EPSILON: f32 = 1e-7;

pub type TrainBackend      = burn::backend::Autodiff<burn::backend::Wgpu>;
pub type TrainInnerBackend = burn::backend::Wgpu;

/// `--cpu` selects wgpu's CPU adapter; otherwise the best GPU.
/// wgpu allocates device memory on demand as tensors grow.
pub fn select_device(cpu: bool) -> burn::backend::wgpu::WgpuDevice {
    let device = if cpu {
        burn::backend::wgpu::WgpuDevice::Cpu
    } else {
        burn::backend::wgpu::WgpuDevice::default()
    };
    tracing::info!("Using WGPU device: {:?}", device);
    device
}

/// Everything fit() needs besides the model and data
pub struct FitContext<'a> {
    pub cfg:          &'a TrainConfig,
    pub preprocessor: Preprocessor,
    pub checkpoints:  &'a CheckpointManager,
    pub metrics:      &'a MetricsLogger,
}

/// Train for `cfg.epochs` epochs and return the trained model
/// together with its per-epoch metrics.
pub fn fit<B: AutodiffBackend>(
    ctx:           &FitContext<'_>,
    mut model:     WasteClassifier<B>,
    train_dataset: ImageDataset,
    val_dataset:   ImageDataset,
    device:        B::Device,
) -> Result<(WasteClassifier<B>, History)> {
    let cfg = ctx.cfg;
    ensure!(!train_dataset.is_empty(), "Training subset is empty");
    ensure!(!val_dataset.is_empty(), "Validation subset is empty");

    let optim_cfg = AdamConfig::new().with_epsilon(ADAM_EPSILON);
    let mut optim = optim_cfg.init();

    // ── Training data loader: reshuffled every epoch ──────────────────────────
    let train_batcher = ImageBatcher::<B>::new(device.clone(), ctx.preprocessor);
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(train_dataset);

    // ── Validation data loader (InnerBackend — no autodiff overhead) ──────────
    let val_batcher = ImageBatcher::<B::InnerBackend>::new(device.clone(), ctx.preprocessor);
    let val_loader  = DataLoaderBuilder::new(val_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(val_dataset);

    let mut history = History::default();

    for epoch in 1..=cfg.epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;
        let mut train_correct  = 0usize;
        let mut train_seen     = 0usize;

        for batch in train_loader.iter() {
            let batch_size = batch.targets.dims()[0];
            let (loss, logits) = model.forward_classification(batch.images, batch.targets.clone());

            train_loss_sum += loss.clone().into_scalar().elem::<f64>();
            train_batches  += 1;
            train_correct  += count_correct(logits, batch.targets);
            train_seen     += batch_size;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.learning_rate, model, grads);
        }

        // ── Validation phase: dropout disabled on the inner backend ───────────
        let model_valid = model.valid();

        let mut val_loss_sum = 0.0f64;
        let mut val_batches  = 0usize;
        let mut val_correct  = 0usize;
        let mut val_seen     = 0usize;

        for batch in val_loader.iter() {
            let batch_size = batch.targets.dims()[0];
            let (loss, logits) = model_valid.forward_classification(batch.images, batch.targets.clone());

            val_loss_sum += loss.into_scalar().elem::<f64>();
            val_batches  += 1;
            val_correct  += count_correct(logits, batch.targets);
            val_seen     += batch_size;
        }

        let metrics = EpochMetrics::new(
            epoch,
            mean(train_loss_sum, train_batches),
            ratio(train_correct, train_seen),
            mean(val_loss_sum, val_batches),
            ratio(val_correct, val_seen),
        );

        println!(
            "Epoch {:>3}/{} | loss={:.4} | accuracy={:.1}% | val_loss={:.4} | val_accuracy={:.1}%",
            epoch, cfg.epochs,
            metrics.train_loss, metrics.train_acc * 100.0,
            metrics.val_loss, metrics.val_acc * 100.0,
        );

        let improved = history.best().map_or(true, |best| metrics.is_improvement(best.val_loss));
        if improved {
            tracing::info!("val_loss improved to {:.4}", metrics.val_loss);
        }

        ctx.metrics.log(&metrics)?;
        ctx.checkpoints.save_model(&model, epoch)?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);

        history.push(metrics);
    }

    if let Some(best) = history.best() {
        tracing::info!(
            "Best epoch {}: val_loss={:.4}, val_accuracy={:.1}%",
            best.epoch, best.val_loss, best.val_acc * 100.0,
        );
    }
    tracing::info!("Training complete!");
    Ok((model, history))
}

fn mean(sum: f64, count: usize) -> f64 {
    if count > 0 { sum / count as f64 } else { f64::NAN }
}

fn ratio(correct: usize, total: usize) -> f64 {
    if total > 0 { correct as f64 / total as f64 } else { 0.0 }
}
