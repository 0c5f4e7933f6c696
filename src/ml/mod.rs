// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn model code lives here.
//
//   backbone.rs   — MobileNetV2 feature extractor with frozen
//                   batch normalisation and pretrained-weight
//                   loading
//
//   pretrained.rs — torchvision state-dict import (burn-import)
//
//   model.rs      — WasteClassifier: backbone → global average
//                   pooling → Dense(128, relu) → Dropout(0.2) →
//                   Dense(num_classes)
//
//   trainer.rs    — compile + fit: Adam, cross-entropy, per
//                   epoch validation, metrics and checkpoints
//
//   inferencer.rs — loads a checkpoint and classifies images

/// MobileNetV2 feature extractor
pub mod backbone;

/// ImageNet weights from torchvision checkpoints
pub mod pretrained;

/// Transfer-learning classifier (frozen backbone + trainable head)
pub mod model;

/// Training loop with validation and checkpointing
pub mod trainer;

/// Inference engine — loads checkpoint and predicts classes
pub mod inferencer;
