// ============================================================
// Layer 5 — Inferencer
// ============================================================
use anyhow::{Context, Result};
use burn::prelude::*;
use std::path::Path;

use crate::data::preprocessor::{Preprocessor, CHANNELS};
use crate::domain::{class_set::ClassSet, prediction::Prediction, traits::ImageClassifier};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::WasteClassifier;

pub struct Inferencer<B: Backend> {
    model:        WasteClassifier<B>,
    classes:      ClassSet,
    preprocessor: Preprocessor,
    device:       B::Device,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(
        model:        WasteClassifier<B>,
        classes:      ClassSet,
        preprocessor: Preprocessor,
        device:       B::Device,
    ) -> Self {
        Self { model, classes, preprocessor, device }
    }

    /// Rebuild the architecture from the saved config and load
    /// the latest checkpoint's weights into it.
    pub fn from_checkpoint(ckpt: &CheckpointManager, device: B::Device) -> Result<Self> {
        let cfg     = ckpt.load_config()?;
        let classes = ckpt.load_classes()?;
        let model: WasteClassifier<B> = cfg.model_config(classes.len()).init(&device);
        let model = ckpt.load_model(model, &device)?;
        tracing::info!("Model loaded from checkpoint ({} classes)", classes.len());
        Ok(Self::new(model, classes, Preprocessor::new(cfg.image_size), device))
    }

    pub fn model(&self) -> &WasteClassifier<B> {
        &self.model
    }

    pub fn classes(&self) -> &ClassSet {
        &self.classes
    }

    pub fn image_size(&self) -> usize {
        self.preprocessor.image_size()
    }

    /// Class probabilities for already-decoded HWC pixels
    pub fn predict_pixels(&self, pixels: &[u8]) -> Result<Prediction> {
        let size  = self.preprocessor.image_size();
        let input = Tensor::<B, 4>::from_data(
            TensorData::new(self.preprocessor.normalize(pixels), [1, CHANNELS, size, size]),
            &self.device,
        );

        let probabilities: Vec<f32> = self
            .model
            .probabilities(input)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("Cannot read model output: {:?}", e))?;

        let prediction = Prediction::from_probabilities(probabilities, self.classes.names())
            .context("Model produced no class probabilities")?;

        tracing::debug!(
            "Predicted '{}' (class {}) conf={:.4}",
            prediction.label, prediction.class_index, prediction.confidence
        );
        Ok(prediction)
    }
}

impl<B: Backend> ImageClassifier for Inferencer<B> {
    fn classify(&self, path: &Path) -> Result<Prediction> {
        let pixels = self.preprocessor.load(path)?;
        self.predict_pixels(&pixels)
    }
}
