// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Classifies a single image with the latest checkpoint.

use anyhow::Result;
use std::path::Path;

use crate::domain::{prediction::Prediction, traits::ImageClassifier};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{inferencer::Inferencer, trainer::{select_device, TrainInnerBackend}};

pub struct PredictUseCase {
    inferencer: Inferencer<TrainInnerBackend>,
}

impl PredictUseCase {
    pub fn new(checkpoint_dir: &str, cpu: bool) -> Result<Self> {
        let checkpoints = CheckpointManager::new(checkpoint_dir)?;
        let inferencer  = Inferencer::from_checkpoint(&checkpoints, select_device(cpu))?;
        Ok(Self { inferencer })
    }

    pub fn predict(&self, image: &Path) -> Result<Prediction> {
        tracing::info!("Classifying '{}'", image.display());
        self.inferencer.classify(image)
    }

    pub fn class_names(&self) -> &[String] {
        self.inferencer.classes().names()
    }
}
