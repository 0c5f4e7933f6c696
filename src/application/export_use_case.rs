// ============================================================
// Layer 2 — ExportUseCase
// ============================================================
// Re-exports the latest checkpoint to the TF.js format without
// retraining, e.g. after a training run was interrupted.

use anyhow::Result;
use burn::prelude::*;

use crate::infra::{checkpoint::CheckpointManager, tfjs::TfjsExporter};
use crate::ml::{inferencer::Inferencer, trainer::{select_device, TrainInnerBackend}};

pub struct ExportUseCase {
    checkpoint_dir: String,
    output_dir:     String,
    cpu:            bool,
}

impl ExportUseCase {
    pub fn new(checkpoint_dir: String, output_dir: String, cpu: bool) -> Self {
        Self { checkpoint_dir, output_dir, cpu }
    }

    pub fn execute(&self) -> Result<()> {
        let device = select_device(self.cpu);
        export_latest::<TrainInnerBackend>(&self.checkpoint_dir, &self.output_dir, device)
    }
}

pub fn export_latest<B: Backend>(checkpoint_dir: &str, output_dir: &str, device: B::Device) -> Result<()> {
    let checkpoints = CheckpointManager::new(checkpoint_dir)?;
    let inferencer  = Inferencer::<B>::from_checkpoint(&checkpoints, device)?;
    TfjsExporter::new(output_dir).export(
        inferencer.model(),
        inferencer.classes(),
        inferencer.image_size(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::domain::class_set::ClassSet;
    use burn::backend::NdArray;
    use std::path::Path;

    #[test]
    fn test_export_latest_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt_dir = tmp.path().join("checkpoints");
        let out_dir  = tmp.path().join("model");

        let cfg = TrainConfig {
            image_size: 32,
            width_multiplier: 0.35,
            hidden_units: 8,
            ..TrainConfig::default()
        };
        let classes = ClassSet::new(["metal", "paper", "trash"]);
        let checkpoints = CheckpointManager::new(&ckpt_dir).unwrap();
        checkpoints.save_config(&cfg).unwrap();
        checkpoints.save_classes(&classes).unwrap();
        let model = cfg.model_config(3).init::<NdArray>(&Default::default());
        checkpoints.save_model(&model, 1).unwrap();

        export_latest::<NdArray>(
            ckpt_dir.to_str().unwrap(),
            out_dir.to_str().unwrap(),
            Default::default(),
        )
        .unwrap();

        let json = std::fs::read_to_string(Path::new(&out_dir).join("model.json")).unwrap();
        assert!(json.contains("\"dense_1\""));
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("model");
        let result = export_latest::<NdArray>(
            tmp.path().to_str().unwrap(),
            out.to_str().unwrap(),
            Default::default(),
        );
        assert!(result.is_err());
    }
}
