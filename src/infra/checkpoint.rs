// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights with Burn's named
// MessagePack recorder at full (f32) precision, so a model
// exported from a checkpoint matches the in-memory one.
//
// File layout:
//   checkpoints/
//     model_epoch_1.mpk   ← weights after epoch 1
//     model_epoch_2.mpk
//     ...
//     latest_epoch.json   ← number of the latest epoch
//     train_config.json   ← architecture + hyperparameters
//     classes.json        ← class names in label order
//
// The config and class list are needed to rebuild the exact
// architecture before loading weights into it.

use anyhow::{ensure, Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::domain::class_set::ClassSet;
use crate::ml::model::WasteClassifier;

type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Save model weights for a given epoch and mark it as latest.
    pub fn save_model<B: Backend>(
        &self,
        model: &WasteClassifier<B>,
        epoch: usize,
    ) -> Result<()> {
        // Recorder appends the .mpk extension
        let path = self.dir.join(format!("model_epoch_{epoch}"));

        CheckpointRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .map_err(|e| anyhow::anyhow!(
                "Failed to save checkpoint to '{}': {:?}", path.display(), e
            ))?;

        let latest_path = self.dir.join("latest_epoch.json");
        fs::write(&latest_path, serde_json::to_string(&epoch)?)
            .with_context(|| "Failed to write latest_epoch.json")?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Load the latest checkpoint into a model of matching architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  WasteClassifier<B>,
        device: &B::Device,
    ) -> Result<WasteClassifier<B>> {
        let epoch = self.latest_epoch()?;
        let path  = self.dir.join(format!("model_epoch_{epoch}"));

        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = CheckpointRecorder::new()
            .load(path.clone(), device)
            .map_err(|e| anyhow::anyhow!(
                "Cannot load checkpoint '{}': {:?}. Have you trained the model first?",
                path.display(), e
            ))?;

        // Records are not shape-checked on load; a parameter count
        // mismatch means the weights belong to another architecture.
        let expected = model.num_params();
        let model = model.load_record(record);
        ensure!(
            model.num_params() == expected,
            "Checkpoint '{}' holds {} parameters but train_config.json describes {}; \
             it was written by a different training run",
            path.display(),
            model.num_params(),
            expected
        );
        Ok(model)
    }

    /// Remove every epoch's weights and the latest-epoch marker,
    /// so a new run never leaves a previous run's weights behind.
    pub fn clear_models(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let is_epoch = name.starts_with("model_epoch_") && name.ends_with(".mpk");
            if is_epoch || name == "latest_epoch.json" {
                fs::remove_file(&path)
                    .with_context(|| format!("Cannot remove '{}'", path.display()))?;
            }
        }
        Ok(())
    }

    /// Save the training configuration; call before training starts.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' first.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_classes(&self, classes: &ClassSet) -> Result<()> {
        let path = self.dir.join("classes.json");
        fs::write(&path, serde_json::to_string_pretty(classes)?)
            .with_context(|| format!("Cannot write classes to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_classes(&self) -> Result<ClassSet> {
        let path = self.dir.join("classes.json");
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read classes from '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Read latest_epoch.json; errors if training hasn't been run yet.
    pub fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join("latest_epoch.json");
        let s = fs::read_to_string(&path)
            .with_context(|| "Cannot find 'latest_epoch.json'. Have you run 'train' first?")?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }
}
