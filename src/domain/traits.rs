// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to these traits, not to the
// concrete directory loader or the Burn-backed inferencer.

use anyhow::Result;
use std::path::Path;

use crate::domain::{class_set::ClassSet, labeled_image::LabeledImage, prediction::Prediction};

// ─── ImageSource ──────────────────────────────────────────────────────────────
/// Anything that can produce a labelled image collection.
///
/// Implementations:
///   - ImageFolderLoader → one sub-directory per class
pub trait ImageSource {
    /// Discover the classes and every labelled image.
    fn load_all(&self) -> Result<(ClassSet, Vec<LabeledImage>)>;
}

// ─── ImageClassifier ──────────────────────────────────────────────────────────
/// Anything that can assign a class to an image file.
///
/// Implementations:
///   - Inferencer → the fine-tuned Burn model
pub trait ImageClassifier {
    fn classify(&self, path: &Path) -> Result<Prediction>;
}
