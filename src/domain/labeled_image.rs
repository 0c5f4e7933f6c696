// ============================================================
// Layer 3 — LabeledImage Domain Type
// ============================================================
// One image file on disk paired with its class index.
// The pixels are not loaded here; decoding is Layer 4's job.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledImage {
    /// Path to the encoded image (png, jpg, ...)
    pub path: PathBuf,

    /// Index into the ClassSet the image was loaded with
    pub label: usize,
}

impl LabeledImage {
    pub fn new(path: impl Into<PathBuf>, label: usize) -> Self {
        Self { path: path.into(), label }
    }
}
