// ============================================================
// Layer 5 — Pretrained Backbone Weights
// ============================================================
// ImageNet weights for MobileNetV2 are published as a PyTorch
// state dict by torchvision (`mobilenet_v2(weights=...)`).
// burn-import reads that file directly; only the key names
// need mapping onto this crate's module tree:
//
//   features.0.{0,1}           → stem.{conv,bn}
//   features.1.conv.{0.0,0.1}  → blocks.0.depthwise.{conv,bn}
//   features.1.conv.{1,2}      → blocks.0.project.{conv,bn}
//   features.N.conv.{0.0,0.1}  → blocks.N-1.expand.{conv,bn}
//   features.N.conv.{1.0,1.1}  → blocks.N-1.depthwise.{conv,bn}
//   features.N.conv.{2,3}      → blocks.N-1.project.{conv,bn}
//   features.18.{0,1}          → head.{conv,bn}
//   *.bn.{weight,bias,running_mean,running_var}
//                              → *.bn.{gamma,beta,moving_mean,moving_variance}
//
// `num_batches_tracked` and the `classifier.*` top are ignored.
// torchvision pads 3×3 convolutions symmetrically by 1, which is
// what ConvBn does, and uses a batch-norm epsilon of 1e-5.

use anyhow::Result;
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, Recorder},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::Path;

use crate::ml::backbone::{MobileNetV2, MobileNetV2Record, INVERTED_RESIDUAL_SETTINGS};

/// torchvision's BatchNorm2d default
pub const TORCHVISION_BN_EPSILON: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightsFormat {
    /// Burn named MessagePack record of `MobileNetV2`
    BurnRecord,
    /// torchvision `mobilenet_v2` state dict (.pt / .pth)
    TorchVision,
}

impl WeightsFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase) {
            Some(ext) if ext == "pt" || ext == "pth" => Self::TorchVision,
            _ => Self::BurnRecord,
        }
    }

    /// Epsilon the weights were trained with, when the format fixes it
    pub fn bn_epsilon(self) -> Option<f64> {
        match self {
            Self::TorchVision => Some(TORCHVISION_BN_EPSILON),
            Self::BurnRecord  => None,
        }
    }
}

fn block_count() -> usize {
    INVERTED_RESIDUAL_SETTINGS.iter().map(|&(_, _, n, _)| n).sum()
}

/// (regex, replacement) pairs, applied in order to every key.
pub fn torchvision_key_remap() -> Vec<(String, String)> {
    let blocks = block_count();
    let head = blocks + 1;

    let mut remap = vec![
        (r"^features\.0\.0\.(.+)$".to_string(), "stem.conv.$1".to_string()),
        (r"^features\.0\.1\.(.+)$".to_string(), "stem.bn.$1".to_string()),
        (format!(r"^features\.{head}\.0\.(.+)$"), "head.conv.$1".to_string()),
        (format!(r"^features\.{head}\.1\.(.+)$"), "head.bn.$1".to_string()),
        // First block has no expansion layer
        (r"^features\.1\.conv\.0\.0\.(.+)$".to_string(), "blocks.0.depthwise.conv.$1".to_string()),
        (r"^features\.1\.conv\.0\.1\.(.+)$".to_string(), "blocks.0.depthwise.bn.$1".to_string()),
        (r"^features\.1\.conv\.1\.(.+)$".to_string(), "blocks.0.project.conv.$1".to_string()),
        (r"^features\.1\.conv\.2\.(.+)$".to_string(), "blocks.0.project.bn.$1".to_string()),
    ];

    for n in 2..=blocks {
        let b = n - 1;
        let layers = [
            ("0\\.0", "expand.conv"),
            ("0\\.1", "expand.bn"),
            ("1\\.0", "depthwise.conv"),
            ("1\\.1", "depthwise.bn"),
            ("2", "project.conv"),
            ("3", "project.bn"),
        ];
        for (torch, ours) in layers {
            remap.push((
                format!(r"^features\.{n}\.conv\.{torch}\.(.+)$"),
                format!("blocks.{b}.{ours}.$1"),
            ));
        }
    }

    remap.extend([
        (r"\.bn\.weight$".to_string(), ".bn.gamma".to_string()),
        (r"\.bn\.bias$".to_string(), ".bn.beta".to_string()),
        (r"\.bn\.running_mean$".to_string(), ".bn.moving_mean".to_string()),
        (r"\.bn\.running_var$".to_string(), ".bn.moving_variance".to_string()),
    ]);
    remap
}

/// Load a torchvision state dict into `backbone`.
pub fn load_torchvision<B: Backend>(
    backbone: MobileNetV2<B>,
    path:     &Path,
    device:   &B::Device,
) -> Result<MobileNetV2<B>> {
    let mut args = LoadArgs::new(path.to_path_buf());
    for (pattern, replacement) in torchvision_key_remap() {
        args = args.with_key_remap(&pattern, &replacement);
    }

    let record: MobileNetV2Record<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(args, device)
        .map_err(|e| anyhow::anyhow!(
            "Cannot load torchvision weights from '{}': {:?}", path.display(), e
        ))?;
    Ok(backbone.load_record(record))
}
