// ============================================================
// Layer 5 — MobileNetV2 Backbone
// ============================================================
// The pretrained feature extractor, without its ImageNet
// classification top.
//
//   stem    Conv 3×3 s2 → BN → ReLU6                (32·α)
//   blocks  17 inverted residual blocks             (t, c, n, s)
//             1,  16, 1, 1
//             6,  24, 2, 2
//             6,  32, 3, 2
//             6,  64, 4, 2
//             6,  96, 3, 1
//             6, 160, 3, 2
//             6, 320, 1, 1
//   head    Conv 1×1 → BN → ReLU6                   (1280)
//
// An input of S×S comes out as ceil(S/32)×ceil(S/32), so the
// default 224×224 gives a 7×7×1280 feature map.
//
// Batch normalisation is frozen: it always normalises with the
// stored moving statistics, never with batch statistics, so a
// frozen backbone behaves the same in training and inference.
//
// Pretrained weights come either from a Burn record (.mpk) or
// from a torchvision state dict (.pt/.pth); see pretrained.rs.

use anyhow::{ensure, Result};
use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};
use std::path::Path;

use crate::ml::pretrained::{load_torchvision, WeightsFormat};

/// Keras' batch-norm epsilon, the default for every backbone layer
pub const BN_EPSILON: f64 = 1e-3;

/// Channel count of the last feature map for α ≤ 1
pub const LAST_CHANNELS: usize = 1280;

/// (expansion t, output channels c, repeats n, first stride s)
pub const INVERTED_RESIDUAL_SETTINGS: [(usize, usize, usize, usize); 7] = [
    (1, 16, 1, 1),
    (6, 24, 2, 2),
    (6, 32, 3, 2),
    (6, 64, 4, 2),
    (6, 96, 3, 1),
    (6, 160, 3, 2),
    (6, 320, 1, 1),
];

/// Round `value` to the nearest multiple of `divisor`, never
/// going below `divisor` or more than 10% under `value`.
pub fn make_divisible(value: f64, divisor: usize) -> usize {
    let d = divisor as f64;
    let mut rounded = (((value + d / 2.0) / d).floor() * d).max(d);
    if rounded < 0.9 * value {
        rounded += d;
    }
    rounded as usize
}

fn relu6<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.clamp(0.0, 6.0)
}

// ─── Frozen batch norm ────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct FrozenBatchNorm<B: Backend> {
    pub gamma:           Param<Tensor<B, 1>>,
    pub beta:            Param<Tensor<B, 1>>,
    pub moving_mean:     Param<Tensor<B, 1>>,
    pub moving_variance: Param<Tensor<B, 1>>,
    pub epsilon:         f64,
}

impl<B: Backend> FrozenBatchNorm<B> {
    /// Identity normalisation: gamma 1, beta 0, mean 0, variance 1
    pub fn new(channels: usize, epsilon: f64, device: &B::Device) -> Self {
        Self {
            gamma:           Param::from_tensor(Tensor::ones([channels], device)),
            beta:            Param::from_tensor(Tensor::zeros([channels], device)),
            moving_mean:     Param::from_tensor(Tensor::zeros([channels], device)),
            moving_variance: Param::from_tensor(Tensor::ones([channels], device)),
            epsilon,
        }
    }

    /// x: [batch, channels, h, w]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [channels] = self.gamma.val().dims();
        let scale = self.gamma.val() / (self.moving_variance.val() + self.epsilon).sqrt();
        let shift = self.beta.val() - self.moving_mean.val() * scale.clone();
        x * scale.reshape([1, channels, 1, 1]) + shift.reshape([1, channels, 1, 1])
    }
}

// ─── Conv + BN ────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    pub conv:   Conv2d<B>,
    pub bn:     FrozenBatchNorm<B>,
    pub stride: usize,
    pub groups: usize,
}

impl<B: Backend> ConvBn<B> {
    /// Bias-free square convolution with "same"-style padding (k / 2)
    pub fn new(
        channels: [usize; 2],
        kernel:   usize,
        stride:   usize,
        groups:   usize,
        epsilon:  f64,
        device:   &B::Device,
    ) -> Self {
        let pad = kernel / 2;
        let conv = Conv2dConfig::new(channels, [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .with_groups(groups)
            .with_bias(false)
            .init(device);
        let bn = FrozenBatchNorm::new(channels[1], epsilon, device);
        Self { conv, bn, stride, groups }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }

    /// Weight shape: [out, in / groups, kh, kw]
    pub fn weight_dims(&self) -> [usize; 4] {
        self.conv.weight.val().dims()
    }

    pub fn out_channels(&self) -> usize {
        self.weight_dims()[0]
    }

    pub fn kernel_size(&self) -> usize {
        self.weight_dims()[2]
    }

    pub fn is_depthwise(&self) -> bool {
        self.groups > 1 && self.groups == self.out_channels()
    }
}

// ─── Inverted residual block ──────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    pub expand:       Option<ConvBn<B>>,
    pub depthwise:    ConvBn<B>,
    pub project:      ConvBn<B>,
    pub in_channels:  usize,
    pub out_channels: usize,
}

impl<B: Backend> InvertedResidual<B> {
    pub fn new(
        in_channels:  usize,
        out_channels: usize,
        stride:       usize,
        expansion:    usize,
        epsilon:      f64,
        device:       &B::Device,
    ) -> Self {
        let hidden = in_channels * expansion;
        let expand = (expansion != 1)
            .then(|| ConvBn::new([in_channels, hidden], 1, 1, 1, epsilon, device));
        let depthwise = ConvBn::new([hidden, hidden], 3, stride, hidden, epsilon, device);
        let project   = ConvBn::new([hidden, out_channels], 1, 1, 1, epsilon, device);
        Self { expand, depthwise, project, in_channels, out_channels }
    }

    /// Identity shortcut only when the shape is preserved
    pub fn has_residual(&self) -> bool {
        self.depthwise.stride == 1 && self.in_channels == self.out_channels
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut h = x.clone();
        if let Some(expand) = &self.expand {
            h = relu6(expand.forward(h));
        }
        h = relu6(self.depthwise.forward(h));
        // Linear bottleneck: no activation after the projection
        h = self.project.forward(h);

        if self.has_residual() { x + h } else { h }
    }
}

// ─── MobileNetV2 ──────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct MobileNetV2Config {
    /// Width multiplier α scaling every layer's channel count
    #[config(default = 1.0)]
    pub width_multiplier: f64,
    /// 1e-3 for Keras-trained weights, 1e-5 for torchvision
    #[config(default = 1e-3)]
    pub bn_epsilon: f64,
}

impl MobileNetV2Config {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MobileNetV2<B> {
        let alpha = self.width_multiplier;
        let eps   = self.bn_epsilon;

        let stem_channels = make_divisible(32.0 * alpha, 8);
        let stem = ConvBn::new([3, stem_channels], 3, 2, 1, eps, device);

        let mut blocks = Vec::new();
        let mut in_channels = stem_channels;
        for &(expansion, channels, repeats, stride) in &INVERTED_RESIDUAL_SETTINGS {
            let out_channels = make_divisible((channels as f64 * alpha).floor(), 8);
            for i in 0..repeats {
                let s = if i == 0 { stride } else { 1 };
                blocks.push(InvertedResidual::new(in_channels, out_channels, s, expansion, eps, device));
                in_channels = out_channels;
            }
        }

        let head = ConvBn::new([in_channels, self.last_channels()], 1, 1, 1, eps, device);
        MobileNetV2 { stem, blocks, head }
    }

    /// Output channel count of the final 1×1 convolution
    pub fn last_channels(&self) -> usize {
        if self.width_multiplier > 1.0 {
            make_divisible(LAST_CHANNELS as f64 * self.width_multiplier, 8)
        } else {
            LAST_CHANNELS
        }
    }
}

#[derive(Module, Debug)]
pub struct MobileNetV2<B: Backend> {
    pub stem:   ConvBn<B>,
    pub blocks: Vec<InvertedResidual<B>>,
    pub head:   ConvBn<B>,
}

impl<B: Backend> MobileNetV2<B> {
    /// images: [batch, 3, S, S] → features: [batch, C, ceil(S/32), ceil(S/32)]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = relu6(self.stem.forward(images));
        for block in &self.blocks {
            x = block.forward(x);
        }
        relu6(self.head.forward(x))
    }

    pub fn feature_dim(&self) -> usize {
        self.head.out_channels()
    }

    /// Replace the random initialisation with pretrained weights,
    /// either a Burn record (`.mpk`) or a torchvision state dict.
    ///
    /// Records are not shape-checked on load, so the parameter
    /// count is compared instead; a file for another width
    /// multiplier is rejected here rather than failing later.
    pub fn load_pretrained(self, path: &Path, device: &B::Device) -> Result<Self> {
        let expected = self.num_params();
        let loaded = match WeightsFormat::from_path(path) {
            WeightsFormat::BurnRecord => {
                let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
                self.load_file(path.to_path_buf(), &recorder, device)
                    .map_err(|e| anyhow::anyhow!(
                        "Cannot load backbone weights from '{}': {:?}", path.display(), e
                    ))?
            }
            WeightsFormat::TorchVision => load_torchvision(self, path, device)?,
        };

        ensure!(
            loaded.num_params() == expected,
            "Backbone weights in '{}' have {} parameters, expected {}; check --width-multiplier",
            path.display(),
            loaded.num_params(),
            expected
        );
        tracing::info!("Loaded pretrained backbone from '{}'", path.display());
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_make_divisible_matches_reference_values() {
        assert_eq!(make_divisible(32.0, 8), 32);
        assert_eq!(make_divisible(32.0 * 0.35, 8), 16);
        assert_eq!(make_divisible((16.0f64 * 0.35).floor(), 8), 8);
        assert_eq!(make_divisible((24.0f64 * 0.35).floor(), 8), 8);
        assert_eq!(make_divisible((96.0f64 * 0.5).floor(), 8), 48);
        // Never rounds down by more than 10%
        assert_eq!(make_divisible(11.0, 8), 16);
    }

    #[test]
    fn test_standard_layout() {
        let device = Default::default();
        let net = MobileNetV2Config::new().init::<TestBackend>(&device);

        assert_eq!(net.blocks.len(), 17);
        assert_eq!(net.stem.out_channels(), 32);
        assert_eq!(net.feature_dim(), 1280);
        assert!(net.blocks[0].expand.is_none());
        assert!(net.blocks[1].expand.is_some());
        assert_eq!(
            net.blocks.iter().filter(|b| b.has_residual()).count(),
            10,
        );
    }

    #[test]
    fn test_output_shape_is_ceil_of_stride_32() {
        let device = Default::default();
        let net = MobileNetV2Config::new()
            .with_width_multiplier(0.35)
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 4>::zeros([2, 3, 40, 40], &device);
        assert_eq!(net.forward(x).dims(), [2, 1280, 2, 2]);
    }

    #[test]
    fn test_frozen_batch_norm_uses_moving_statistics() {
        let device = Default::default();
        let mut bn = FrozenBatchNorm::<TestBackend>::new(1, BN_EPSILON, &device);
        bn.moving_mean     = Param::from_tensor(Tensor::from_floats([2.0], &device));
        bn.moving_variance = Param::from_tensor(Tensor::from_floats([4.0 - BN_EPSILON as f32], &device));
        bn.gamma           = Param::from_tensor(Tensor::from_floats([3.0], &device));
        bn.beta            = Param::from_tensor(Tensor::from_floats([1.0], &device));

        // (6 - 2) / sqrt(4) * 3 + 1 = 7, independent of the rest of the batch
        let x = Tensor::<TestBackend, 4>::from_floats([[[[6.0]]], [[[100.0]]]], &device);
        let y: Vec<f32> = bn.forward(x).into_data().to_vec().unwrap();
        assert!((y[0] - 7.0).abs() < 1e-4);
    }

    #[test]
    fn test_load_pretrained_round_trips_saved_record() {
        let device = Default::default();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("backbone");

        let cfg = MobileNetV2Config::new().with_width_multiplier(0.35);
        let original = cfg.init::<TestBackend>(&device);
        original
            .clone()
            .save_file(path.clone(), &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
            .unwrap();

        let loaded = cfg
            .init::<TestBackend>(&device)
            .load_pretrained(&path.with_extension("mpk"), &device)
            .unwrap();

        let a: Vec<f32> = original.stem.conv.weight.val().into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.stem.conv.weight.val().into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_weights_for_another_width_are_rejected() {
        let device = Default::default();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("backbone");

        MobileNetV2Config::new()
            .with_width_multiplier(0.5)
            .init::<TestBackend>(&device)
            .save_file(path.clone(), &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
            .unwrap();

        let result = MobileNetV2Config::new()
            .with_width_multiplier(0.35)
            .init::<TestBackend>(&device)
            .load_pretrained(&path.with_extension("mpk"), &device);
        assert!(result.is_err());
    }

    #[test]
    fn test_bn_epsilon_reaches_every_layer() {
        let device = Default::default();
        let net = MobileNetV2Config::new()
            .with_width_multiplier(0.35)
            .with_bn_epsilon(1e-5)
            .init::<TestBackend>(&device);

        assert_eq!(net.stem.bn.epsilon, 1e-5);
        assert_eq!(net.head.bn.epsilon, 1e-5);
        assert!(net.blocks.iter().all(|b| b.depthwise.bn.epsilon == 1e-5 && b.project.bn.epsilon == 1e-5));
    }

    #[test]
    fn test_missing_weights_file_is_an_error() {
        let device = Default::default();
        let net = MobileNetV2Config::new().with_width_multiplier(0.35).init::<TestBackend>(&device);
        assert!(net.load_pretrained(Path::new("/nonexistent/weights.mpk"), &device).is_err());
    }
}
