use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::{relu, softmax},
};

use crate::ml::backbone::{MobileNetV2, MobileNetV2Config};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct WasteClassifierConfig {
    pub num_classes: usize,
    pub backbone:    MobileNetV2Config,
    #[config(default = 128)]
    pub hidden_units: usize,
    #[config(default = 0.2)]
    pub dropout: f64,
}

impl WasteClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> WasteClassifier<B> {
        let backbone = self.backbone.init(device);
        let hidden   = LinearConfig::new(backbone.feature_dim(), self.hidden_units).init(device);
        let output   = LinearConfig::new(self.hidden_units, self.num_classes).init(device);
        let dropout  = DropoutConfig::new(self.dropout).init();
        WasteClassifier { backbone, hidden, dropout, output }
    }
}

/// Frozen MobileNetV2 features → GAP → Dense(relu) → Dropout → Dense
#[derive(Module, Debug)]
pub struct WasteClassifier<B: Backend> {
    pub backbone: MobileNetV2<B>,
    pub hidden:   Linear<B>,
    pub dropout:  Dropout,
    pub output:   Linear<B>,
}

impl<B: Backend> WasteClassifier<B> {
    /// Stop every backbone parameter from receiving gradients.
    pub fn freeze_backbone(mut self) -> Self {
        self.backbone = self.backbone.no_grad();
        self
    }

    pub fn num_classes(&self) -> usize {
        self.output.weight.val().dims()[1]
    }

    /// Parameters the optimiser updates (the head only)
    pub fn trainable_params(&self) -> usize {
        self.hidden.num_params() + self.output.num_params()
    }

    /// images: [batch, 3, S, S] → logits: [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        // Detached: the graph stops at the backbone output.
        let features = self.backbone.forward(images).detach();

        // Global average pooling: [batch, C, h, w] → [batch, C]
        let pooled = features.mean_dim(3).mean_dim(2).flatten::<2>(1, 3);

        let x = relu(self.hidden.forward(pooled));
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }

    /// Softmax over classes; every row sums to 1.
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// Sparse categorical cross-entropy, computed on logits.
    /// Returns (loss [1], logits [batch, num_classes]).
    pub fn forward_classification(
        &self,
        images:  Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(images);
        let loss = burn::nn::loss::CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), targets);
        (loss, logits)
    }
}

/// Number of rows whose arg-max equals the target
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    // argmax(1) returns [batch, 1]; flatten to [batch] before comparing
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}
