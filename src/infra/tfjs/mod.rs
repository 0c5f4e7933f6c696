// ============================================================
// Layer 6 — TensorFlow.js Exporter
// ============================================================
// Writes a trained WasteClassifier in the TF.js layers-model
// format so the browser can load it with tf.loadLayersModel():
//
//   public/model/
//     model.json              ← topology + weights manifest
//     group1-shard1of4.bin    ← float32 weights, 4 MiB each
//     ...
//     metadata.json           ← class names, input size, scaling
//
// The exported graph mirrors the Burn model layer for layer in
// NHWC layout. Stride-2 convolutions are exported as a
// symmetric ZeroPadding2D followed by a "valid" convolution,
// which reproduces Burn's explicit padding exactly (Keras'
// "same" would pad asymmetrically).

pub mod topology;
pub mod weights;

use anyhow::{Context, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    fs,
    path::PathBuf,
};

use crate::data::preprocessor::{CHANNELS, PIXEL_SCALE};
use crate::domain::class_set::ClassSet;
use crate::ml::{
    backbone::{ConvBn, FrozenBatchNorm},
    model::WasteClassifier,
};
use topology::{BatchNormWeights, KerasGraph, Padding};
use weights::{permute, write_shards, CONV_TO_KERAS, DEPTHWISE_TO_KERAS, SHARD_SIZE_BYTES};

pub const MODEL_FILE: &str = "model.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Written next to model.json so the web client can preprocess
/// camera frames the same way training did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Class names, index i = output unit i
    pub classes:     Vec<String>,
    pub image_size:  usize,
    pub channels:    usize,
    /// Divide raw 0..255 pixels by this before inference
    pub pixel_scale: f32,
    pub layout:      String,
}

pub struct TfjsExporter {
    dir: PathBuf,
}

impl TfjsExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Export `model` for `image_size × image_size` RGB input.
    pub fn export<B: Backend>(
        &self,
        model:      &WasteClassifier<B>,
        classes:    &ClassSet,
        image_size: usize,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create export directory '{}'", self.dir.display()))?;
        self.remove_previous_export()?;

        let (graph, output) = build_graph(model, image_size)?;
        let topology = graph.model_topology("waste_classifier", &output)?;
        let layer_count = graph.layers().len();

        let weights = graph.into_weights();
        let group = write_shards(&self.dir, &weights, SHARD_SIZE_BYTES)?;

        let generated_by = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));
        let model_json = json!({
            "format": "layers-model",
            "generatedBy": generated_by,
            "convertedBy": generated_by,
            "modelTopology": topology,
            "weightsManifest": [group],
        });
        let model_path = self.dir.join(MODEL_FILE);
        fs::write(&model_path, serde_json::to_string(&model_json)?)
            .with_context(|| format!("Cannot write '{}'", model_path.display()))?;

        let metadata = ExportMetadata {
            classes:     classes.names().to_vec(),
            image_size,
            channels:    CHANNELS,
            pixel_scale: PIXEL_SCALE,
            layout:      "NHWC".to_string(),
        };
        let metadata_path = self.dir.join(METADATA_FILE);
        fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)
            .with_context(|| format!("Cannot write '{}'", metadata_path.display()))?;

        tracing::info!(
            "Exported {} layers, {} weight tensors to '{}'",
            layer_count,
            weights.len(),
            self.dir.display()
        );
        Ok(())
    }

    /// Stale shards from a larger previous model would otherwise linger.
    fn remove_previous_export(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let is_shard = name.starts_with("group") && name.ends_with(".bin");
            if is_shard || name == MODEL_FILE || name == METADATA_FILE {
                fs::remove_file(&path)
                    .with_context(|| format!("Cannot remove '{}'", path.display()))?;
            }
        }
        Ok(())
    }
}

fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {:?}", e))
}

fn bn_weights<B: Backend>(bn: &FrozenBatchNorm<B>) -> Result<BatchNormWeights> {
    Ok(BatchNormWeights {
        gamma:           to_vec(bn.gamma.val())?,
        beta:            to_vec(bn.beta.val())?,
        moving_mean:     to_vec(bn.moving_mean.val())?,
        moving_variance: to_vec(bn.moving_variance.val())?,
    })
}

/// Emit padding (if strided) + conv + BN for one ConvBn.
/// Returns the name of the BN layer.
fn conv_bn<B: Backend>(
    g:      &mut KerasGraph,
    unit:   &ConvBn<B>,
    from:   &str,
    names:  ConvBnNames<'_>,
) -> Result<String> {
    let weight = unit.conv.weight.val();
    let dims   = weight.dims();
    let data   = to_vec(weight)?;
    let k      = unit.kernel_size();

    let (input, padding) = match names.pad {
        Some(pad_name) if unit.stride > 1 => (g.zero_pad(pad_name, from, k / 2)?, Padding::Valid),
        _ => (from.to_string(), Padding::Same),
    };

    let conv = if unit.is_depthwise() {
        let (data, shape) = permute(&data, &dims, &DEPTHWISE_TO_KERAS);
        g.depthwise_conv2d(names.conv, &input, (shape, data), unit.stride, padding)?
    } else {
        let (data, shape) = permute(&data, &dims, &CONV_TO_KERAS);
        g.conv2d(names.conv, &input, (shape, data), unit.stride, padding)?
    };

    g.batch_norm(names.bn, &conv, bn_weights(&unit.bn)?, unit.bn.epsilon)
}

struct ConvBnNames<'a> {
    pad:  Option<&'a str>,
    conv: &'a str,
    bn:   &'a str,
}

/// Translate the Burn model into a Keras graph, returning the
/// graph and the name of its output layer.
pub fn build_graph<B: Backend>(
    model:      &WasteClassifier<B>,
    image_size: usize,
) -> Result<(KerasGraph, String)> {
    let mut g = KerasGraph::new();
    let backbone = &model.backbone;

    let input = g.input("input_1", image_size, CHANNELS)?;

    // ── Stem ──────────────────────────────────────────────────────────────────
    let x = conv_bn(&mut g, &backbone.stem, &input, ConvBnNames {
        pad: Some("Conv1_pad"), conv: "Conv1", bn: "bn_Conv1",
    })?;
    let mut x = g.relu6("Conv1_relu", &x)?;

    // ── Inverted residual blocks ──────────────────────────────────────────────
    for (i, block) in backbone.blocks.iter().enumerate() {
        let p = if i == 0 { "expanded_conv_".to_string() } else { format!("block_{i}_") };
        let block_input = x.clone();

        let mut h = x;
        if let Some(expand) = &block.expand {
            let bn = conv_bn(&mut g, expand, &h, ConvBnNames {
                pad: None, conv: &format!("{p}expand"), bn: &format!("{p}expand_BN"),
            })?;
            h = g.relu6(&format!("{p}expand_relu"), &bn)?;
        }

        let bn = conv_bn(&mut g, &block.depthwise, &h, ConvBnNames {
            pad: Some(format!("{p}pad").as_str()), conv: &format!("{p}depthwise"), bn: &format!("{p}depthwise_BN"),
        })?;
        h = g.relu6(&format!("{p}depthwise_relu"), &bn)?;

        h = conv_bn(&mut g, &block.project, &h, ConvBnNames {
            pad: None, conv: &format!("{p}project"), bn: &format!("{p}project_BN"),
        })?;

        x = if block.has_residual() {
            g.add(&format!("{p}add"), &block_input, &h)?
        } else {
            h
        };
    }

    // ── Last 1×1 conv ─────────────────────────────────────────────────────────
    let bn = conv_bn(&mut g, &backbone.head, &x, ConvBnNames {
        pad: None, conv: "Conv_1", bn: "Conv_1_bn",
    })?;
    let features = g.relu6("out_relu", &bn)?;

    // ── Classifier head ───────────────────────────────────────────────────────
    let pooled = g.global_average_pooling("global_average_pooling2d", &features)?;

    let hidden_w = model.hidden.weight.val();
    let hidden_dims = hidden_w.dims().to_vec();
    let hidden_b = model
        .hidden
        .bias
        .as_ref()
        .context("Hidden dense layer has no bias")?
        .val();
    let hidden = g.dense("dense", &pooled, (hidden_dims, to_vec(hidden_w)?), to_vec(hidden_b)?, "relu")?;

    let dropout = g.dropout("dropout", &hidden, model.dropout.prob)?;

    let out_w = model.output.weight.val();
    let out_dims = out_w.dims().to_vec();
    let out_b = model
        .output
        .bias
        .as_ref()
        .context("Output dense layer has no bias")?
        .val();
    let output = g.dense("dense_1", &dropout, (out_dims, to_vec(out_w)?), to_vec(out_b)?, "softmax")?;

    Ok((g, output))
}
