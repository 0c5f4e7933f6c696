// ============================================================
// Layer 6 — Keras Topology Builder
// ============================================================
// TF.js "layers-model" files describe the network as a Keras
// functional model: a flat list of layers, each naming the
// layers that feed it through `inbound_nodes`.
//
//   {"class_name": "Conv2D",
//    "name": "Conv1",
//    "config": {"filters": 32, "kernel_size": [3, 3], ...},
//    "inbound_nodes": [[["Conv1_pad", 0, 0, {}]]]}
//
// KerasGraph appends layers in topological order and collects
// their weights alongside, so the manifest order matches the
// layer order.

use anyhow::{ensure, Result};
use serde_json::{json, Value};
use std::collections::HashSet;

use crate::infra::tfjs::weights::NamedWeight;

pub const KERAS_VERSION: &str = "2.15.0";

/// Padding mode of a Keras convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    Same,
    Valid,
}

impl Padding {
    fn as_str(self) -> &'static str {
        match self {
            Padding::Same => "same",
            Padding::Valid => "valid",
        }
    }
}

/// Batch-norm statistics in Keras order
pub struct BatchNormWeights {
    pub gamma:           Vec<f32>,
    pub beta:            Vec<f32>,
    pub moving_mean:     Vec<f32>,
    pub moving_variance: Vec<f32>,
}

#[derive(Default)]
pub struct KerasGraph {
    layers:  Vec<Value>,
    names:   HashSet<String>,
    weights: Vec<NamedWeight>,
    input:   Option<String>,
}

impl KerasGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layers(&self) -> &[Value] {
        &self.layers
    }

    pub fn weights(&self) -> &[NamedWeight] {
        &self.weights
    }

    pub fn into_weights(self) -> Vec<NamedWeight> {
        self.weights
    }

    fn push(
        &mut self,
        class_name: &str,
        name:       &str,
        mut config: Value,
        inbound:    &[&str],
    ) -> Result<String> {
        ensure!(self.names.insert(name.to_string()), "Duplicate layer name '{name}'");
        for src in inbound {
            ensure!(self.names.contains(*src), "Layer '{name}' consumes unknown layer '{src}'");
        }

        config["name"] = json!(name);
        config["dtype"] = json!("float32");

        let inbound_nodes = if inbound.is_empty() {
            json!([])
        } else {
            let node: Vec<Value> = inbound.iter().map(|src| json!([src, 0, 0, {}])).collect();
            json!([node])
        };

        self.layers.push(json!({
            "class_name": class_name,
            "name": name,
            "config": config,
            "inbound_nodes": inbound_nodes,
        }));
        Ok(name.to_string())
    }

    fn weight(&mut self, layer: &str, suffix: &str, shape: Vec<usize>, data: Vec<f32>) -> Result<()> {
        self.weights.push(NamedWeight::new(format!("{layer}/{suffix}"), shape, data)?);
        Ok(())
    }

    /// NHWC float input of `size × size × channels`
    pub fn input(&mut self, name: &str, size: usize, channels: usize) -> Result<String> {
        let config = json!({
            "batch_input_shape": [null, size, size, channels],
            "sparse": false,
            "ragged": false,
        });
        let name = self.push("InputLayer", name, config, &[])?;
        self.input = Some(name.clone());
        Ok(name)
    }

    /// Keras Conv2D; `kernel` already in [kh, kw, in, out] layout
    pub fn conv2d(
        &mut self,
        name:    &str,
        from:    &str,
        kernel:  (Vec<usize>, Vec<f32>),
        stride:  usize,
        padding: Padding,
    ) -> Result<String> {
        let (shape, data) = kernel;
        ensure!(shape.len() == 4, "Conv2D '{name}' kernel must be rank 4");
        let config = json!({
            "trainable": false,
            "filters": shape[3],
            "kernel_size": [shape[0], shape[1]],
            "strides": [stride, stride],
            "padding": padding.as_str(),
            "data_format": "channels_last",
            "dilation_rate": [1, 1],
            "groups": 1,
            "activation": "linear",
            "use_bias": false,
        });
        let name = self.push("Conv2D", name, config, &[from])?;
        self.weight(&name, "kernel", shape, data)?;
        Ok(name)
    }

    /// Keras DepthwiseConv2D; `kernel` in [kh, kw, c, 1] layout
    pub fn depthwise_conv2d(
        &mut self,
        name:    &str,
        from:    &str,
        kernel:  (Vec<usize>, Vec<f32>),
        stride:  usize,
        padding: Padding,
    ) -> Result<String> {
        let (shape, data) = kernel;
        ensure!(shape.len() == 4, "DepthwiseConv2D '{name}' kernel must be rank 4");
        let config = json!({
            "trainable": false,
            "kernel_size": [shape[0], shape[1]],
            "strides": [stride, stride],
            "padding": padding.as_str(),
            "data_format": "channels_last",
            "dilation_rate": [1, 1],
            "depth_multiplier": shape[3],
            "activation": "linear",
            "use_bias": false,
        });
        let name = self.push("DepthwiseConv2D", name, config, &[from])?;
        self.weight(&name, "depthwise_kernel", shape, data)?;
        Ok(name)
    }

    pub fn batch_norm(
        &mut self,
        name:    &str,
        from:    &str,
        weights: BatchNormWeights,
        epsilon: f64,
    ) -> Result<String> {
        let channels = weights.gamma.len();
        let config = json!({
            "trainable": false,
            "axis": -1,
            "momentum": 0.999,
            "epsilon": epsilon,
            "center": true,
            "scale": true,
        });
        let name = self.push("BatchNormalization", name, config, &[from])?;
        self.weight(&name, "gamma", vec![channels], weights.gamma)?;
        self.weight(&name, "beta", vec![channels], weights.beta)?;
        self.weight(&name, "moving_mean", vec![channels], weights.moving_mean)?;
        self.weight(&name, "moving_variance", vec![channels], weights.moving_variance)?;
        Ok(name)
    }

    pub fn relu6(&mut self, name: &str, from: &str) -> Result<String> {
        let config = json!({
            "trainable": false,
            "max_value": 6.0,
            "negative_slope": 0.0,
            "threshold": 0.0,
        });
        self.push("ReLU", name, config, &[from])
    }

    /// Symmetric spatial zero padding
    pub fn zero_pad(&mut self, name: &str, from: &str, pad: usize) -> Result<String> {
        let config = json!({
            "trainable": false,
            "padding": [[pad, pad], [pad, pad]],
            "data_format": "channels_last",
        });
        self.push("ZeroPadding2D", name, config, &[from])
    }

    pub fn add(&mut self, name: &str, a: &str, b: &str) -> Result<String> {
        self.push("Add", name, json!({ "trainable": false }), &[a, b])
    }

    pub fn global_average_pooling(&mut self, name: &str, from: &str) -> Result<String> {
        let config = json!({
            "trainable": true,
            "data_format": "channels_last",
            "keepdims": false,
        });
        self.push("GlobalAveragePooling2D", name, config, &[from])
    }

    /// Dense with a [in, out] kernel and [out] bias
    pub fn dense(
        &mut self,
        name:       &str,
        from:       &str,
        kernel:     (Vec<usize>, Vec<f32>),
        bias:       Vec<f32>,
        activation: &str,
    ) -> Result<String> {
        let (shape, data) = kernel;
        ensure!(shape.len() == 2, "Dense '{name}' kernel must be rank 2");
        let units = shape[1];
        let config = json!({
            "trainable": true,
            "units": units,
            "activation": activation,
            "use_bias": true,
        });
        let name = self.push("Dense", name, config, &[from])?;
        self.weight(&name, "kernel", shape, data)?;
        self.weight(&name, "bias", vec![units], bias)?;
        Ok(name)
    }

    pub fn dropout(&mut self, name: &str, from: &str, rate: f64) -> Result<String> {
        let config = json!({ "trainable": true, "rate": rate });
        self.push("Dropout", name, config, &[from])
    }

    /// The `modelTopology` object of model.json
    pub fn model_topology(&self, model_name: &str, output: &str) -> Result<Value> {
        let input = self
            .input
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Keras graph has no input layer"))?;
        ensure!(self.names.contains(output), "Unknown output layer '{output}'");

        Ok(json!({
            "class_name": "Model",
            "config": {
                "name": model_name,
                "layers": self.layers,
                "input_layers": [[input, 0, 0]],
                "output_layers": [[output, 0, 0]],
            },
            "keras_version": KERAS_VERSION,
            "backend": "tensorflow",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers_link_through_inbound_nodes() {
        let mut g = KerasGraph::new();
        let x = g.input("input_1", 8, 3).unwrap();
        let y = g.relu6("relu", &x).unwrap();
        let z = g.add("add", &x, &y).unwrap();
        let topo = g.model_topology("m", &z).unwrap();

        let layers = topo["config"]["layers"].as_array().unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0]["config"]["batch_input_shape"], json!([null, 8, 8, 3]));
        assert_eq!(layers[2]["inbound_nodes"], json!([[["input_1", 0, 0, {}], ["relu", 0, 0, {}]]]));
        assert_eq!(topo["config"]["output_layers"], json!([["add", 0, 0]]));
    }

    #[test]
    fn test_duplicate_and_dangling_layers_are_rejected() {
        let mut g = KerasGraph::new();
        g.input("input_1", 8, 3).unwrap();
        assert!(g.relu6("input_1", "input_1").is_err());
        assert!(g.relu6("relu", "missing").is_err());
    }

    #[test]
    fn test_dense_records_kernel_and_bias() {
        let mut g = KerasGraph::new();
        let x = g.input("input_1", 1, 3).unwrap();
        g.dense("dense", &x, (vec![3, 2], vec![0.0; 6]), vec![0.5, 0.5], "softmax").unwrap();

        let names: Vec<&str> = g.weights().iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["dense/kernel", "dense/bias"]);
        assert_eq!(g.layers()[1]["config"]["units"], json!(2));
    }

    #[test]
    fn test_topology_requires_an_input() {
        let g = KerasGraph::new();
        assert!(g.model_topology("m", "x").is_err());
    }
}
