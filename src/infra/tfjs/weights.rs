// ============================================================
// Layer 6 — TF.js Weight Shards
// ============================================================
// TF.js reads weights as raw little-endian float32 values,
// concatenated in manifest order and cut into fixed-size
// shard files:
//
//   group1-shard1of3.bin  group1-shard2of3.bin  group1-shard3of3.bin
//
// The loader concatenates every shard of a group before slicing
// out individual weights, so a weight may straddle two shards.
//
// Burn stores convolution kernels channels-first; Keras expects
// them channels-last, so kernels go through `permute` first.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Shard size used by the TF.js converter (4 MiB)
pub const SHARD_SIZE_BYTES: usize = 4 * 1024 * 1024;

/// Burn conv kernel [out, in, kh, kw] → Keras Conv2D [kh, kw, in, out]
pub const CONV_TO_KERAS: [usize; 4] = [2, 3, 1, 0];

/// Burn depthwise kernel [c, 1, kh, kw] → Keras DepthwiseConv2D [kh, kw, c, 1]
pub const DEPTHWISE_TO_KERAS: [usize; 4] = [2, 3, 0, 1];

/// One named weight, already in Keras layout
#[derive(Debug, Clone)]
pub struct NamedWeight {
    pub name:  String,
    pub shape: Vec<usize>,
    pub data:  Vec<f32>,
}

impl NamedWeight {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let name = name.into();
        ensure!(
            shape.iter().product::<usize>() == data.len(),
            "Weight '{name}' has shape {shape:?} but {} values",
            data.len()
        );
        Ok(Self { name, shape, data })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSpec {
    pub name:  String,
    pub shape: Vec<usize>,
    pub dtype: String,
}

/// One entry of `weightsManifest` in model.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightGroup {
    pub paths:   Vec<String>,
    pub weights: Vec<WeightSpec>,
}

/// Reorder the axes of a dense row-major array.
/// `axes[i]` names the source axis that becomes output axis i.
pub fn permute(data: &[f32], shape: &[usize], axes: &[usize]) -> (Vec<f32>, Vec<usize>) {
    let rank = shape.len();
    let out_shape: Vec<usize> = axes.iter().map(|&a| shape[a]).collect();

    let mut src_strides = vec![1usize; rank];
    for i in (0..rank.saturating_sub(1)).rev() {
        src_strides[i] = src_strides[i + 1] * shape[i + 1];
    }
    // Stride in the source for each output axis
    let strides: Vec<usize> = axes.iter().map(|&a| src_strides[a]).collect();

    let mut out = Vec::with_capacity(data.len());
    let mut index = vec![0usize; rank];
    for _ in 0..data.len() {
        let offset: usize = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
        out.push(data[offset]);

        // Odometer increment over the output shape
        for d in (0..rank).rev() {
            index[d] += 1;
            if index[d] < out_shape[d] {
                break;
            }
            index[d] = 0;
        }
    }
    (out, out_shape)
}

/// Shard file names for a group of `count` shards
pub fn shard_names(count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| format!("group1-shard{i}of{count}.bin"))
        .collect()
}

/// Write all weights as shards into `dir` and return the manifest group.
pub fn write_shards(dir: &Path, weights: &[NamedWeight], shard_size: usize) -> Result<WeightGroup> {
    ensure!(shard_size > 0, "Shard size must be positive");

    let total: usize = weights.iter().map(|w| w.data.len() * 4).sum();
    let mut buffer = Vec::with_capacity(total);
    for w in weights {
        for v in &w.data {
            buffer.extend_from_slice(&v.to_le_bytes());
        }
    }

    let chunks: Vec<&[u8]> = if buffer.is_empty() {
        vec![&buffer[..]]
    } else {
        buffer.chunks(shard_size).collect()
    };
    let paths = shard_names(chunks.len());
    for (name, chunk) in paths.iter().zip(&chunks) {
        let path = dir.join(name);
        fs::write(&path, chunk)
            .with_context(|| format!("Cannot write weight shard '{}'", path.display()))?;
    }

    tracing::debug!("Wrote {} bytes of weights in {} shards", total, paths.len());

    let weights = weights
        .iter()
        .map(|w| WeightSpec {
            name:  w.name.clone(),
            shape: w.shape.clone(),
            dtype: "float32".to_string(),
        })
        .collect();
    Ok(WeightGroup { paths, weights })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permute_transposes_a_matrix() {
        // [[1, 2, 3], [4, 5, 6]] → [[1, 4], [2, 5], [3, 6]]
        let (out, shape) = permute(&[1., 2., 3., 4., 5., 6.], &[2, 3], &[1, 0]);
        assert_eq!(shape, vec![3, 2]);
        assert_eq!(out, vec![1., 4., 2., 5., 3., 6.]);
    }

    #[test]
    fn test_conv_kernel_moves_to_channels_last() {
        // out=2, in=1, kh=1, kw=2: element [o, 0, 0, x] = 10*o + x
        let data = [0., 1., 10., 11.];
        let (out, shape) = permute(&data, &[2, 1, 1, 2], &CONV_TO_KERAS);
        assert_eq!(shape, vec![1, 2, 1, 2]);
        // [0, x, 0, o] = 10*o + x
        assert_eq!(out, vec![0., 10., 1., 11.]);
    }

    #[test]
    fn test_depthwise_kernel_layout() {
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let (_, shape) = permute(&data, &[3, 1, 2, 2], &DEPTHWISE_TO_KERAS);
        assert_eq!(shape, vec![2, 2, 3, 1]);
    }

    #[test]
    fn test_weights_are_split_into_shards_of_fixed_size() {
        let tmp = tempfile::tempdir().unwrap();
        let weights = vec![
            NamedWeight::new("a/kernel", vec![3], vec![1.0, 2.0, 3.0]).unwrap(),
            NamedWeight::new("a/bias", vec![2], vec![4.0, 5.0]).unwrap(),
        ];

        // 20 bytes at 8 bytes per shard → 3 shards, the middle weight straddles
        let group = write_shards(tmp.path(), &weights, 8).unwrap();
        assert_eq!(group.paths, shard_names(3));
        assert_eq!(group.weights[0].shape, vec![3]);
        assert_eq!(group.weights[1].dtype, "float32");

        let mut bytes = Vec::new();
        for p in &group.paths {
            bytes.extend(fs::read(tmp.path().join(p)).unwrap());
        }
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        assert!(NamedWeight::new("w", vec![2, 2], vec![0.0; 3]).is_err());
    }
}
