// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait: stacks cached samples into
// one image tensor and one label tensor.
//
//   Input:  N ImageSamples, each S×S×3 u8 (HWC)
//   Output: images  [N, 3, S, S] f32 in [0, 1]
//           targets [N] class indices
//
// All pixels are normalised into one flat Vec first so the
// batch is uploaded to the device in a single transfer.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::{dataset::ImageSample, preprocessor::{Preprocessor, CHANNELS}};

#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Shape: [batch_size, 3, image_size, image_size]
    pub images: Tensor<B, 4>,

    /// Shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    device:       B::Device,
    preprocessor: Preprocessor,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, preprocessor: Preprocessor) -> Self {
        Self { device, preprocessor }
    }
}

impl<B: Backend> Batcher<B, ImageSample, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageSample>, _device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let size       = self.preprocessor.image_size();

        let mut pixels  = Vec::with_capacity(batch_size * self.preprocessor.pixel_count());
        let mut targets = Vec::with_capacity(batch_size);
        for item in &items {
            pixels.extend(self.preprocessor.normalize(&item.pixels));
            targets.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, CHANNELS, size, size]),
            &self.device,
        );
        let targets = Tensor::<B, 1, Int>::from_ints(targets.as_slice(), &self.device);

        ImageBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_batch_shapes_and_values() {
        let device  = Default::default();
        let batcher = ImageBatcher::<NdArray>::new(device, Preprocessor::new(2));
        let items = vec![
            ImageSample { pixels: vec![255; 12], label: 3 },
            ImageSample { pixels: vec![0; 12],   label: 1 },
        ];

        let batch = batcher.batch(items, &Default::default());

        assert_eq!(batch.images.dims(), [2, 3, 2, 2]);
        assert_eq!(batch.targets.dims(), [2]);

        let first: f32 = batch.images.clone().slice([0..1]).mean().into_scalar().elem();
        let second: f32 = batch.images.slice([1..2]).mean().into_scalar().elem();
        assert!((first - 1.0).abs() < 1e-6);
        assert_eq!(second, 0.0);

        let labels: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(labels, vec![3, 1]);
    }
}
