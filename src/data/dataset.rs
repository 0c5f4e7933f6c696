use anyhow::{bail, Result};
use burn::data::dataset::Dataset;

use crate::data::preprocessor::Preprocessor;
use crate::domain::labeled_image::LabeledImage;

/// One decoded, resized image (HWC u8) with its class index.
#[derive(Debug, Clone)]
pub struct ImageSample {
    pub pixels: Vec<u8>,
    pub label:  usize,
}

/// In-memory image dataset. Every image is decoded once at
/// construction, so later epochs never touch the disk.
pub struct ImageDataset {
    samples: Vec<ImageSample>,
}

impl ImageDataset {
    pub fn new(samples: Vec<ImageSample>) -> Self { Self { samples } }

    /// Decode and cache every image. Files that fail to decode are
    /// skipped with a warning; an empty result is an error.
    pub fn from_images(images: &[LabeledImage], preprocessor: &Preprocessor) -> Result<Self> {
        let mut samples = Vec::with_capacity(images.len());
        for image in images {
            match preprocessor.load(&image.path) {
                Ok(pixels) => samples.push(ImageSample { pixels, label: image.label }),
                Err(e) => tracing::warn!("Skipping '{}': {:#}", image.path.display(), e),
            }
        }

        if samples.is_empty() && !images.is_empty() {
            bail!("None of the {} images could be decoded", images.len());
        }
        if samples.len() < images.len() {
            tracing::warn!(
                "Cached {} of {} images ({} skipped)",
                samples.len(),
                images.len(),
                images.len() - samples.len(),
            );
        }
        Ok(Self { samples })
    }

    pub fn sample_count(&self) -> usize { self.samples.len() }

    /// Number of samples per class index
    pub fn class_histogram(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for s in &self.samples {
            if let Some(c) = counts.get_mut(s.label) {
                *c += 1;
            }
        }
        counts
    }
}

impl Dataset<ImageSample> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_from_images_skips_undecodable_files() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("good.png");
        let bad  = tmp.path().join("bad.png");
        RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])).save(&good).unwrap();
        std::fs::write(&bad, b"garbage").unwrap();

        let images = vec![LabeledImage::new(&good, 1), LabeledImage::new(&bad, 0)];
        let ds = ImageDataset::from_images(&images, &Preprocessor::new(4)).unwrap();

        assert_eq!(ds.len(), 1);
        assert_eq!(ds.get(0).unwrap().label, 1);
        assert_eq!(ds.class_histogram(2), vec![0, 1]);
    }

    #[test]
    fn test_all_undecodable_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let bad = tmp.path().join("bad.png");
        std::fs::write(&bad, b"garbage").unwrap();

        let images = vec![LabeledImage::new(&bad, 0)];
        assert!(ImageDataset::from_images(&images, &Preprocessor::new(4)).is_err());
    }

    #[test]
    fn test_get_out_of_range_is_none() {
        let ds = ImageDataset::new(vec![ImageSample { pixels: vec![0; 3], label: 0 }]);
        assert!(ds.get(1).is_none());
    }
}
