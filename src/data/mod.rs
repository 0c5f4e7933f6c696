// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from an image directory to device-ready batches:
//
//   data/images/<class>/*.png
//       │
//       ▼
//   ImageFolderLoader → (ClassSet, Vec<LabeledImage>)
//       │
//       ▼
//   split_train_val   → seeded 80/20 split
//       │
//       ▼
//   ImageDataset      → decodes + resizes once (cache)
//       │
//       ▼
//   ImageBatcher      → [N, 3, S, S] tensors
//       │
//       ▼
//   DataLoader        → shuffle + prefetch workers

/// Discovers class folders and image files
pub mod loader;

/// Decodes, resizes and normalises images
pub mod preprocessor;

/// Implements Burn's Dataset trait over cached images
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Seeded train/validation split
pub mod splitter;
