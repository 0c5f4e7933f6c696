// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing what the system
// works with: classes, labelled images, and predictions.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only plain structs, enums, and traits

// The ordered set of class names (labels)
pub mod class_set;

// An image path with its class index
pub mod labeled_image;

// The output of classifying one image
pub mod prediction;

// Core abstractions that other layers implement
pub mod traits;
