// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one goal per CLI command.
//
// Rules for this layer:
//   - No ML math or model code here
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern

// Fine-tune the head and export for the browser
pub mod train_use_case;

// Re-export a saved checkpoint
pub mod export_use_case;

// Classify one image
pub mod predict_use_case;
