// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the filesystem on behalf of the
// other layers:
//
//   checkpoint.rs — Burn weight records per epoch, plus the
//                   TrainConfig and class list needed to
//                   rebuild the architecture later.
//
//   metrics.rs    — Epoch-level loss/accuracy history and its
//                   CSV log.
//
//   tfjs/         — Export to the TensorFlow.js layers-model
//                   format served from public/model.
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Records)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics history and CSV logger
pub mod metrics;

/// TensorFlow.js layers-model export
pub mod tfjs;
