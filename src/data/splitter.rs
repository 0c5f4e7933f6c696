// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles samples with a seeded RNG and holds out a fraction
// of them for validation.
//
//   num_val = floor(validation_split * n)
//   train   = shuffled[..n - num_val]
//   val     = shuffled[n - num_val..]
//
// The seed makes the split reproducible: running training
// twice over the same directory evaluates on the same images.

use anyhow::{ensure, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Default fraction of images held out for validation
pub const DEFAULT_VALIDATION_SPLIT: f64 = 0.2;

/// Default shuffle seed for the split
pub const DEFAULT_SPLIT_SEED: u64 = 123;

/// Shuffle `samples` with `seed` and split into (train, validation).
///
/// `validation_split` must be strictly between 0 and 1.
pub fn split_train_val<T>(
    mut samples: Vec<T>,
    validation_split: f64,
    seed: u64,
) -> Result<(Vec<T>, Vec<T>)> {
    ensure!(
        validation_split > 0.0 && validation_split < 1.0,
        "validation_split must be between 0 and 1, got {validation_split}"
    );

    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total   = samples.len();
    let num_val = ((total as f64) * validation_split).floor() as usize;

    // split_off(n) leaves [0..n) in `samples` and returns [n..)
    let val = samples.split_off(total - num_val);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        samples.len(),
        val.len(),
    );

    Ok((samples, val))
}
