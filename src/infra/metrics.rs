// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Metrics recorded per epoch:
//   - epoch:      the epoch number (1, 2, 3, ...)
//   - train_loss: average cross-entropy loss on the training set
//   - train_acc:  fraction of training images classified correctly
//   - val_loss:   average cross-entropy loss on the validation set
//   - val_acc:    fraction of validation images classified correctly
//
// Output file: checkpoints/metrics.csv
//
//   epoch,train_loss,train_acc,val_loss,val_acc
//   1,1.204500,0.512000,1.089200,0.583000
//   2,0.890100,0.684000,0.854300,0.702000

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

pub const CSV_HEADER: &str = "epoch,train_loss,train_acc,val_loss,val_acc";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Average cross-entropy loss over all training batches.
    /// A random classifier over k classes starts near ln(k).
    pub train_loss: f64,

    /// Training accuracy in [0.0, 1.0]
    pub train_acc: f64,

    /// Average cross-entropy loss on the validation set
    pub val_loss: f64,

    /// Validation accuracy in [0.0, 1.0]
    pub val_acc: f64,
}

impl EpochMetrics {
    pub fn new(
        epoch:      usize,
        train_loss: f64,
        train_acc:  f64,
        val_loss:   f64,
        val_acc:    f64,
    ) -> Self {
        Self { epoch, train_loss, train_acc, val_loss, val_acc }
    }

    /// Returns true if this epoch improved over the previous best val_loss
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss < best_val_loss
    }

    fn to_csv_row(&self) -> String {
        format!(
            "{},{:.6},{:.6},{:.6},{:.6}",
            self.epoch, self.train_loss, self.train_acc, self.val_loss, self.val_acc,
        )
    }
}

/// Per-epoch metrics for a whole run, in epoch order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochMetrics>,
}

impl History {
    pub fn push(&mut self, m: EpochMetrics) {
        self.epochs.push(m);
    }

    /// The epoch with the lowest validation loss, ignoring NaN rows
    pub fn best(&self) -> Option<&EpochMetrics> {
        self.epochs
            .iter()
            .filter(|m| !m.val_loss.is_nan())
            .min_by(|a, b| a.val_loss.total_cmp(&b.val_loss))
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create a new MetricsLogger.
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");

        // Header only for a new file so repeated runs append
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{CSV_HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(f, "{}", m.to_csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );

        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_improvement() {
        let m = EpochMetrics::new(2, 2.5, 0.4, 2.3, 0.5);
        assert!(m.is_improvement(3.0));
        assert!(!m.is_improvement(2.0));
    }

    #[test]
    fn test_log_appends_rows_under_a_single_header() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(tmp.path()).unwrap();
        logger.log(&EpochMetrics::new(1, 1.0, 0.5, 1.1, 0.4)).unwrap();

        // A second logger on the same dir must not repeat the header
        let logger = MetricsLogger::new(tmp.path()).unwrap();
        logger.log(&EpochMetrics::new(2, 0.5, 0.75, 0.6, 0.7)).unwrap();

        let csv = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "2,0.500000,0.750000,0.600000,0.700000");
    }

    #[test]
    fn test_history_best_skips_nan() {
        let mut h = History::default();
        h.push(EpochMetrics::new(1, 1.0, 0.5, f64::NAN, 0.0));
        h.push(EpochMetrics::new(2, 0.9, 0.6, 0.8, 0.6));
        h.push(EpochMetrics::new(3, 0.7, 0.7, 0.9, 0.5));
        assert_eq!(h.best().map(|m| m.epoch), Some(2));
        assert_eq!(h.last().map(|m| m.epoch), Some(3));
    }
}
