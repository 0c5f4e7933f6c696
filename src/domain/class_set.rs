// ============================================================
// Layer 3 — ClassSet Domain Type
// ============================================================
// The ordered list of class names the classifier predicts.
//
// Class indices are assigned by sorting the sub-folder names
// alphabetically, so the same directory always yields the same
// label numbering regardless of the order the OS lists it in.
//
// Example:
//   data/images/
//     trash/   → 4
//     paper/   → 2
//     ewaste/  → 0
//     metal/   → 1
//     plastic/ → 3

use serde::{Deserialize, Serialize};

/// The waste categories the deployed model sorts into.
pub const WASTE_CATEGORIES: [&str; 5] = ["plastic", "paper", "metal", "ewaste", "trash"];

/// Expected number of classes in a training directory.
pub const DEFAULT_NUM_CLASSES: usize = WASTE_CATEGORIES.len();

/// Alphabetically ordered, de-duplicated class names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSet {
    names: Vec<String>,
}

impl ClassSet {
    /// Build a ClassSet from any collection of names.
    /// Sorting happens here so callers never depend on input order.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Class name for a predicted index
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Label index for a class name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).ok()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}
