// ============================================================
// Layer 3 — Prediction Domain Type
// ============================================================
// The result of classifying one image.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Name of the most likely class
    pub label: String,

    /// Index of the most likely class in the ClassSet
    pub class_index: usize,

    /// Softmax probability of the top class, in [0, 1]
    pub confidence: f32,

    /// Probabilities for every class, in ClassSet order (sums to 1)
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Pick the arg-max class from a probability vector.
    /// Returns None for an empty vector.
    pub fn from_probabilities(probabilities: Vec<f32>, names: &[String]) -> Option<Self> {
        let (class_index, &confidence) = probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        let label = names.get(class_index)?.clone();
        Some(Self { label, class_index, confidence, probabilities })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picks_highest_probability() {
        let names = vec!["metal".to_string(), "paper".to_string(), "trash".to_string()];
        let p = Prediction::from_probabilities(vec![0.1, 0.7, 0.2], &names).unwrap();
        assert_eq!(p.label, "paper");
        assert_eq!(p.class_index, 1);
        assert!((p.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_empty_probabilities_gives_none() {
        assert!(Prediction::from_probabilities(Vec::new(), &[]).is_none());
    }
}
