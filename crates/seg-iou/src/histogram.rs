//! Confusion histograms between true and predicted class indices.
//!
//! The per-pair histogram is built on the device as a bincount over
//! `num_classes * truth + pred`. The accumulated batch histogram is small and
//! is reduced to Jaccard scores on the host.

use burn::tensor::{backend::Backend, Int, Tensor};
use serde::Serialize;

use crate::error::{SegIouError, SegIouResult};

/// Default smoothing term added to every Jaccard denominator.
pub const DEFAULT_EPSILON: f64 = 1e-10;

/// Counts `(truth, pred)` class pairs for one flattened image pair.
///
/// Positions whose true class lies outside `[0, num_classes)` are routed to a
/// sentinel bin and never counted; their prediction does not matter.
///
/// # Shapes
///
/// - truth: `[pixels]`
/// - pred: `[pixels]`
/// - output: `[num_classes, num_classes]`, rows are true classes
pub fn pair_histogram<B: Backend>(
    truth: Tensor<B, 1, Int>,
    pred: Tensor<B, 1, Int>,
    num_classes: usize,
) -> Tensor<B, 2, Int> {
    let device = truth.device();
    let bins = num_classes * num_classes;
    let [pixels] = truth.dims();

    if pixels == 0 {
        return Tensor::zeros([num_classes, num_classes], &device);
    }

    let valid = truth
        .clone()
        .greater_equal_elem(0)
        .bool_and(truth.clone().lower_elem(num_classes as i64));
    let flat =
        (truth.mul_scalar(num_classes as i64) + pred).mask_fill(valid.bool_not(), bins as i64);

    // One extra bin absorbs the masked positions.
    Tensor::<B, 1, Int>::zeros([bins + 1], &device)
        .scatter(0, flat.clone(), flat.ones_like())
        .narrow(0, 0, bins)
        .reshape([num_classes, num_classes])
}

/// Confusion histogram accumulated over a batch.
///
/// Entry `(i, j)` counts the pixels of true class `i` predicted as class `j`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionHistogram {
    num_classes: usize,
    counts: Vec<u64>,
}

impl ConfusionHistogram {
    /// An all-zero histogram.
    pub fn zeros(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![0; num_classes * num_classes],
        }
    }

    /// Builds a histogram from row-major counts.
    pub fn from_counts(num_classes: usize, counts: Vec<u64>) -> SegIouResult<Self> {
        if counts.len() != num_classes * num_classes {
            return Err(SegIouError::ShapeMismatch {
                expected: vec![num_classes * num_classes],
                actual: vec![counts.len()],
            });
        }
        Ok(Self {
            num_classes,
            counts,
        })
    }

    /// Reads a square `[num_classes, num_classes]` histogram back to the host.
    pub fn from_tensor<B: Backend>(histogram: Tensor<B, 2, Int>) -> SegIouResult<Self> {
        let [rows, cols] = histogram.dims();
        if rows != cols {
            return Err(SegIouError::ShapeMismatch {
                expected: vec![rows, rows],
                actual: vec![rows, cols],
            });
        }

        let counts = histogram
            .into_data()
            .iter::<i64>()
            .map(|count| {
                u64::try_from(count).map_err(|_| SegIouError::TensorData {
                    reason: format!("negative histogram count {count}"),
                })
            })
            .collect::<SegIouResult<Vec<_>>>()?;

        Self::from_counts(rows, counts)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Count of pixels with true class `truth` predicted as `pred`.
    pub fn get(&self, truth: usize, pred: usize) -> u64 {
        self.counts[truth * self.num_classes + pred]
    }

    /// Number of valid pixel pairs recorded.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Pixels whose true class is `class`.
    pub fn row_sum(&self, class: usize) -> u64 {
        (0..self.num_classes).map(|pred| self.get(class, pred)).sum()
    }

    /// Pixels predicted as `class`.
    pub fn col_sum(&self, class: usize) -> u64 {
        (0..self.num_classes).map(|truth| self.get(truth, class)).sum()
    }

    /// Per-class Jaccard index `|A ∩ B| / (|A| + |B| - |A ∩ B| + eps)`.
    ///
    /// A class that appears in neither the truth nor the prediction has no
    /// defined score and yields `None`.
    pub fn class_iou(&self, eps: f64) -> Vec<Option<f64>> {
        (0..self.num_classes)
            .map(|class| {
                let intersection = self.get(class, class) as f64;
                let truth = self.row_sum(class) as f64;
                let pred = self.col_sum(class) as f64;

                if truth + pred == 0.0 {
                    None
                } else {
                    Some(intersection / (truth + pred - intersection + eps))
                }
            })
            .collect()
    }

    /// Mean of the defined per-class Jaccard scores, `NaN` if none is defined.
    pub fn mean_iou(&self, eps: f64) -> f64 {
        mean_of_defined(&self.class_iou(eps))
    }
}

/// Arithmetic mean of the `Some` entries, `NaN` when there are none.
pub fn mean_of_defined(scores: &[Option<f64>]) -> f64 {
    let (sum, count) = scores
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), score| (sum + score, count + 1));

    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::TensorData;

    use super::*;
    use crate::tests::TestBackend;

    fn ints(values: &[i32]) -> Tensor<TestBackend, 1, Int> {
        Tensor::from_ints(values, &Default::default())
    }

    #[test]
    fn pair_histogram_counts_truth_pred_pairs() {
        let truth = ints(&[0, 0, 1, 1, 2, 2]);
        let pred = ints(&[0, 1, 1, 1, 0, 2]);

        pair_histogram(truth, pred, 3)
            .into_data()
            .assert_eq(&TensorData::from([[1i64, 1, 0], [0, 2, 0], [1, 0, 1]]), false);
    }

    #[test]
    fn pair_histogram_skips_out_of_range_truth() {
        // -1 and 255 are ignore labels; their predictions are never counted.
        let truth = ints(&[0, -1, 1, 255, 1]);
        let pred = ints(&[0, 1, 1, 0, 0]);

        let histogram = ConfusionHistogram::from_tensor(pair_histogram(truth, pred, 2)).unwrap();

        assert_eq!(histogram.total(), 3);
        assert_eq!(histogram.get(0, 0), 1);
        assert_eq!(histogram.get(1, 1), 1);
        assert_eq!(histogram.get(1, 0), 1);
    }

    #[test]
    fn pair_histogram_empty_input_is_zero() {
        let histogram = pair_histogram(ints(&[]), ints(&[]), 2);

        histogram
            .into_data()
            .assert_eq(&TensorData::from([[0i64, 0], [0, 0]]), false);
    }

    #[test]
    fn class_iou_matches_hand_computed_scores() {
        // truth [1, 1, 0, 0], pred [1, 0, 0, 0]
        let histogram = ConfusionHistogram::from_counts(2, vec![2, 0, 1, 1]).unwrap();

        let scores = histogram.class_iou(DEFAULT_EPSILON);

        assert!((scores[0].unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert!((scores[1].unwrap() - 0.5).abs() < 1e-9);
        assert!((histogram.mean_iou(DEFAULT_EPSILON) - 7.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn class_iou_absent_class_is_undefined() {
        let histogram =
            ConfusionHistogram::from_counts(3, vec![4, 0, 0, 0, 2, 0, 0, 0, 0]).unwrap();

        let scores = histogram.class_iou(DEFAULT_EPSILON);

        assert_eq!(scores[2], None);
        assert!((histogram.mean_iou(DEFAULT_EPSILON) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mean_iou_of_empty_histogram_is_nan() {
        assert!(ConfusionHistogram::zeros(4).mean_iou(DEFAULT_EPSILON).is_nan());
        assert!(mean_of_defined(&[None, None]).is_nan());
    }

    #[test]
    fn mean_of_defined_ignores_undefined_entries() {
        let mean = mean_of_defined(&[Some(0.25), None, Some(0.75), None]);

        assert!((mean - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn from_counts_rejects_wrong_length() {
        let result = ConfusionHistogram::from_counts(3, vec![0; 8]);

        assert!(matches!(result, Err(SegIouError::ShapeMismatch { .. })));
    }

    #[test]
    fn from_tensor_rejects_non_square_histogram() {
        let tensor = Tensor::<TestBackend, 2, Int>::zeros([2, 3], &Default::default());

        assert!(matches!(
            ConfusionHistogram::from_tensor(tensor),
            Err(SegIouError::ShapeMismatch { .. })
        ));
    }
}
