use thiserror::Error;

/// The error type for mean IoU evaluation.
///
/// Shape and configuration errors are caller contract violations and are
/// surfaced before any computation happens. Undefined per-class scores are not
/// errors; see [`ConfusionHistogram::class_iou`](crate::ConfusionHistogram::class_iou).
#[derive(Error, Debug)]
pub enum SegIouError {
    /// Targets and predictions disagree on batch or spatial dimensions.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The shape the operation expected.
        expected: Vec<usize>,
        /// The shape that was supplied.
        actual: Vec<usize>,
    },

    /// Target channel count is neither 1 nor the prediction channel count.
    #[error("Channel mismatch: targets have {targets} channels, predictions have {predictions}")]
    ChannelMismatch {
        /// Number of target channels.
        targets: usize,
        /// Number of prediction channels.
        predictions: usize,
    },

    /// No image/label pair survived channel normalization.
    #[error("Empty batch: no image/label pair left after normalization ({dropped} dropped)")]
    EmptyBatch {
        /// Number of pairs that were discarded.
        dropped: usize,
    },

    /// The binarization threshold is not a finite number.
    #[error("Invalid threshold: {threshold}")]
    InvalidThreshold {
        /// The rejected threshold.
        threshold: f64,
    },

    /// The Jaccard smoothing term must be strictly positive.
    #[error("Epsilon must be positive, got {epsilon}")]
    InvalidEpsilon {
        /// The rejected epsilon.
        epsilon: f64,
    },

    /// Reading tensor data back to the host failed.
    #[error("Tensor data error: {reason}")]
    TensorData {
        /// Description of the failure.
        reason: String,
    },
}

/// A specialized `Result` type for mean IoU evaluation.
pub type SegIouResult<T> = Result<T, SegIouError>;
