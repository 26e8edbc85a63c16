//! Activation and binarization of raw prediction scores.

use burn::tensor::{
    activation::{sigmoid, softmax},
    backend::Backend,
    Tensor,
};

/// Turns raw scores into probabilities.
///
/// Softmax over the channel axis for multi-class maps, sigmoid for a single
/// foreground channel.
///
/// # Shapes
///
/// - predictions: `[batch_size, channels, height, width]`
pub fn activate<B: Backend>(predictions: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, channels, _, _] = predictions.dims();
    if channels > 1 {
        softmax(predictions, 1)
    } else {
        sigmoid(predictions)
    }
}

/// Binary threshold applied to every channel independently.
///
/// Values strictly greater than `threshold` become `1.0`, all others `0.0`.
pub fn binarize<B: Backend, const D: usize>(
    predictions: Tensor<B, D>,
    threshold: f64,
) -> Tensor<B, D> {
    predictions.greater_elem(threshold).float()
}
