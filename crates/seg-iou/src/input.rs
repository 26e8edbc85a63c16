//! Input structures for the mean IoU metric.

use burn::{prelude::*, tensor::backend::Backend};
use derive_new::new;

/// Mean IoU metric input.
#[derive(new, Debug, Clone)]
pub struct MeanIoUInput<B: Backend> {
    /// Raw scores with shape `[batch_size, channels, height, width]`.
    pub predictions: Tensor<B, 4>,
    /// Ground truth with shape `[batch_size, 1 | channels, height, width]`.
    pub targets: Tensor<B, 4>,
}
