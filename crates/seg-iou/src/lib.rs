//! # seg-iou
//!
//! Mean Intersection over Union (Jaccard index) for semantic segmentation,
//! implemented on top of the Burn framework.
//!
//! The pipeline turns raw prediction scores and ground truth into a single
//! score:
//!
//! 1. optional softmax / sigmoid activation ([`threshold::activate`]);
//! 2. strict binary thresholding per channel ([`threshold::binarize`]);
//! 3. one-hot maps squeezed to class indices ([`squeeze_channels`]);
//! 4. per-image confusion histograms summed over the batch
//!    ([`pair_histogram`], [`ConfusionHistogram`]);
//! 5. per-class Jaccard scores averaged over the classes that occur.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use burn::prelude::*;
//! use seg_iou::{MeanIoU, MeanIoUConfig};
//!
//! # fn example<B: Backend>(device: &B::Device) -> seg_iou::SegIouResult<()> {
//! // Raw scores for 3 classes and class-index ground truth.
//! let predictions = Tensor::<B, 4>::zeros([2, 3, 64, 64], device);
//! let targets = Tensor::<B, 4>::zeros([2, 1, 64, 64], device);
//!
//! let miou = MeanIoUConfig::new()
//!     .with_threshold(0.4)
//!     .init(targets, predictions, device)?
//!     .evaluate()?;
//! println!("mIoU: {miou:.4}");
//! # Ok(())
//! # }
//! ```
//!
//! All tensors use the `[batch, channel, height, width]` layout.
//!
//! With the `train` feature, [`MeanIoUMetric`] plugs the evaluation into
//! Burn's training loop as a numeric metric.

pub mod error;
pub mod histogram;
pub mod input;
pub mod iou;
#[cfg(feature = "train")]
pub mod metric;
pub mod normalize;
pub mod threshold;

pub use error::{SegIouError, SegIouResult};
pub use histogram::{mean_of_defined, pair_histogram, ConfusionHistogram, DEFAULT_EPSILON};
pub use input::MeanIoUInput;
pub use iou::{MeanIoU, MeanIoUConfig};
#[cfg(feature = "train")]
pub use metric::{calculate_mean_iou, MeanIoUMetric};
pub use normalize::{channel_indices, squeeze_channels, ChannelPolicy};
