//! Mean Intersection over Union for semantic segmentation.
//!
//! [`MeanIoU`] prepares a batch once at construction time (activation,
//! thresholding, channel squeezing, integer cast, device placement) and then
//! reduces it to a single score with [`MeanIoU::evaluate`]:
//!
//! ```text
//! IoU_c  = H[c, c] / (sum_j H[c, j] + sum_i H[i, c] - H[c, c] + eps)
//! mIoU   = mean of IoU_c over classes present in truth or prediction
//! ```

use burn::{
    config::Config,
    tensor::{backend::Backend, Int, Tensor},
};

use crate::{
    error::{SegIouError, SegIouResult},
    histogram::{pair_histogram, ConfusionHistogram},
    normalize::{squeeze_channels, ChannelPolicy},
    threshold::{activate, binarize},
};

/// Configuration for a [mean IoU evaluation](MeanIoU).
#[derive(Config, Debug)]
pub struct MeanIoUConfig {
    /// Apply softmax (multi-class) or sigmoid (binary) before thresholding.
    #[config(default = true)]
    pub activation: bool,
    /// Scores strictly above this value count as a positive decision.
    #[config(default = 0.5)]
    pub threshold: f64,
    /// Smoothing term of the Jaccard denominator. Default: 1e-10
    #[config(default = 1e-10)]
    pub epsilon: f64,
}

impl MeanIoUConfig {
    /// Checks that the threshold is finite and epsilon is positive.
    pub fn validate(&self) -> SegIouResult<()> {
        if !self.threshold.is_finite() {
            return Err(SegIouError::InvalidThreshold {
                threshold: self.threshold,
            });
        }
        if self.epsilon.is_nan() || self.epsilon <= 0.0 {
            return Err(SegIouError::InvalidEpsilon {
                epsilon: self.epsilon,
            });
        }
        Ok(())
    }

    /// Prepares a mean IoU evaluation of `predictions` against `targets`.
    pub fn init<B: Backend>(
        &self,
        targets: Tensor<B, 4>,
        predictions: Tensor<B, 4>,
        device: &B::Device,
    ) -> SegIouResult<MeanIoU<B>> {
        MeanIoU::from_config(targets, predictions, self, device)
    }
}

/// A batch of class-index maps ready for mean IoU evaluation.
#[derive(Debug, Clone)]
pub struct MeanIoU<B: Backend> {
    targets: Tensor<B, 4, Int>,
    predictions: Tensor<B, 4, Int>,
    num_classes: usize,
    threshold: f64,
    epsilon: f64,
    device: B::Device,
}

impl<B: Backend> MeanIoU<B> {
    /// Prepares an evaluation with the default [configuration](MeanIoUConfig).
    pub fn new(
        targets: Tensor<B, 4>,
        predictions: Tensor<B, 4>,
        device: &B::Device,
    ) -> SegIouResult<Self> {
        Self::from_config(targets, predictions, &MeanIoUConfig::new(), device)
    }

    /// Prepares an evaluation.
    ///
    /// The number of classes is the prediction channel count, with a single
    /// channel treated as binary foreground/background. Targets are either
    /// class indices (one channel) or one-hot maps with one channel per class.
    ///
    /// # Shapes
    ///
    /// - targets: `[batch_size, 1 | channels, height, width]`
    /// - predictions: `[batch_size, channels, height, width]`, raw scores
    ///
    /// # Errors
    ///
    /// Returns an error on invalid configuration, an empty batch, or when the
    /// batch, spatial or channel dimensions of the two tensors disagree.
    pub fn from_config(
        targets: Tensor<B, 4>,
        predictions: Tensor<B, 4>,
        config: &MeanIoUConfig,
        device: &B::Device,
    ) -> SegIouResult<Self> {
        config.validate()?;

        let [batch_size, target_channels, height, width] = targets.dims();
        let [pred_batch_size, channels, pred_height, pred_width] = predictions.dims();

        if (batch_size, height, width) != (pred_batch_size, pred_height, pred_width) {
            return Err(SegIouError::ShapeMismatch {
                expected: vec![batch_size, channels, height, width],
                actual: predictions.dims().to_vec(),
            });
        }
        if target_channels != 1 && target_channels != channels {
            return Err(SegIouError::ChannelMismatch {
                targets: target_channels,
                predictions: channels,
            });
        }
        if batch_size == 0 {
            return Err(SegIouError::EmptyBatch { dropped: 0 });
        }

        let predictions = if config.activation {
            activate(predictions)
        } else {
            predictions
        };
        let predictions = binarize(predictions, config.threshold);

        let (targets, predictions) = if channels > 1 {
            let (targets, predictions) =
                squeeze_channels(targets, predictions, ChannelPolicy::Clip)?;
            let (predictions, targets) =
                squeeze_channels(predictions, targets, ChannelPolicy::Clip)?;
            (targets, predictions)
        } else {
            (targets, predictions)
        };

        let num_classes = channels.max(2);

        tracing::debug!(
            batch_size,
            num_classes,
            height,
            width,
            threshold = config.threshold,
            "prepared mean IoU evaluation"
        );

        Ok(Self {
            targets: targets.int().to_device(device),
            predictions: predictions.int().to_device(device),
            num_classes,
            threshold: config.threshold,
            epsilon: config.epsilon,
            device: device.clone(),
        })
    }

    /// Number of classes, at least 2.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn batch_size(&self) -> usize {
        self.targets.dims()[0]
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Class-index maps of the targets, `[batch_size, 1, height, width]`.
    pub fn targets(&self) -> Tensor<B, 4, Int> {
        self.targets.clone()
    }

    /// Class-index maps of the predictions, `[batch_size, 1, height, width]`.
    pub fn predictions(&self) -> Tensor<B, 4, Int> {
        self.predictions.clone()
    }

    /// Sums the per-image confusion histograms of the batch on the device.
    pub fn histogram_tensor(&self) -> Tensor<B, 2, Int> {
        let [batch_size, ..] = self.targets.dims();
        let truth = self.targets.clone().flatten::<2>(1, 3);
        let pred = self.predictions.clone().flatten::<2>(1, 3);

        (0..batch_size).fold(
            Tensor::zeros([self.num_classes, self.num_classes], &self.device),
            |histogram, index| {
                let truth = truth.clone().narrow(0, index, 1).flatten::<1>(0, 1);
                let pred = pred.clone().narrow(0, index, 1).flatten::<1>(0, 1);
                histogram + pair_histogram(truth, pred, self.num_classes)
            },
        )
    }

    /// The batch confusion histogram on the host.
    pub fn histogram(&self) -> SegIouResult<ConfusionHistogram> {
        ConfusionHistogram::from_tensor(self.histogram_tensor())
    }

    /// Per-class Jaccard scores, `None` for classes absent from both maps.
    pub fn class_iou(&self) -> SegIouResult<Vec<Option<f64>>> {
        Ok(self.histogram()?.class_iou(self.epsilon))
    }

    /// Mean IoU over the classes with a defined score.
    ///
    /// `NaN` when no class is defined, which only happens when no target pixel
    /// carries a valid class index.
    pub fn evaluate(&self) -> SegIouResult<f64> {
        let histogram = self.histogram()?;
        let score = histogram.mean_iou(self.epsilon);

        if score.is_nan() {
            tracing::warn!(
                num_classes = self.num_classes,
                "mean IoU is undefined: no valid target pixels in batch"
            );
        }
        Ok(score)
    }
}
