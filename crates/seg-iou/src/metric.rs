//! Mean IoU as a Burn training metric.
//!
//! Each update evaluates one batch with [`MeanIoU`](crate::MeanIoU) and folds
//! the score into a [`NumericMetricState`] weighted by the batch size.

use core::marker::PhantomData;

use burn::{
    tensor::{backend::Backend, Tensor},
    train::metric::{
        state::{FormatOptions, NumericMetricState},
        Metric, MetricEntry, MetricMetadata, Numeric,
    },
};

use crate::{input::MeanIoUInput, iou::MeanIoUConfig};

// --- Mean IoU Metric ---

/// Mean IoU metric.
pub struct MeanIoUMetric<B: Backend> {
    state: NumericMetricState,
    config: MeanIoUConfig,
    _b: PhantomData<B>,
}

impl<B: Backend> Default for MeanIoUMetric<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> MeanIoUMetric<B> {
    /// Creates a new mean IoU metric with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MeanIoUConfig::new())
    }

    /// Creates a new mean IoU metric with a custom configuration.
    pub fn with_config(config: MeanIoUConfig) -> Self {
        Self {
            state: NumericMetricState::default(),
            config,
            _b: PhantomData,
        }
    }

    /// Scores one batch. Undefined or failed batches count as `0.0`.
    fn batch_score(&self, item: &MeanIoUInput<B>) -> f64 {
        let device = item.predictions.device();
        let score = self
            .config
            .init(item.targets.clone(), item.predictions.clone(), &device)
            .and_then(|evaluation| evaluation.evaluate());

        match score {
            Ok(score) if score.is_nan() => {
                tracing::warn!("mean IoU undefined for batch, recording 0");
                0.0
            }
            Ok(score) => score,
            Err(err) => {
                tracing::warn!(%err, "mean IoU evaluation failed, recording 0");
                0.0
            }
        }
    }
}

impl<B: Backend> Metric for MeanIoUMetric<B> {
    type Input = MeanIoUInput<B>;

    fn name(&self) -> String {
        "mIoU".to_owned()
    }

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, ..] = item.predictions.dims();
        let score = self.batch_score(item);

        self.state.update(
            score,
            batch_size,
            FormatOptions::new(self.name()).precision(5),
        )
    }

    fn clear(&mut self) {
        self.state.reset();
    }
}

impl<B: Backend> Numeric for MeanIoUMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

/// Convenience wrapper returning the mean IoU of one batch.
pub fn calculate_mean_iou<B: Backend>(
    predictions: Tensor<B, 4>,
    targets: Tensor<B, 4>,
    config: &MeanIoUConfig,
) -> f64 {
    MeanIoUMetric::<B>::with_config(config.clone())
        .batch_score(&MeanIoUInput::new(predictions, targets))
}
