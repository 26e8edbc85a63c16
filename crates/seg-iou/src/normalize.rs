//! Channel normalization for one-hot label and prediction maps.
//!
//! Multi-channel maps are collapsed into single-channel class-index maps by
//! weighting each channel with its own index and reducing over the channel
//! axis. A pixel that is active in exactly one channel ends up with that
//! channel's index; anything else produces an index that is either clipped
//! or makes the whole image a candidate for removal, depending on the
//! [`ChannelPolicy`].

use burn::tensor::{backend::Backend, Int, Tensor};

use crate::error::{SegIouError, SegIouResult};

/// What to do with index maps that do not look like a clean one-hot encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelPolicy {
    /// Keep a pair only when its index map holds exactly as many distinct
    /// values as there are channels. Other pairs are dropped.
    #[default]
    Filter,
    /// Keep every pair and force indices above the last class to `0`.
    Clip,
}

/// Collapses `[batch, channels, height, width]` maps into class indices.
///
/// Returns the index map as `[batch, 1, height, width]`, computed as
/// `sum_c labels[:, c] * c`.
pub fn channel_indices<B: Backend>(labels: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, channels, _, _] = labels.dims();
    let weights = Tensor::<B, 1, Int>::arange(0..channels as i64, &labels.device())
        .float()
        .reshape([1, channels, 1, 1]);

    (labels * weights).sum_dim(1)
}

/// Squeezes the channels of `labels` and keeps the matching `images`.
///
/// `images` are aligned with `labels` along the batch axis and are returned
/// untouched apart from the batch filtering. Single-channel labels are
/// already index maps and both inputs are returned as-is.
///
/// # Shapes
///
/// - images: `[batch_size, image_channels, height, width]`
/// - labels: `[batch_size, channels, height, width]`
/// - output labels: `[kept, 1, height, width]` (or unchanged when `channels == 1`)
///
/// # Errors
///
/// [`SegIouError::ShapeMismatch`] when the batch sizes differ, and
/// [`SegIouError::EmptyBatch`] when [`ChannelPolicy::Filter`] keeps nothing.
pub fn squeeze_channels<B: Backend>(
    images: Tensor<B, 4>,
    labels: Tensor<B, 4>,
    policy: ChannelPolicy,
) -> SegIouResult<(Tensor<B, 4>, Tensor<B, 4>)> {
    let [batch_size, channels, _, _] = labels.dims();
    let [image_batch_size, ..] = images.dims();

    if image_batch_size != batch_size {
        return Err(SegIouError::ShapeMismatch {
            expected: vec![batch_size],
            actual: vec![image_batch_size],
        });
    }

    if channels == 1 {
        return Ok((images, labels));
    }

    let indices = channel_indices(labels);

    match policy {
        ChannelPolicy::Clip => {
            let overflow = indices.clone().greater_elem((channels - 1) as f64);
            Ok((images, indices.mask_fill(overflow, 0.0)))
        }
        ChannelPolicy::Filter => {
            let kept = full_coverage(&indices, channels);
            let dropped = batch_size - kept.len();

            if kept.is_empty() {
                return Err(SegIouError::EmptyBatch { dropped });
            }
            if dropped == 0 {
                return Ok((images, indices));
            }

            tracing::debug!(
                dropped,
                kept = kept.len(),
                channels,
                "dropping pairs without full class coverage"
            );

            let image_rows = Tensor::<B, 1, Int>::from_ints(kept.as_slice(), &images.device());
            let label_rows = Tensor::<B, 1, Int>::from_ints(kept.as_slice(), &indices.device());
            Ok((images.select(0, image_rows), indices.select(0, label_rows)))
        }
    }
}

/// Batch positions whose index map contains exactly `channels` distinct values.
fn full_coverage<B: Backend>(indices: &Tensor<B, 4>, channels: usize) -> Vec<i32> {
    let [_, _, height, width] = indices.dims();
    let pixels = height * width;
    if pixels == 0 {
        return Vec::new();
    }

    let values: Vec<f64> = indices.clone().into_data().iter::<f64>().collect();

    values
        .chunks_exact(pixels)
        .enumerate()
        .filter(|(_, image)| distinct_count(image) == channels)
        .map(|(position, _)| position as i32)
        .collect()
}

fn distinct_count(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    sorted.len()
}

#[cfg(test)]
mod tests {
    use burn::tensor::TensorData;

    use super::*;
    use crate::tests::TestBackend;

    /// Two 2x2 three-class label maps.
    ///
    /// The first has a pixel active in channels 1 and 2 (index 3, out of
    /// range) next to one pixel of every class. The second has a pixel active
    /// in channels 0 and 1 (index 1) and still shows exactly three distinct
    /// indices.
    fn overlapping_labels() -> Tensor<TestBackend, 4> {
        Tensor::from_data(
            TensorData::from([
                [
                    [[1.0, 0.0], [0.0, 0.0]],
                    [[0.0, 1.0], [0.0, 1.0]],
                    [[0.0, 0.0], [1.0, 1.0]],
                ],
                [
                    [[1.0, 1.0], [0.0, 0.0]],
                    [[1.0, 0.0], [0.0, 0.0]],
                    [[0.0, 0.0], [1.0, 1.0]],
                ],
            ]),
            &Default::default(),
        )
    }

    fn tagged_images(batch_size: usize) -> Tensor<TestBackend, 4> {
        let tags: Vec<f32> = (0..batch_size).map(|b| (b + 1) as f32 * 10.0).collect();
        Tensor::<TestBackend, 1>::from_floats(tags.as_slice(), &Default::default())
            .reshape([batch_size, 1, 1, 1])
            .repeat_dim(2, 2)
            .repeat_dim(3, 2)
    }

    #[test]
    fn squeeze_channels_single_channel_passes_through() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[0.2, 0.7], [0.9, 0.1]]]]),
            &device,
        );
        let labels = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[0.0, 1.0], [7.0, 1.0]]]]),
            &device,
        );

        for policy in [ChannelPolicy::Filter, ChannelPolicy::Clip] {
            let (out_images, out_labels) =
                squeeze_channels(images.clone(), labels.clone(), policy).unwrap();

            out_images
                .into_data()
                .assert_eq(&images.clone().into_data(), true);
            out_labels
                .into_data()
                .assert_eq(&labels.clone().into_data(), true);
        }
    }

    #[test]
    fn squeeze_channels_filter_recovers_one_hot_indices() {
        let device = Default::default();
        // Every image shows all three classes.
        let labels = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([
                [
                    [[1.0, 0.0], [0.0, 0.0]],
                    [[0.0, 1.0], [0.0, 0.0]],
                    [[0.0, 0.0], [1.0, 1.0]],
                ],
                [
                    [[0.0, 0.0], [1.0, 0.0]],
                    [[1.0, 1.0], [0.0, 0.0]],
                    [[0.0, 0.0], [0.0, 1.0]],
                ],
            ]),
            &device,
        );

        let (images, indices) =
            squeeze_channels(tagged_images(2), labels, ChannelPolicy::Filter).unwrap();

        assert_eq!(images.dims(), [2, 1, 2, 2]);
        indices.into_data().assert_eq(
            &TensorData::from([[[[0.0f32, 1.0], [2.0, 2.0]]], [[[1.0, 1.0], [0.0, 2.0]]]]),
            false,
        );
    }

    #[test]
    fn squeeze_channels_clip_zeroes_out_of_range_and_keeps_all() {
        let (images, indices) =
            squeeze_channels(tagged_images(2), overlapping_labels(), ChannelPolicy::Clip)
                .unwrap();

        assert_eq!(images.dims(), [2, 1, 2, 2]);
        indices.into_data().assert_eq(
            &TensorData::from([[[[0.0f32, 1.0], [2.0, 0.0]]], [[[1.0, 0.0], [2.0, 2.0]]]]),
            false,
        );
    }

    #[test]
    fn squeeze_channels_filter_keeps_only_exact_distinct_count() {
        let (images, indices) =
            squeeze_channels(tagged_images(2), overlapping_labels(), ChannelPolicy::Filter)
                .unwrap();

        // The first image has four distinct indices and is dropped.
        assert_eq!(indices.dims(), [1, 1, 2, 2]);
        indices.into_data().assert_eq(
            &TensorData::from([[[[1.0f32, 0.0], [2.0, 2.0]]]]),
            false,
        );
        images.into_data().assert_eq(
            &TensorData::from([[[[20.0f32, 20.0], [20.0, 20.0]]]]),
            false,
        );
    }

    #[test]
    fn squeeze_channels_filter_with_nothing_kept_is_empty_batch() {
        let device = Default::default();
        // Only two of three classes are present.
        let labels = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[
                [[1.0, 1.0], [0.0, 0.0]],
                [[0.0, 0.0], [1.0, 1.0]],
                [[0.0, 0.0], [0.0, 0.0]],
            ]]),
            &device,
        );

        let result = squeeze_channels(tagged_images(1), labels, ChannelPolicy::Filter);

        match result {
            Err(SegIouError::EmptyBatch { dropped }) => assert_eq!(dropped, 1),
            other => panic!("Expected EmptyBatch error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn squeeze_channels_batch_mismatch_is_error() {
        let result = squeeze_channels(tagged_images(1), overlapping_labels(), ChannelPolicy::Clip);

        assert!(matches!(result, Err(SegIouError::ShapeMismatch { .. })));
    }

    #[test]
    fn channel_indices_reduces_over_channel_axis() {
        let device = Default::default();
        let labels = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[1.0, 0.0]], [[0.0, 0.0]], [[0.0, 0.0]], [[0.0, 1.0]]]]),
            &device,
        );

        channel_indices(labels)
            .into_data()
            .assert_eq(&TensorData::from([[[[0.0f32, 3.0]]]]), false);
    }
}
