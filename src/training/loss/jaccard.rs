use std::marker::PhantomData;

use burn::prelude::*;

use super::assert_same_dims;

/// Configuration to create a [JaccardDistance].
#[derive(Config, Debug)]
pub struct JaccardDistanceConfig {
    /// Added to both sides of the ratio and used to rescale the distance, which keeps the
    /// gradient alive on empty masks.
    ///
    /// Default: 100
    #[config(default = 100.0)]
    pub smooth: f32,
}

impl JaccardDistanceConfig {
    pub fn init<B: Backend>(&self, _device: &B::Device) -> JaccardDistance<B> {
        assert!(
            self.smooth > 0.,
            "Smoothing factor of Jaccard distance must be positive. Got {}",
            self.smooth
        );
        JaccardDistance {
            smooth: self.smooth,
            _b: PhantomData,
        }
    }
}

/// Smoothed Jaccard distance between predicted probabilities and one-hot targets,
/// computed independently for every pixel over the class axis:
///
/// ```text
/// jac = (sum|t * p| + smooth) / (sum(|t| + |p|) - sum|t * p| + smooth)
/// distance = (1 - jac) * smooth
/// ```
#[derive(Module, Debug)]
pub struct JaccardDistance<B: Backend> {
    pub smooth: f32,
    _b: PhantomData<B>,
}

impl<B: Backend> JaccardDistance<B> {
    /// Shapes: predictions and targets `[batch_size, num_classes, height, width]`,
    /// output `[batch_size, height, width]`.
    pub fn forward_no_reduction(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> Tensor<B, 3> {
        assert_same_dims(&predictions, &targets);

        let intersection = (targets.clone() * predictions.clone()).abs().sum_dim(1);
        let total = (targets.abs() + predictions.abs()).sum_dim(1);
        let jaccard = (intersection.clone().add_scalar(self.smooth))
            / (total - intersection).add_scalar(self.smooth);

        jaccard
            .neg()
            .add_scalar(1.0)
            .mul_scalar(self.smooth)
            .squeeze(1)
    }

    pub fn forward(&self, predictions: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
        self.forward_no_reduction(predictions, targets).mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    #[test]
    fn identical_masks_have_zero_distance() {
        let device = Default::default();
        let loss = JaccardDistanceConfig::new().init::<TestBackend>(&device);
        let targets = Tensor::<TestBackend, 4>::from_floats(
            [[[[1.0, 0.0], [0.0, 1.0]]], [[[0.0, 1.0], [1.0, 0.0]]]],
            &device,
        );

        let output = loss.forward(targets.clone(), targets);

        output
            .into_data()
            .assert_approx_eq(&TensorData::from([0.0f32]), 4);
    }

    #[test]
    fn disjoint_masks_with_unit_smoothing() {
        let device = Default::default();
        let loss = JaccardDistanceConfig::new()
            .with_smooth(1.0)
            .init::<TestBackend>(&device);
        let predictions = Tensor::<TestBackend, 4>::from_floats([[[[1.0]], [[0.0]]]], &device);
        let targets = Tensor::<TestBackend, 4>::from_floats([[[[0.0]], [[1.0]]]], &device);

        // jac = (0 + 1) / (2 - 0 + 1)
        let output = loss.forward_no_reduction(predictions, targets);
        let expected = TensorData::from([[[2.0f32 / 3.0]]]);

        output.into_data().assert_approx_eq(&expected, 4);
    }

    #[test]
    fn partial_overlap_uses_default_smoothing() {
        let device = Default::default();
        let loss = JaccardDistanceConfig::new().init::<TestBackend>(&device);
        let predictions = Tensor::<TestBackend, 4>::from_floats([[[[0.5]], [[0.5]]]], &device);
        let targets = Tensor::<TestBackend, 4>::from_floats([[[[1.0]], [[0.0]]]], &device);

        let output = loss.forward(predictions, targets);
        let expected = TensorData::from([(1.0f32 - 100.5 / 101.5) * 100.0]);

        output.into_data().assert_approx_eq(&expected, 3);
    }
}
