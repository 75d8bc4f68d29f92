use burn::{
    module::{Content, DisplaySettings, ModuleDisplay},
    prelude::*,
};

use super::{
    CategoricalCrossEntropy, CategoricalCrossEntropyConfig, JaccardDistance,
    JaccardDistanceConfig, one_hot_targets,
};

/// Configuration to create a [JaccardCrossEntropyLoss] using the [init function](JaccardCrossEntropyLossConfig::init).
#[derive(Config, Debug)]
pub struct JaccardCrossEntropyLossConfig {
    /// Weight of the Jaccard distance; the cross-entropy gets `1 - alpha`.
    ///
    /// Default: 0.5
    #[config(default = 0.5)]
    pub alpha: f32,

    #[config(default = "JaccardDistanceConfig::new()")]
    pub jaccard: JaccardDistanceConfig,

    #[config(default = "CategoricalCrossEntropyConfig::new()")]
    pub cross_entropy: CategoricalCrossEntropyConfig,
}

impl JaccardCrossEntropyLossConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> JaccardCrossEntropyLoss<B> {
        self.assertions();
        JaccardCrossEntropyLoss {
            alpha: self.alpha,
            jaccard: self.jaccard.init(device),
            cross_entropy: self.cross_entropy.init(device),
        }
    }

    fn assertions(&self) {
        assert!(
            (0.0..=1.).contains(&self.alpha),
            "Alpha of Jaccard cross-entropy loss should be in interval [0, 1]. Got {}",
            self.alpha
        );
    }
}

/// Blend of the smoothed Jaccard distance and the categorical cross-entropy,
/// `alpha * jaccard + (1 - alpha) * cross_entropy`, evaluated per pixel.
///
/// Predictions are class probabilities (the softmax output of [UNet](crate::UNet)).
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct JaccardCrossEntropyLoss<B: Backend> {
    pub alpha: f32,
    pub jaccard: JaccardDistance<B>,
    pub cross_entropy: CategoricalCrossEntropy<B>,
}

impl<B: Backend> ModuleDisplay for JaccardCrossEntropyLoss<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("alpha", &self.alpha)
            .add("smooth", &self.jaccard.smooth)
            .add("epsilon", &self.cross_entropy.epsilon)
            .optional()
    }
}

impl<B: Backend> JaccardCrossEntropyLoss<B> {
    /// # Shapes
    ///
    /// - predictions: `[batch_size, num_classes, height, width]`
    /// - targets: `[batch_size, num_classes, height, width]` (one-hot)
    /// - output: `[batch_size, height, width]`
    pub fn forward_no_reduction(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> Tensor<B, 3> {
        let jaccard = self
            .jaccard
            .forward_no_reduction(predictions.clone(), targets.clone());
        let cross_entropy = self.cross_entropy.forward_no_reduction(predictions, targets);

        jaccard.mul_scalar(self.alpha) + cross_entropy.mul_scalar(1.0 - self.alpha)
    }

    /// Mean loss over every pixel of the batch.
    pub fn forward(&self, predictions: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
        let loss = self.forward_no_reduction(predictions, targets).mean();
        tracing::trace!(alpha = self.alpha, "computed Jaccard cross-entropy loss");

        loss
    }

    /// Same as [forward](Self::forward) with targets given as class indices
    /// `[batch_size, 1, height, width]`.
    pub fn forward_indices(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4, Int>,
    ) -> Tensor<B, 1> {
        let num_classes = predictions.dims()[1];
        let targets = one_hot_targets(targets, num_classes);

        self.forward(predictions, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::backend::Autodiff;

    // Two pixels: the first predicted perfectly, the second a coin flip. Both are class 0.
    fn predictions(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 4> {
        Tensor::from_floats([[[[1.0, 0.5]], [[0.0, 0.5]]]], device)
    }

    fn targets(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 4> {
        Tensor::from_floats([[[[1.0, 1.0]], [[0.0, 0.0]]]], device)
    }

    const COIN_FLIP_JACCARD: f32 = (1.0 - 100.5 / 101.5) * 100.0;
    const COIN_FLIP_XENT: f32 = std::f32::consts::LN_2;

    #[test]
    fn blends_both_terms_per_pixel() {
        let device = Default::default();
        let loss = JaccardCrossEntropyLossConfig::new().init::<TestBackend>(&device);

        let output = loss.forward_no_reduction(predictions(&device), targets(&device));
        let expected =
            TensorData::from([[[0.0f32, 0.5 * COIN_FLIP_JACCARD + 0.5 * COIN_FLIP_XENT]]]);

        output.into_data().assert_approx_eq(&expected, 3);
    }

    #[test]
    fn alpha_selects_a_single_term() {
        let device = Default::default();

        let jaccard_only = JaccardCrossEntropyLossConfig::new()
            .with_alpha(1.0)
            .init::<TestBackend>(&device)
            .forward(predictions(&device), targets(&device));
        let xent_only = JaccardCrossEntropyLossConfig::new()
            .with_alpha(0.0)
            .init::<TestBackend>(&device)
            .forward(predictions(&device), targets(&device));

        jaccard_only
            .into_data()
            .assert_approx_eq(&TensorData::from([COIN_FLIP_JACCARD / 2.0]), 3);
        xent_only
            .into_data()
            .assert_approx_eq(&TensorData::from([COIN_FLIP_XENT / 2.0]), 3);
    }

    #[test]
    fn class_indices_match_one_hot_targets() {
        let device = Default::default();
        let loss = JaccardCrossEntropyLossConfig::new().init::<TestBackend>(&device);
        let indices = Tensor::<TestBackend, 4, Int>::from_ints([[[[0, 0]]]], &device);

        let from_indices = loss.forward_indices(predictions(&device), indices);
        let from_one_hot = loss.forward(predictions(&device), targets(&device));

        from_indices
            .into_data()
            .assert_approx_eq(&from_one_hot.into_data(), 5);
    }

    #[test]
    fn produces_gradients_for_predictions() {
        type B = Autodiff<TestBackend>;
        let device = Default::default();
        let loss = JaccardCrossEntropyLossConfig::new().init::<B>(&device);
        let predictions =
            Tensor::<B, 4>::from_floats([[[[0.7, 0.2]], [[0.3, 0.8]]]], &device).require_grad();
        let targets = Tensor::<B, 4>::from_floats([[[[1.0, 0.0]], [[0.0, 1.0]]]], &device);

        let grads = loss.forward(predictions.clone(), targets).backward();
        let grad = predictions.grad(&grads).map(|g| g.dims());

        assert_eq!(grad, Some([1, 2, 1, 2]));
    }

    #[test]
    #[should_panic(expected = "Alpha of Jaccard cross-entropy loss")]
    fn rejects_alpha_out_of_range() {
        let device = Default::default();
        let _ = JaccardCrossEntropyLossConfig::new()
            .with_alpha(1.5)
            .init::<TestBackend>(&device);
    }

    #[test]
    #[should_panic(expected = "Shape mismatch")]
    fn rejects_mismatched_shapes() {
        let device = Default::default();
        let loss = JaccardCrossEntropyLossConfig::new().init::<TestBackend>(&device);

        loss.forward(
            Tensor::ones([1, 3, 2, 2], &device),
            Tensor::ones([1, 2, 2, 2], &device),
        );
    }
}
