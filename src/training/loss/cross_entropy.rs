//! Categorical cross-entropy over probability maps.
//!
//! Unlike burn's `CrossEntropyLoss`, which consumes logits and class indices over a flat batch,
//! this loss compares a softmax output with one-hot targets pixel by pixel and keeps the spatial
//! layout, so it can be blended with [JaccardDistance](super::JaccardDistance).

use std::marker::PhantomData;

use burn::{
    module::{Content, DisplaySettings, ModuleDisplay},
    prelude::*,
};

use super::assert_same_dims;

/// Configuration to create a [CategoricalCrossEntropy] using the [init function](CategoricalCrossEntropyConfig::init).
#[derive(Config, Debug)]
pub struct CategoricalCrossEntropyConfig {
    /// Probabilities are clipped to `[epsilon, 1 - epsilon]` before taking the logarithm.
    ///
    /// Default: 1e-7
    #[config(default = 1e-7)]
    pub epsilon: f32,
}

impl CategoricalCrossEntropyConfig {
    pub fn init<B: Backend>(&self, _device: &B::Device) -> CategoricalCrossEntropy<B> {
        self.assertions();
        CategoricalCrossEntropy {
            epsilon: self.epsilon,
            _b: PhantomData,
        }
    }

    fn assertions(&self) {
        assert!(
            self.epsilon > 0. && self.epsilon < 0.5,
            "Epsilon of categorical cross-entropy should be in interval (0, 0.5). Got {}",
            self.epsilon
        );
    }
}

/// Per-pixel categorical cross-entropy `-sum_c y_true * ln(y_pred)`.
///
/// Should be created using [CategoricalCrossEntropyConfig].
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct CategoricalCrossEntropy<B: Backend> {
    pub epsilon: f32,
    _b: PhantomData<B>,
}

impl<B: Backend> ModuleDisplay for CategoricalCrossEntropy<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content.add("epsilon", &self.epsilon).optional()
    }
}

impl<B: Backend> CategoricalCrossEntropy<B> {
    /// Compute the loss for every pixel.
    ///
    /// # Shapes
    ///
    /// - predictions: `[batch_size, num_classes, height, width]` (probabilities)
    /// - targets: `[batch_size, num_classes, height, width]` (one-hot)
    /// - output: `[batch_size, height, width]`
    pub fn forward_no_reduction(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> Tensor<B, 3> {
        assert_same_dims(&predictions, &targets);

        // Predictions that do not sum to one are rescaled first.
        let probs = predictions.clone() / predictions.sum_dim(1);
        let log_probs = probs.clamp(self.epsilon, 1.0 - self.epsilon).log();

        (targets * log_probs).sum_dim(1).neg().squeeze(1)
    }

    /// Mean loss over every pixel of the batch.
    pub fn forward(&self, predictions: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
        self.forward_no_reduction(predictions, targets).mean()
    }
}
