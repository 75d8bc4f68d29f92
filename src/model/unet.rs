use burn::{
    module::Ignored,
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
    tensor::activation::softmax,
};

#[cfg(feature = "training")]
use crate::{
    dataset::SegmentationBatch,
    training::{SegmentationOutput, loss::JaccardCrossEntropyLossConfig},
};
#[cfg(feature = "training")]
use burn::{
    tensor::backend::AutodiffBackend,
    train::{TrainOutput, TrainStep, ValidStep},
};

use super::blocks::{Bottom, DownPass, UpPass};
use super::plan::{UNetConfig, UNetPlan};
use crate::error::UNetError;

#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    down: Vec<DownPass<B>>,
    bottom: Bottom<B>,
    up: Vec<UpPass<B>>,
    conv_1x1: Conv2d<B>,
    /// Jaccard weight of the training loss.
    loss_alpha: f32,
    plan: Ignored<UNetPlan>,
}

impl UNetConfig {
    /// Builds the network.
    ///
    /// # Panics
    ///
    /// When the configuration cannot be wired, see [UNetConfig::try_init].
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet<B> {
        match self.try_init(device) {
            Ok(model) => model,
            Err(err) => panic!("Invalid U-Net configuration: {err}"),
        }
    }

    pub fn try_init<B: Backend>(&self, device: &B::Device) -> Result<UNet<B>, UNetError> {
        let plan = self.plan()?;
        let kernel_size = plan.kernel_size;

        let down = plan
            .down
            .iter()
            .map(|stage| stage.init(kernel_size, plan.batch_norm, &self.initializer, device))
            .collect();
        let bottom = plan.bottom.init(kernel_size, &self.initializer, device);
        let up = plan
            .up
            .iter()
            .map(|stage| stage.init(kernel_size, plan.batch_norm, &self.initializer, device))
            .collect();
        let conv_1x1 = Conv2dConfig::new([plan.head_in_channels(), plan.num_classes], [1, 1])
            .with_initializer(self.initializer.clone())
            .init(device);

        Ok(UNet {
            down,
            bottom,
            up,
            conv_1x1,
            loss_alpha: self.loss_alpha,
            plan: Ignored(plan),
        })
    }
}

impl<B: Backend> UNet<B> {
    /// Class probabilities `[batch, num_classes, height, width]` for images
    /// `[batch, input_channels, height, width]`.
    ///
    /// Height and width must be multiples of `2^depth`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = images;
        let mut copies = Vec::with_capacity(self.down.len());

        for pass in &self.down {
            let (pooled, copy) = pass.forward(x);
            copies.push(copy);
            x = pooled;
        }

        x = self.bottom.forward(x);

        for (pass, copy) in self.up.iter().zip(copies.into_iter().rev()) {
            x = pass.forward(x, copy);
        }

        softmax(self.conv_1x1.forward(x), 1)
    }

    pub fn plan(&self) -> &UNetPlan {
        &self.plan.0
    }

    pub fn num_classes(&self) -> usize {
        self.plan.0.num_classes
    }

    #[cfg(feature = "training")]
    pub fn forward_segmentation(&self, item: SegmentationBatch<B>) -> SegmentationOutput<B> {
        let targets = item.masks;
        let output = self.forward(item.images);

        let loss = JaccardCrossEntropyLossConfig::new()
            .with_alpha(self.loss_alpha)
            .init(&output.device())
            .forward_indices(output.clone(), targets.clone());

        SegmentationOutput {
            loss,
            output,
            targets,
        }
    }
}

#[cfg(feature = "training")]
impl<B: AutodiffBackend> TrainStep<SegmentationBatch<B>, SegmentationOutput<B>> for UNet<B> {
    fn step(&self, batch: SegmentationBatch<B>) -> TrainOutput<SegmentationOutput<B>> {
        let item = self.forward_segmentation(batch);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

#[cfg(feature = "training")]
impl<B: Backend> ValidStep<SegmentationBatch<B>, SegmentationOutput<B>> for UNet<B> {
    fn step(&self, batch: SegmentationBatch<B>) -> SegmentationOutput<B> {
        self.forward_segmentation(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::Distribution;

    fn small_config() -> UNetConfig {
        UNetConfig::new(1, 3, vec![4, 8])
    }

    #[test]
    fn output_matches_input_resolution() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random([2, 1, 8, 12], Distribution::Default, &device);

        let output = model.forward(images);

        assert_eq!(output.dims(), [2, 3, 8, 12]);
    }

    #[test]
    fn output_is_a_distribution_over_classes() {
        let device = Default::default();
        let model = small_config()
            .with_batch_norm(true)
            .init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random([1, 1, 8, 8], Distribution::Default, &device);

        let sums = model.forward(images).sum_dim(1);
        let expected = Tensor::<TestBackend, 4>::ones([1, 1, 8, 8], &device);

        sums.into_data().assert_approx_eq(&expected.into_data(), 4);
    }

    #[test]
    fn parameter_count_matches_summary() {
        let device = Default::default();
        let config = UNetConfig::new(2, 3, vec![4, 8, 16]).with_kernel_size(5);
        let model = config.init::<TestBackend>(&device);
        let summary = model.plan().summary([16, 16]).unwrap();

        assert_eq!(model.num_params(), summary.total_params());
    }

    #[test]
    fn try_init_reports_invalid_config() {
        let device = Default::default();
        let result = UNetConfig::new(1, 3, vec![]).try_init::<TestBackend>(&device);

        assert!(matches!(result, Err(UNetError::EmptyFilterList)));
    }

    #[test]
    #[should_panic(expected = "Invalid U-Net configuration")]
    fn init_panics_on_invalid_config() {
        let device = Default::default();
        let _ = UNetConfig::new(1, 3, vec![8])
            .with_kernel_size(2)
            .init::<TestBackend>(&device);
    }

    #[cfg(feature = "training")]
    fn batch<B: Backend>(device: &B::Device) -> SegmentationBatch<B> {
        SegmentationBatch {
            images: Tensor::random([1, 1, 4, 4], Distribution::Default, device),
            masks: Tensor::from_ints(
                [[[[0, 1, 2, 0], [1, 1, 2, 2], [0, 0, 1, 2], [2, 1, 0, 0]]]],
                device,
            ),
        }
    }

    #[cfg(feature = "training")]
    #[test]
    fn train_step_backpropagates_into_every_parameter() {
        type AutodiffBackend = burn::backend::Autodiff<TestBackend>;

        let device = Default::default();
        let model = small_config().init::<AutodiffBackend>(&device);
        let batch = batch::<AutodiffBackend>(&device);
        let masks = batch.masks.clone();

        let output = TrainStep::step(&model, batch);

        assert_eq!(output.item.loss.dims(), [1]);
        assert_eq!(output.item.output.dims(), [1, 3, 4, 4]);
        output
            .item
            .targets
            .into_data()
            .assert_eq(&masks.into_data(), true);
        // Weight and bias of 13 convolutions: 5 conv blocks, 2 upsamples and the head.
        assert_eq!(output.grads.len(), 26);
    }

    #[cfg(feature = "training")]
    #[test]
    fn valid_step_uses_configured_loss_alpha() {
        use crate::training::JaccardCrossEntropyLoss;

        let device = Default::default();
        let batch = batch::<TestBackend>(&device);
        let mut losses = Vec::new();

        for alpha in [0.0, 1.0] {
            let model = small_config()
                .with_loss_alpha(alpha)
                .init::<TestBackend>(&device);
            let output = ValidStep::step(&model, batch.clone());

            let expected: JaccardCrossEntropyLoss<TestBackend> =
                JaccardCrossEntropyLossConfig::new()
                    .with_alpha(alpha)
                    .init(&device);
            let expected = expected.forward_indices(output.output.clone(), output.targets.clone());
            output
                .loss
                .clone()
                .into_data()
                .assert_approx_eq(&expected.into_data(), 5);
            losses.push(output.loss.into_scalar());
        }

        assert!((losses[0] - losses[1]).abs() > 1e-3);
    }
}
