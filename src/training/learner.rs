use burn::{
    backend::NdArray,
    prelude::*,
    tensor::{Int, Transaction},
    train::metric::{Adaptor, ItemLazy, LossInput},
};
use derive_new::new;

use super::metrics::JaccardIndexInput;

/// Output of a training or validation step.
#[derive(new)]
pub struct SegmentationOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    /// Class probabilities `[batch_size, num_classes, height, width]`.
    pub output: Tensor<B, 4>,
    /// Class indices `[batch_size, 1, height, width]`.
    pub targets: Tensor<B, 4, Int>,
}

/// Step outputs are moved to the CPU `NdArray` backend before metrics see them.
///
/// The learner computes loss and Jaccard metrics on the synced item whatever backend trained
/// the model, so metrics are registered as `JaccardIndexMetric::<NdArray>`. The three tensors
/// are read back in one [Transaction] to avoid a device round trip per tensor.
impl<B: Backend> ItemLazy for SegmentationOutput<B> {
    type ItemSync = SegmentationOutput<NdArray>;

    fn sync(self) -> Self::ItemSync {
        let [output, loss, targets] = Transaction::default()
            .register(self.output)
            .register(self.loss)
            .register(self.targets)
            .execute()
            .try_into()
            .expect("Correct amount of tensor data");

        let device = &Default::default();

        SegmentationOutput {
            output: Tensor::from_data(output, device),
            loss: Tensor::from_data(loss, device),
            targets: Tensor::from_data(targets, device),
        }
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

impl<B: Backend> Adaptor<JaccardIndexInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> JaccardIndexInput<B> {
        JaccardIndexInput::new(self.output.clone(), self.targets.clone())
    }
}
