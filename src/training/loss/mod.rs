mod composite;
mod cross_entropy;
mod jaccard;

pub use composite::{JaccardCrossEntropyLoss, JaccardCrossEntropyLossConfig};
pub use cross_entropy::{CategoricalCrossEntropy, CategoricalCrossEntropyConfig};
pub use jaccard::{JaccardDistance, JaccardDistanceConfig};

use burn::prelude::*;

/// Expands class indices `[batch_size, 1, height, width]` into one-hot maps
/// `[batch_size, num_classes, height, width]`.
///
/// Indices outside `0..num_classes` produce an all-zero pixel.
pub fn one_hot_targets<B: Backend>(targets: Tensor<B, 4, Int>, num_classes: usize) -> Tensor<B, 4> {
    let [_, channels, _, _] = targets.dims();
    assert_eq!(
        channels, 1,
        "Targets should have exactly 1 channel of class indices, got {}",
        channels
    );

    let planes = (0..num_classes)
        .map(|class| targets.clone().equal_elem(class as i64).float())
        .collect();

    Tensor::cat(planes, 1)
}

fn assert_same_dims<B: Backend>(predictions: &Tensor<B, 4>, targets: &Tensor<B, 4>) {
    let predictions = predictions.dims();
    let targets = targets.dims();
    assert_eq!(
        predictions, targets,
        "Shape mismatch: predictions {:?} vs targets {:?}",
        predictions, targets
    );
}
