pub mod learner;
pub mod loss;
pub mod metrics;

pub use learner::SegmentationOutput;
pub use loss::{JaccardCrossEntropyLoss, JaccardCrossEntropyLossConfig, one_hot_targets};
pub use metrics::{JaccardIndexInput, JaccardIndexMetric, mean_jaccard_index};
