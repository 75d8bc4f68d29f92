pub mod error;
pub mod model;

#[cfg(feature = "dataset")]
pub mod dataset;

#[cfg(feature = "training")]
pub mod training;

pub use error::UNetError;
pub use model::{ModelSummary, UNet, UNetConfig, UNetPlan};

#[cfg(feature = "dataset")]
pub use dataset::{InputMode, SegmentationConfig};

#[cfg(feature = "training")]
pub use training::{
    JaccardCrossEntropyLoss, JaccardCrossEntropyLossConfig, JaccardIndexMetric, SegmentationOutput,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray;
