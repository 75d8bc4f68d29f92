use thiserror::Error;

/// Errors raised while turning a [UNetConfig](crate::UNetConfig) into a network.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UNetError {
    #[error("filter list must contain at least one down pass")]
    EmptyFilterList,

    #[error("down pass {index} has zero filters")]
    ZeroFilters { index: usize },

    #[error("input channels and number of classes must be non-zero")]
    ZeroChannels,

    #[error("kernel size must be odd and non-zero for same padding, got {0}")]
    InvalidKernelSize(usize),

    #[error("up pass {index} with {filters} filters cannot upsample to {filters}/2 channels")]
    FilterTooSmall { index: usize, filters: usize },

    #[error("loss alpha must lie in [0, 1], got {0}")]
    InvalidLossAlpha(f32),

    #[error("input size {height}x{width} is not divisible by 2^{depth}")]
    IndivisibleInput {
        height: usize,
        width: usize,
        depth: usize,
    },
}
