mod blocks;
mod plan;
mod summary;
mod unet;

pub use blocks::{Bottom, ConvBlock, ConvBlockConfig, DownPass, UpPass};
pub use plan::{BottomStage, DownStage, UNetConfig, UNetPlan, UpStage};
pub use summary::{LayerKind, LayerSummary, ModelSummary};
pub use unet::UNet;
