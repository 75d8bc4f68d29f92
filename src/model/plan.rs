//! Channel bookkeeping for the encoder/decoder.
//!
//! A [UNetPlan] is derived from a [UNetConfig] before any tensor is allocated. It records, for
//! every stage, how many channels come in, how many filters each convolution uses and which skip
//! copy each up pass concatenates. Both [UNetConfig::init] and the model summary are built from it.

use burn::prelude::*;
use nn::Initializer;

use crate::error::UNetError;

#[derive(Config, Debug)]
pub struct UNetConfig {
    /// Channels of the input image.
    pub input_channels: usize,
    /// Number of output classes, one softmax channel each.
    pub num_classes: usize,
    /// Filters of each down pass, outermost first.
    pub filter_list: Vec<usize>,
    #[config(default = "3")]
    pub kernel_size: usize,
    #[config(default = "false")]
    pub batch_norm: bool,
    #[config(default = "Initializer::XavierUniform { gain: 1.0 }")]
    pub initializer: Initializer,
    /// Weight of the Jaccard distance in the training loss; the cross-entropy gets `1 - alpha`.
    #[config(default = 0.5)]
    pub loss_alpha: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownStage {
    pub in_channels: usize,
    pub filters: usize,
}

impl DownStage {
    /// Channels of the skip copy handed to the mirrored up pass.
    pub fn copy_channels(&self) -> usize {
        self.filters
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BottomStage {
    pub in_channels: usize,
    pub filters: usize,
    pub upsample_filters: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpStage {
    pub upsampled_channels: usize,
    pub skip_channels: usize,
    pub filters: usize,
    /// `None` on the last up pass, which feeds the output head directly.
    pub upsample_filters: Option<usize>,
}

impl UpStage {
    pub fn in_channels(&self) -> usize {
        self.upsampled_channels + self.skip_channels
    }

    pub fn out_channels(&self) -> usize {
        self.upsample_filters.unwrap_or(self.filters)
    }

    pub fn is_last(&self) -> bool {
        self.upsample_filters.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UNetPlan {
    pub input_channels: usize,
    pub num_classes: usize,
    pub kernel_size: usize,
    pub batch_norm: bool,
    pub down: Vec<DownStage>,
    pub bottom: BottomStage,
    pub up: Vec<UpStage>,
}

impl UNetConfig {
    pub fn plan(&self) -> Result<UNetPlan, UNetError> {
        self.validate()?;

        let mut down = Vec::with_capacity(self.filter_list.len());
        let mut copies = Vec::with_capacity(self.filter_list.len());
        let mut channels = self.input_channels;

        for &filters in &self.filter_list {
            let stage = DownStage {
                in_channels: channels,
                filters,
            };
            copies.push(stage.copy_channels());
            down.push(stage);
            channels = filters;
        }

        let bottom_filters = channels * 2;
        let bottom = BottomStage {
            in_channels: channels,
            filters: bottom_filters,
            upsample_filters: bottom_filters / 2,
        };

        let mut filters_rev = self.filter_list.clone();
        filters_rev.reverse();
        copies.reverse();

        let num_passes = filters_rev.len();
        let mut upsampled = bottom.upsample_filters;
        let mut up = Vec::with_capacity(num_passes);

        for (i, (filters, skip)) in filters_rev.into_iter().zip(copies).enumerate() {
            let last = i + 1 == num_passes;
            let upsample_filters = (!last).then_some(filters / 2);
            let stage = UpStage {
                upsampled_channels: upsampled,
                skip_channels: skip,
                filters,
                upsample_filters,
            };
            upsampled = stage.out_channels();
            up.push(stage);
        }

        tracing::debug!(
            depth = down.len(),
            bottom_filters = bottom.filters,
            "planned U-Net wiring"
        );

        Ok(UNetPlan {
            input_channels: self.input_channels,
            num_classes: self.num_classes,
            kernel_size: self.kernel_size,
            batch_norm: self.batch_norm,
            down,
            bottom,
            up,
        })
    }

    fn validate(&self) -> Result<(), UNetError> {
        if self.filter_list.is_empty() {
            return Err(UNetError::EmptyFilterList);
        }
        if self.input_channels == 0 || self.num_classes == 0 {
            return Err(UNetError::ZeroChannels);
        }
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(UNetError::InvalidKernelSize(self.kernel_size));
        }
        if !(0.0..=1.0).contains(&self.loss_alpha) {
            return Err(UNetError::InvalidLossAlpha(self.loss_alpha));
        }
        if let Some(index) = self.filter_list.iter().position(|&f| f == 0) {
            return Err(UNetError::ZeroFilters { index });
        }
        // Every up pass but the last one (the outermost filter) halves its filters.
        let depth = self.filter_list.len();
        for (index, &filters) in self.filter_list.iter().enumerate().skip(1) {
            if filters < 2 {
                return Err(UNetError::FilterTooSmall {
                    index: depth - 1 - index,
                    filters,
                });
            }
        }

        Ok(())
    }
}

impl UNetPlan {
    pub fn depth(&self) -> usize {
        self.down.len()
    }

    pub fn output_channels(&self) -> usize {
        self.num_classes
    }

    /// Smallest spatial side the network accepts; every side must be a multiple of it.
    ///
    /// `None` when `2^depth` does not fit in a `usize`.
    pub fn min_input_side(&self) -> Option<usize> {
        u32::try_from(self.depth())
            .ok()
            .and_then(|depth| 1usize.checked_shl(depth))
    }

    pub fn check_input_size(&self, [height, width]: [usize; 2]) -> Result<(), UNetError> {
        let fits = self.min_input_side().is_some_and(|side| {
            height != 0 && width != 0 && height % side == 0 && width % side == 0
        });
        if !fits {
            return Err(UNetError::IndivisibleInput {
                height,
                width,
                depth: self.depth(),
            });
        }

        Ok(())
    }

    /// Channels reaching the output head.
    pub fn head_in_channels(&self) -> usize {
        self.up
            .last()
            .map(UpStage::out_channels)
            .unwrap_or(self.bottom.upsample_filters)
    }
}
