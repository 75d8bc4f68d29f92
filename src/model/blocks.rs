use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Initializer, Relu,
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};
use nn::PaddingConfig2d;

use super::plan::{BottomStage, DownStage, UpStage};

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(x);
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x);

        self.activation.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    input_channels: usize,
    num_filters: usize,
    #[config(default = "3")]
    kernel_size: usize,
    #[config(default = "Initializer::XavierUniform { gain: 1.0 }")]
    initializer: Initializer,
}

impl ConvBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        let kernel = [self.kernel_size, self.kernel_size];
        ConvBlock {
            conv1: Conv2dConfig::new([self.input_channels, self.num_filters], kernel)
                .with_padding(PaddingConfig2d::Same)
                .with_initializer(self.initializer.clone())
                .init(device),
            conv2: Conv2dConfig::new([self.num_filters, self.num_filters], kernel)
                .with_padding(PaddingConfig2d::Same)
                .with_initializer(self.initializer.clone())
                .init(device),
            activation: Relu::new(),
        }
    }
}

/// Padding and output padding giving a stride-2 transposed convolution an output twice
/// the input side, for an odd kernel.
fn upsample_padding(kernel_size: usize) -> ([usize; 2], [usize; 2]) {
    let padding = (kernel_size - 1) / 2;
    ([padding, padding], [1, 1])
}

fn upsample<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    initializer: &Initializer,
    device: &B::Device,
) -> ConvTranspose2d<B> {
    let (padding, padding_out) = upsample_padding(kernel_size);
    ConvTranspose2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_stride([2, 2])
        .with_padding(padding)
        .with_padding_out(padding_out)
        .with_initializer(initializer.clone())
        .init(device)
}

#[derive(Module, Debug)]
pub struct DownPass<B: Backend> {
    conv_block: ConvBlock<B>,
    norm: Option<BatchNorm<B, 2>>,
    max_pool: MaxPool2d,
}

impl<B: Backend> DownPass<B> {
    /// Returns the pooled features and the skip copy taken before normalization.
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let copy = self.conv_block.forward(x);
        let x = match &self.norm {
            Some(norm) => norm.forward(copy.clone()),
            None => copy.clone(),
        };

        (self.max_pool.forward(x), copy)
    }
}

impl DownStage {
    pub fn init<B: Backend>(
        &self,
        kernel_size: usize,
        batch_norm: bool,
        initializer: &Initializer,
        device: &B::Device,
    ) -> DownPass<B> {
        DownPass {
            conv_block: ConvBlockConfig::new(self.in_channels, self.filters)
                .with_kernel_size(kernel_size)
                .with_initializer(initializer.clone())
                .init(device),
            norm: batch_norm.then(|| BatchNormConfig::new(self.filters).init(device)),
            max_pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct Bottom<B: Backend> {
    conv_block: ConvBlock<B>,
    upsample: ConvTranspose2d<B>,
}

impl<B: Backend> Bottom<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv_block.forward(x);

        self.upsample.forward(x)
    }
}

impl BottomStage {
    pub fn init<B: Backend>(
        &self,
        kernel_size: usize,
        initializer: &Initializer,
        device: &B::Device,
    ) -> Bottom<B> {
        Bottom {
            conv_block: ConvBlockConfig::new(self.in_channels, self.filters)
                .with_kernel_size(kernel_size)
                .with_initializer(initializer.clone())
                .init(device),
            upsample: upsample(
                self.filters,
                self.upsample_filters,
                kernel_size,
                initializer,
                device,
            ),
        }
    }
}

#[derive(Module, Debug)]
pub struct UpPass<B: Backend> {
    norm: Option<BatchNorm<B, 2>>,
    conv_block: ConvBlock<B>,
    upsample: Option<ConvTranspose2d<B>>,
}

impl<B: Backend> UpPass<B> {
    pub fn forward(&self, x: Tensor<B, 4>, copy: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = Tensor::cat(vec![x, copy], 1);
        let x = match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        };
        let x = self.conv_block.forward(x);

        match &self.upsample {
            Some(upsample) => upsample.forward(x),
            None => x,
        }
    }
}

impl UpStage {
    pub fn init<B: Backend>(
        &self,
        kernel_size: usize,
        batch_norm: bool,
        initializer: &Initializer,
        device: &B::Device,
    ) -> UpPass<B> {
        UpPass {
            norm: batch_norm.then(|| BatchNormConfig::new(self.in_channels()).init(device)),
            conv_block: ConvBlockConfig::new(self.in_channels(), self.filters)
                .with_kernel_size(kernel_size)
                .with_initializer(initializer.clone())
                .init(device),
            upsample: self
                .upsample_filters
                .map(|out| upsample(self.filters, out, kernel_size, initializer, device)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    #[test]
    fn upsample_doubles_spatial_size() {
        let device = Default::default();
        for kernel_size in [1, 3, 5] {
            let layer = upsample::<TestBackend>(4, 2, kernel_size, &Initializer::Ones, &device);
            let x = Tensor::<TestBackend, 4>::ones([1, 4, 5, 7], &device);

            assert_eq!(layer.forward(x).dims(), [1, 2, 10, 14]);
        }
    }

    #[test]
    fn down_pass_keeps_copy_at_full_resolution() {
        let device = Default::default();
        let stage = DownStage {
            in_channels: 1,
            filters: 4,
        };
        let pass = stage.init::<TestBackend>(3, true, &Initializer::Ones, &device);

        let (x, copy) = pass.forward(Tensor::ones([2, 1, 8, 8], &device));

        assert_eq!(x.dims(), [2, 4, 4, 4]);
        assert_eq!(copy.dims(), [2, 4, 8, 8]);
    }

    #[test]
    fn up_pass_concatenates_copy() {
        let device = Default::default();
        let stage = UpStage {
            upsampled_channels: 6,
            skip_channels: 4,
            filters: 4,
            upsample_filters: Some(2),
        };
        let pass = stage.init::<TestBackend>(3, false, &Initializer::Ones, &device);

        let out = pass.forward(
            Tensor::ones([1, 6, 4, 4], &device),
            Tensor::ones([1, 4, 4, 4], &device),
        );

        assert_eq!(out.dims(), [1, 2, 8, 8]);
    }
}
