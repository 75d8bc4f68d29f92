use std::fmt;

use derive_new::new;

use super::plan::UNetPlan;
use crate::error::UNetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Input,
    Conv2d,
    BatchNorm,
    MaxPool2d,
    ConvTranspose2d,
    Concatenate,
    Softmax,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Input => "Input",
            LayerKind::Conv2d => "Conv2d",
            LayerKind::BatchNorm => "BatchNorm",
            LayerKind::MaxPool2d => "MaxPool2d",
            LayerKind::ConvTranspose2d => "ConvTranspose2d",
            LayerKind::Concatenate => "Concatenate",
            LayerKind::Softmax => "Softmax",
        };
        f.write_str(name)
    }
}

/// One row of a [ModelSummary]. Shapes are `[channels, height, width]`, batch excluded.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    pub name: String,
    pub kind: LayerKind,
    pub output_shape: [usize; 3],
    pub trainable_params: usize,
    pub non_trainable_params: usize,
}

impl LayerSummary {
    pub fn params(&self) -> usize {
        self.trainable_params + self.non_trainable_params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSummary {
    pub layers: Vec<LayerSummary>,
}

impl ModelSummary {
    pub fn total_params(&self) -> usize {
        self.layers.iter().map(LayerSummary::params).sum()
    }

    pub fn trainable_params(&self) -> usize {
        self.layers.iter().map(|l| l.trainable_params).sum()
    }

    pub fn non_trainable_params(&self) -> usize {
        self.layers.iter().map(|l| l.non_trainable_params).sum()
    }

    pub fn output_shape(&self) -> Option<[usize; 3]> {
        self.layers.last().map(|l| l.output_shape)
    }
}

fn conv_params(kernel_size: usize, in_channels: usize, out_channels: usize) -> usize {
    kernel_size * kernel_size * in_channels * out_channels + out_channels
}

struct SummaryBuilder {
    kernel_size: usize,
    shape: [usize; 3],
    layers: Vec<LayerSummary>,
}

impl SummaryBuilder {
    fn push(&mut self, name: String, kind: LayerKind, trainable: usize, non_trainable: usize) {
        self.layers.push(LayerSummary::new(
            name,
            kind,
            self.shape,
            trainable,
            non_trainable,
        ));
    }

    fn conv(&mut self, name: String, filters: usize) {
        let params = conv_params(self.kernel_size, self.shape[0], filters);
        self.shape[0] = filters;
        self.push(name, LayerKind::Conv2d, params, 0);
    }

    fn batch_norm(&mut self, name: String) {
        let channels = self.shape[0];
        self.push(name, LayerKind::BatchNorm, 2 * channels, 2 * channels);
    }

    fn max_pool(&mut self, name: String) {
        self.shape[1] /= 2;
        self.shape[2] /= 2;
        self.push(name, LayerKind::MaxPool2d, 0, 0);
    }

    fn upsample(&mut self, name: String, filters: usize) {
        let params = conv_params(self.kernel_size, self.shape[0], filters);
        self.shape = [filters, self.shape[1] * 2, self.shape[2] * 2];
        self.push(name, LayerKind::ConvTranspose2d, params, 0);
    }

    fn concat(&mut self, name: String, channels: usize) {
        self.shape[0] += channels;
        self.push(name, LayerKind::Concatenate, 0, 0);
    }
}

impl UNetPlan {
    /// Lists every layer of the network in execution order for an input of `input_size`
    /// (`[height, width]`).
    pub fn summary(&self, input_size: [usize; 2]) -> Result<ModelSummary, UNetError> {
        self.check_input_size(input_size)?;

        let [height, width] = input_size;
        let mut builder = SummaryBuilder {
            kernel_size: self.kernel_size,
            shape: [self.input_channels, height, width],
            layers: Vec::new(),
        };
        builder.push("input".to_string(), LayerKind::Input, 0, 0);

        for (i, stage) in self.down.iter().enumerate() {
            let prefix = format!("down{}", i + 1);
            builder.conv(format!("{prefix}/conv1"), stage.filters);
            builder.conv(format!("{prefix}/conv2"), stage.filters);
            if self.batch_norm {
                builder.batch_norm(format!("{prefix}/norm"));
            }
            builder.max_pool(format!("{prefix}/pool"));
        }

        builder.conv("bottom/conv1".to_string(), self.bottom.filters);
        builder.conv("bottom/conv2".to_string(), self.bottom.filters);
        builder.upsample("bottom/upsample".to_string(), self.bottom.upsample_filters);

        for (i, stage) in self.up.iter().enumerate() {
            let prefix = format!("up{}", i + 1);
            builder.concat(format!("{prefix}/concat"), stage.skip_channels);
            if self.batch_norm {
                builder.batch_norm(format!("{prefix}/norm"));
            }
            builder.conv(format!("{prefix}/conv1"), stage.filters);
            builder.conv(format!("{prefix}/conv2"), stage.filters);
            if let Some(filters) = stage.upsample_filters {
                builder.upsample(format!("{prefix}/upsample"), filters);
            }
        }

        let params = conv_params(1, builder.shape[0], self.num_classes);
        builder.shape[0] = self.num_classes;
        builder.push("head/conv1x1".to_string(), LayerKind::Conv2d, params, 0);
        builder.push("head/softmax".to_string(), LayerKind::Softmax, 0, 0);

        Ok(ModelSummary {
            layers: builder.layers,
        })
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(78);
        writeln!(f, "{:<34}{:<28}{:>16}", "Layer (type)", "Output Shape", "Param #")?;
        writeln!(f, "{rule}")?;
        for layer in &self.layers {
            let [c, h, w] = layer.output_shape;
            writeln!(
                f,
                "{:<34}{:<28}{:>16}",
                format!("{} ({})", layer.name, layer.kind),
                format!("(None, {c}, {h}, {w})"),
                layer.params()
            )?;
        }
        writeln!(f, "{rule}")?;
        writeln!(f, "Total params: {}", self.total_params())?;
        writeln!(f, "Trainable params: {}", self.trainable_params())?;
        write!(f, "Non-trainable params: {}", self.non_trainable_params())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UNetConfig;

    fn reference_plan(batch_norm: bool) -> UNetPlan {
        UNetConfig::new(1, 3, vec![64, 128, 256, 512])
            .with_batch_norm(batch_norm)
            .plan()
            .unwrap()
    }

    #[test]
    fn reference_network_parameter_count() {
        let summary = reference_plan(false).summary([256, 256]).unwrap();

        assert_eq!(summary.total_params(), 34_512_323);
        assert_eq!(summary.non_trainable_params(), 0);
        assert_eq!(summary.output_shape(), Some([3, 256, 256]));
    }

    #[test]
    fn bottom_runs_at_lowest_resolution() {
        let summary = reference_plan(false).summary([256, 256]).unwrap();
        let bottom = summary
            .layers
            .iter()
            .find(|l| l.name == "bottom/conv2")
            .unwrap();
        let upsample = summary
            .layers
            .iter()
            .find(|l| l.name == "bottom/upsample")
            .unwrap();

        assert_eq!(bottom.output_shape, [1024, 16, 16]);
        assert_eq!(upsample.output_shape, [512, 32, 32]);
    }

    #[test]
    fn concatenations_restore_skip_resolution() {
        let summary = reference_plan(false).summary([128, 64]).unwrap();
        let shapes: Vec<_> = summary
            .layers
            .iter()
            .filter(|l| l.kind == LayerKind::Concatenate)
            .map(|l| l.output_shape)
            .collect();

        assert_eq!(
            shapes,
            vec![
                [1024, 16, 8],
                [512, 32, 16],
                [256, 64, 32],
                [128, 128, 64]
            ]
        );
    }

    #[test]
    fn batch_norm_adds_non_trainable_statistics() {
        let summary = reference_plan(true).summary([256, 256]).unwrap();
        // Down norms see 64+128+256+512 channels, up norms see twice that.
        let channels = 960 + 2 * 960;

        assert_eq!(summary.non_trainable_params(), 2 * channels);
        assert_eq!(summary.trainable_params(), 34_512_323 + 2 * channels);
    }

    #[test]
    fn rejects_indivisible_input() {
        let err = reference_plan(false).summary([100, 256]).unwrap_err();

        assert_eq!(
            err,
            UNetError::IndivisibleInput {
                height: 100,
                width: 256,
                depth: 4
            }
        );
    }

    #[test]
    fn display_lists_totals() {
        let summary = UNetConfig::new(1, 2, vec![4])
            .plan()
            .unwrap()
            .summary([4, 4])
            .unwrap();
        let text = summary.to_string();

        assert!(text.starts_with("Layer (type)"));
        assert!(text.contains("down1/pool (MaxPool2d)"));
        assert!(text.contains("(None, 2, 4, 4)"));
        assert!(text.ends_with("Non-trainable params: 0"));
    }
}
