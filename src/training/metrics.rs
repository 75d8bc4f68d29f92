use std::marker::PhantomData;

use burn::prelude::*;
use burn::train::metric::state::{FormatOptions, NumericMetricState};
use burn::train::metric::{Metric, MetricEntry, MetricMetadata, Numeric};
use derive_new::new;

/// Mean intersection-over-union of the arg-max prediction, reported in percent.
#[derive(Default)]
pub struct JaccardIndexMetric<B: Backend> {
    state: NumericMetricState,
    ignore_class: Option<usize>,
    _b: PhantomData<B>,
}

#[derive(new)]
pub struct JaccardIndexInput<B: Backend> {
    /// `[batch_size, num_classes, height, width]`
    outputs: Tensor<B, 4>,
    /// `[batch_size, 1, height, width]`
    targets: Tensor<B, 4, Int>,
}

impl<B: Backend> JaccardIndexMetric<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip a class, usually the background, when averaging.
    pub fn with_ignore_class(mut self, class: usize) -> Self {
        self.ignore_class = Some(class);
        self
    }
}

/// Mean per-class IoU. Classes absent from both prediction and target are left out of the
/// mean; `None` when no class is left.
pub fn mean_jaccard_index<B: Backend>(
    outputs: Tensor<B, 4>,
    targets: Tensor<B, 4, Int>,
    ignore_class: Option<usize>,
) -> Option<f64> {
    let [_, num_classes, _, _] = outputs.dims();
    let predictions = outputs.argmax(1);

    let mut total = 0.0;
    let mut counted = 0;

    for class in (0..num_classes).filter(|c| Some(*c) != ignore_class) {
        let target_mask = targets.clone().equal_elem(class as i64).float();
        let pred_mask = predictions.clone().equal_elem(class as i64).float();

        let intersection = (target_mask.clone() * pred_mask.clone())
            .sum()
            .into_scalar()
            .elem::<f64>();
        let union = (target_mask.sum() + pred_mask.sum())
            .into_scalar()
            .elem::<f64>()
            - intersection;

        if union > 0.0 {
            total += intersection / union;
            counted += 1;
        }
    }

    (counted > 0).then(|| total / counted as f64)
}

impl<B: Backend> Metric for JaccardIndexMetric<B> {
    type Input = JaccardIndexInput<B>;
    const NAME: &'static str = "Jaccard index";

    fn update(&mut self, input: &JaccardIndexInput<B>, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, _, _, _] = input.outputs.dims();

        let iou = mean_jaccard_index(
            input.outputs.clone(),
            input.targets.clone(),
            self.ignore_class,
        )
        .unwrap_or(0.0);

        self.state.update(
            100.0 * iou,
            batch_size,
            FormatOptions::new(Self::NAME).unit("%").precision(2),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for JaccardIndexMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}
