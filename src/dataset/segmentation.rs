use std::path::{Path, PathBuf};

use burn::data::dataset::vision::{
    Annotation, ImageDatasetItem, ImageFolderDataset, ImageLoaderError, PixelDepth,
};
use burn::{data::dataloader::batcher::Batcher, prelude::*};
use thiserror::Error;

#[derive(Config, Debug, PartialEq, Eq)]
pub enum InputMode {
    Grayscale,
    Rgb,
}

impl InputMode {
    pub fn channels(&self) -> usize {
        match self {
            InputMode::Grayscale => 1,
            InputMode::Rgb => 3,
        }
    }
}

#[derive(Config, Debug)]
pub struct SegmentationConfig {
    pub num_classes: usize,
    pub input_mode: InputMode,
    /// `[height, width]` of every image and mask.
    pub image_size: [usize; 2],
    pub class_names: Option<Vec<String>>,
}

impl SegmentationConfig {
    /// Configured class names, or `class_0`, `class_1`, ...
    pub fn class_names(&self) -> Vec<String> {
        self.class_names.clone().unwrap_or_else(|| {
            (0..self.num_classes)
                .map(|i| format!("class_{}", i))
                .collect()
        })
    }
}

#[derive(Clone)]
pub struct SegmentationBatcher<B: Backend> {
    device: B::Device,
    config: SegmentationConfig,
}

impl<B: Backend> SegmentationBatcher<B> {
    pub fn new(device: B::Device, config: SegmentationConfig) -> Self {
        Self { device, config }
    }

    fn pixel(pixels: &[PixelDepth], idx: usize) -> f32 {
        match pixels.get(idx) {
            Some(PixelDepth::U8(v)) => *v as f32 / 255.0,
            Some(PixelDepth::U16(v)) => *v as f32 / 65535.0,
            Some(PixelDepth::F32(v)) => *v,
            None => 0.0,
        }
    }

    /// Channel-first image `[channels, height, width]`.
    ///
    /// Dataset items keep the native channel count of the file (L8, La8, Rgb8, Rgba8, ...),
    /// interleaved per pixel. Grayscale reads the first channel; RGB reads the first three,
    /// or replicates the first channel when the item has fewer than three.
    fn image_tensor(&self, pixels: &[PixelDepth]) -> Tensor<B, 3> {
        let [height, width] = self.config.image_size;
        let channels = self.config.input_mode.channels();
        let area = height * width;

        if area == 0 || pixels.len() % area != 0 || pixels.len() < area {
            tracing::warn!(
                values = pixels.len(),
                height,
                width,
                "image size does not match the configured size, missing pixels are zero"
            );
        }
        let stride = (pixels.len() / area.max(1)).max(1);

        let mut image_data = Vec::with_capacity(channels * area);
        for c in 0..channels {
            let source = if stride >= 3 { c } else { 0 };
            for idx in 0..area {
                image_data.push(Self::pixel(pixels, idx * stride + source));
            }
        }

        Tensor::<B, 3>::from_data(
            TensorData::new(image_data, Shape::new([channels, height, width]))
                .convert::<B::FloatElem>(),
            &self.device,
        )
    }

    /// Class indices `[1, height, width]`, clamped to the last class.
    fn mask_tensor(&self, annotation: &Annotation) -> Tensor<B, 3, Int> {
        let [height, width] = self.config.image_size;
        let last_class = self.config.num_classes.saturating_sub(1);

        let mask: Vec<i32> = match annotation {
            Annotation::SegmentationMask(mask) => {
                if mask.mask.len() != height * width {
                    tracing::warn!(
                        values = mask.mask.len(),
                        height,
                        width,
                        "mask size does not match the configured size, missing pixels are background"
                    );
                }
                (0..height * width)
                    .map(|i| mask.mask.get(i).copied().unwrap_or(0).min(last_class) as i32)
                    .collect()
            }
            _ => {
                tracing::warn!("item has no segmentation mask, using background");
                vec![0; height * width]
            }
        };

        Tensor::<B, 3, Int>::from_data(
            TensorData::new(mask, Shape::new([1, height, width])).convert::<B::IntElem>(),
            &self.device,
        )
    }
}

#[derive(Clone, Debug)]
pub struct SegmentationBatch<B: Backend> {
    /// `[batch_size, channels, height, width]`
    pub images: Tensor<B, 4, Float>,
    /// `[batch_size, 1, height, width]`
    pub masks: Tensor<B, 4, Int>,
}

impl<B: Backend> Batcher<ImageDatasetItem, SegmentationBatch<B>> for SegmentationBatcher<B> {
    fn batch(&self, items: Vec<ImageDatasetItem>) -> SegmentationBatch<B> {
        let (images, masks): (Vec<_>, Vec<_>) = items
            .iter()
            .map(|item| (self.image_tensor(&item.image), self.mask_tensor(&item.annotation)))
            .unzip();

        SegmentationBatch {
            images: Tensor::stack::<4>(images, 0),
            masks: Tensor::stack::<4>(masks, 0),
        }
    }
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("no image/mask pair found under {0}")]
    Empty(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Loader(#[from] ImageLoaderError),
}

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Pairs every `root/images/<stem>.{jpg,jpeg,png}` with `root/masks/<stem>.png`.
/// Images without a mask are skipped.
pub fn find_image_mask_pairs(root: &Path) -> Result<Vec<(PathBuf, PathBuf)>, DatasetError> {
    let images_dir = root.join("images");
    let masks_dir = root.join("masks");

    for dir in [&images_dir, &masks_dir] {
        if !dir.is_dir() {
            return Err(DatasetError::MissingDirectory(dir.clone()));
        }
    }

    let mut pairs = Vec::new();
    for entry in std::fs::read_dir(&images_dir)? {
        let path = entry?.path();

        let is_image = path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    IMAGE_EXTENSIONS
                        .iter()
                        .any(|valid| valid.eq_ignore_ascii_case(ext))
                });
        if !is_image {
            continue;
        }

        if let Some(stem) = path.file_stem() {
            let mask_path = masks_dir.join(format!("{}.png", stem.to_string_lossy()));
            if mask_path.exists() {
                pairs.push((path, mask_path));
            } else {
                tracing::debug!(image = %path.display(), "skipping image without mask");
            }
        }
    }

    if pairs.is_empty() {
        return Err(DatasetError::Empty(root.to_path_buf()));
    }
    pairs.sort();

    Ok(pairs)
}

pub fn load_segmentation_dataset(
    root: &Path,
    config: &SegmentationConfig,
) -> Result<ImageFolderDataset, DatasetError> {
    let pairs = find_image_mask_pairs(root)?;
    tracing::info!(root = %root.display(), samples = pairs.len(), "loading segmentation dataset");

    Ok(ImageFolderDataset::new_segmentation_with_items(
        pairs,
        &config.class_names(),
    )?)
}
