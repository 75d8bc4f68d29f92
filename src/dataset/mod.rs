mod segmentation;

pub use segmentation::{
    DatasetError, InputMode, SegmentationBatch, SegmentationBatcher, SegmentationConfig,
    find_image_mask_pairs, load_segmentation_dataset,
};
