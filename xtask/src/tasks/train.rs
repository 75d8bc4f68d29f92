use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use burn::data::dataloader::Dataset;
use burn::record::CompactRecorder;
use burn::train::metric::LossMetric;
use burn::{
    backend::{Autodiff, NdArray, Wgpu, wgpu::WgpuDevice},
    data::dataloader::DataLoaderBuilder,
    optim::AdamConfig,
    prelude::*,
    train::LearnerBuilder,
};
use clap::Args;
use unet_jaccard::{
    InputMode, SegmentationConfig, UNetConfig,
    dataset::{SegmentationBatcher, load_segmentation_dataset},
    training::JaccardIndexMetric,
};

#[derive(Args)]
pub struct TrainArgs {
    #[arg(short, long)]
    pub train_data_dir: PathBuf,

    #[arg(short, long)]
    pub valid_data_dir: PathBuf,

    #[arg(short, long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(short, long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(short, long, default_value_t = 0.0003)]
    pub lr: f64,

    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    #[arg(long, action)]
    pub save_checkpoints: bool,

    #[arg(short, long, default_value = "artifacts")]
    pub artifact_dir: PathBuf,

    /// Replace the artifact directory when it already holds files.
    #[arg(long, action)]
    pub overwrite: bool,

    #[arg(long, value_delimiter = ',', default_value = "64,128,256,512")]
    pub filters: Vec<usize>,

    #[arg(long, default_value_t = 3)]
    pub kernel_size: usize,

    #[arg(long, action)]
    pub batch_norm: bool,

    #[arg(long, default_value_t = 3)]
    pub num_classes: usize,

    /// Jaccard weight of the loss; the cross-entropy gets `1 - alpha`.
    #[arg(long, default_value_t = 0.5)]
    pub alpha: f32,

    #[arg(long, default_value_t = 256)]
    pub image_size: usize,

    #[arg(long, short, action)]
    pub grayscale: bool,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

fn create_artifact_dir(artifact_dir: &Path, overwrite: bool) -> Result<()> {
    if artifact_dir.exists() {
        let mut entries = std::fs::read_dir(artifact_dir)
            .with_context(|| format!("Failed to read {}", artifact_dir.display()))?;

        if entries.next().is_some() {
            if !overwrite {
                bail!(
                    "{} is not empty, pass --overwrite to replace it",
                    artifact_dir.display()
                );
            }
            tracing::warn!("Removing previous artifacts in {}", artifact_dir.display());
            std::fs::remove_dir_all(artifact_dir)
                .with_context(|| format!("Failed to remove {}", artifact_dir.display()))?;
        }
    }

    std::fs::create_dir_all(artifact_dir)
        .with_context(|| format!("Failed to create {}", artifact_dir.display()))
}

pub fn run(args: &TrainArgs) -> Result<()> {
    type MyBackend = Wgpu<f32, i32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    create_artifact_dir(&args.artifact_dir, args.overwrite)?;

    tracing::info!("Initializing device...");
    let device = WgpuDevice::default();

    MyAutodiffBackend::seed(args.seed);

    let input_mode = if args.grayscale {
        InputMode::Grayscale
    } else {
        InputMode::Rgb
    };

    let model_config = UNetConfig::new(
        input_mode.channels(),
        args.num_classes,
        args.filters.clone(),
    )
    .with_kernel_size(args.kernel_size)
    .with_batch_norm(args.batch_norm)
    .with_loss_alpha(args.alpha);

    let image_size = [args.image_size, args.image_size];
    let plan = model_config.plan()?;
    plan.check_input_size(image_size)?;

    let seg_config = SegmentationConfig::new(args.num_classes, input_mode, image_size);

    let train_dataset = load_segmentation_dataset(&args.train_data_dir, &seg_config)
        .context("Failed to load training dataset")?;
    tracing::info!("Loaded {} samples (training dataset)", train_dataset.len());

    let valid_dataset = load_segmentation_dataset(&args.valid_data_dir, &seg_config)
        .context("Failed to load validation dataset")?;
    tracing::info!("Loaded {} samples (validation dataset)", valid_dataset.len());

    let batcher_train =
        SegmentationBatcher::<MyAutodiffBackend>::new(device.clone(), seg_config.clone());
    let batcher_valid = SegmentationBatcher::<MyBackend>::new(device.clone(), seg_config.clone());

    tracing::info!(
        "Building dataloaders with batch size {}...",
        args.batch_size
    );
    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(args.batch_size)
        .num_workers(args.num_workers)
        .shuffle(args.seed)
        .build(train_dataset);

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
        .batch_size(args.batch_size)
        .num_workers(args.num_workers)
        .build(valid_dataset);

    tracing::info!(
        "Creating U-Net with filters {:?} ({} parameters)...",
        args.filters,
        plan.summary(image_size)?.total_params()
    );
    let model = model_config.try_init::<MyAutodiffBackend>(&device)?;

    let config_path = args.artifact_dir.join("config.json");
    model_config
        .save(&config_path)
        .with_context(|| format!("Failed to save {}", config_path.display()))?;

    tracing::info!("Initializing Adam optimizer with learning rate {}...", args.lr);
    let optimizer = AdamConfig::new().init();

    let mut learner = LearnerBuilder::new(&args.artifact_dir)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(JaccardIndexMetric::<NdArray>::new())
        .metric_valid_numeric(JaccardIndexMetric::<NdArray>::new())
        .devices(vec![device.clone()])
        .num_epochs(args.epochs)
        .summary();

    if args.save_checkpoints {
        learner = learner.with_file_checkpointer(CompactRecorder::new());
    }

    let learner = learner.build(model, optimizer, args.lr);

    let model_trained = learner.fit(dataloader_train, dataloader_valid);

    let model_path = args.artifact_dir.join("model");
    tracing::info!("Saving model to {}...", model_path.display());
    model_trained
        .save_file(&model_path, &CompactRecorder::new())
        .map_err(|err| anyhow::anyhow!("Failed to save trained model: {err:?}"))?;

    tracing::info!("Training completed successfully!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir()
                .join(format!("xtask-artifacts-{}-{}", name, std::process::id()));
            let _ = std::fs::remove_dir_all(&dir);
            Self(dir)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn missing_artifact_dir_is_created() {
        let dir = TempDir::new("missing");

        create_artifact_dir(&dir.0, false).unwrap();

        assert!(dir.0.is_dir());
    }

    #[test]
    fn non_empty_artifact_dir_is_kept_without_overwrite() {
        let dir = TempDir::new("keep");
        std::fs::create_dir_all(&dir.0).unwrap();
        let previous = dir.0.join("model.mpk");
        std::fs::write(&previous, "weights").unwrap();

        let err = create_artifact_dir(&dir.0, false).unwrap_err();

        assert!(err.to_string().contains("--overwrite"));
        assert!(previous.exists());
    }

    #[test]
    fn non_empty_artifact_dir_is_replaced_with_overwrite() {
        let dir = TempDir::new("replace");
        std::fs::create_dir_all(&dir.0).unwrap();
        let previous = dir.0.join("model.mpk");
        std::fs::write(&previous, "weights").unwrap();

        create_artifact_dir(&dir.0, true).unwrap();

        assert!(dir.0.is_dir());
        assert!(!previous.exists());
    }
}
