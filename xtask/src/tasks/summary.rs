use anyhow::Result;
use clap::Args;
use unet_jaccard::UNetConfig;

#[derive(Args)]
pub struct SummaryArgs {
    #[arg(long, default_value_t = 256)]
    pub height: usize,

    #[arg(long, default_value_t = 256)]
    pub width: usize,

    #[arg(long, default_value_t = 1)]
    pub channels: usize,

    #[arg(long, default_value_t = 3)]
    pub num_classes: usize,

    #[arg(long, value_delimiter = ',', default_value = "64,128,256,512")]
    pub filters: Vec<usize>,

    #[arg(long, default_value_t = 3)]
    pub kernel_size: usize,

    #[arg(long, action)]
    pub batch_norm: bool,
}

impl SummaryArgs {
    pub fn config(&self) -> UNetConfig {
        UNetConfig::new(self.channels, self.num_classes, self.filters.clone())
            .with_kernel_size(self.kernel_size)
            .with_batch_norm(self.batch_norm)
    }
}

pub fn run(args: &SummaryArgs) -> Result<()> {
    let plan = args.config().plan()?;
    let summary = plan.summary([args.height, args.width])?;

    println!("{summary}");
    Ok(())
}
