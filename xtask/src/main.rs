use anyhow::Result;
use clap::{Parser, Subcommand};

mod tasks;

#[derive(Parser)]
#[command(
    name = "unet-jaccard",
    about = "U-Net image segmentation with a Jaccard/cross-entropy loss",
    author,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the layer-by-layer summary of a U-Net.
    Summary(tasks::summary::SummaryArgs),
    /// Train a U-Net on an image/mask folder.
    Train(tasks::train::TrainArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("unet_jaccard=info".parse()?)
                .add_directive("xtask=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Summary(args) => tasks::summary::run(args),
        Commands::Train(args) => tasks::train::run(args),
    }
}
