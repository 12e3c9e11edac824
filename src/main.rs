// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use webcam_toy::{DeviceSpec, EffectKind};

mod cli;

#[derive(Parser)]
#[command(name = "webcam-toy")]
#[command(about = "Real-time effects between a webcam and a virtual camera")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the effects pipeline (default)
    Run(RunArgs),

    /// List effects and their key bindings
    Effects,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// JSON config file; flags given here override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Frame source: /dev/videoN or "test"
    #[arg(short, long)]
    pub source: Option<DeviceSpec>,

    /// Frame sink: /dev/videoN (v4l2loopback), "-" for stdout, "null", or a file path
    #[arg(short = 'o', long)]
    pub sink: Option<DeviceSpec>,

    /// Frame width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Frame height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Target frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Effect to append to the chain (repeatable, applied in order)
    #[arg(short, long = "effect")]
    pub effects: Vec<EffectKind>,

    /// Pixelize block size
    #[arg(long)]
    pub block_size: Option<usize>,

    /// Row offset spacing between channels
    #[arg(long)]
    pub offset_step: Option<usize>,

    /// Swap red and blue just before frames reach the sink
    #[arg(long)]
    pub reverse_channels: bool,

    /// Capture on a dedicated thread
    #[arg(long)]
    pub threaded: bool,

    /// Stop after this many ticks
    #[arg(long)]
    pub frames: Option<u64>,

    /// Ignore keyboard input
    #[arg(long)]
    pub no_keys: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=webcam_toy=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("webcam_toy=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Effects) => {
            cli::list_effects();
            Ok(())
        }
        Some(Commands::Run(args)) => cli::run(args),
        None => cli::run(cli.run),
    }
}
