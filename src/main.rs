// SPDX-License-Identifier: GPL-3.0-only

use camera_feed::backends::camera::OutputMode;
use camera_feed::config::CaptureConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

mod cli;

#[derive(Parser)]
#[command(name = "camera-feed")]
#[command(about = "Discover V4L2 capture devices and grab decoded frames")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Output mode as accepted on the command line
#[derive(Clone, Copy, ValueEnum)]
enum OutputArg {
    Rgb,
    Grayscale,
    Separate,
    Copy,
}

impl From<OutputArg> for OutputMode {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Rgb => OutputMode::Rgb,
            OutputArg::Grayscale => OutputMode::Grayscale,
            OutputArg::Separate => OutputMode::Separate,
            OutputArg::Copy => OutputMode::Copy,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List capture devices and their formats
    List,

    /// Capture frames and save the last decoded one
    Capture {
        /// Device node to open
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,

        /// Format index (from 'camera-feed list')
        #[arg(short, long, default_value = "0")]
        format: usize,

        /// Output mode for packed YUV encodings
        #[arg(short = 'm', long, value_enum)]
        mode: Option<OutputArg>,

        /// Number of frames to capture
        #[arg(short = 'n', long, default_value = "5")]
        frames: u64,

        /// Give up after this many seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Output image path
        #[arg(short, long, default_value = "frame.png")]
        output: PathBuf,
    },

    /// Log devices appearing and vanishing until Ctrl-C
    Watch,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_feed=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = CaptureConfig::load_or_default(cli.config.as_deref());

    match cli.command {
        Commands::List => cli::list_devices(&config)?,
        Commands::Capture {
            device,
            format,
            mode,
            frames,
            timeout,
            output,
        } => cli::capture(
            &config,
            &device,
            format,
            mode.map(OutputMode::from),
            frames,
            Duration::from_secs(timeout),
            &output,
        )?,
        Commands::Watch => cli::watch(&config)?,
    }

    Ok(())
}
