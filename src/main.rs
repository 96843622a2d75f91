use std::path::PathBuf;

use clap::Parser;
use flatfs::{
    disk::{init::VolumeOptions, DEFAULT_BLOCK_COUNT},
    fs::config::DEFAULT_MAX_FILES,
};

use crate::shell::start_shell;

mod shell;

/// Interactive shell over a flatfs disk image.
#[derive(Debug, Parser)]
#[command(name = "flatfs", version, about)]
struct Cli {
    /// Disk image to mount (created when missing)
    #[arg(short, long, default_value = "disk.img")]
    disk: PathBuf,

    /// Size of a newly created image, in 512-byte blocks
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_COUNT)]
    blocks: u64,

    /// Directory slots (and inodes) on a freshly formatted volume
    #[arg(long, default_value_t = DEFAULT_MAX_FILES)]
    max_files: usize,

    /// Format the image even if it already exists
    #[arg(long)]
    format: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    start_shell(VolumeOptions {
        path: cli.disk,
        blocks: cli.blocks,
        max_files: cli.max_files,
        force_format: cli.format,
    });
}
