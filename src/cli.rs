// SPDX-License-Identifier: BSD-3-Clause
use std::path::PathBuf;

/// Dynamic heap fact extraction for managed-runtime pointer analysis
#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Heap dump snapshots (JSON)
    #[arg(required = true)]
    pub dumps: Vec<PathBuf>,

    /// Output directory for fact files
    #[arg(short, long)]
    pub out: PathBuf,

    /// Heap sensitivity variant
    #[arg(long, default_value = "insensitive")]
    pub sensitivity: String,

    /// (Experimental) extract unique string constants
    #[arg(long)]
    pub strings: bool,

    /// Quiet
    #[arg(long)]
    pub quiet: bool,

    /// Tracing
    #[arg(long)]
    pub tracing: bool,
}
