// SPDX-License-Identifier: BSD-3-Clause
use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;

use tracing_flame::FlameLayer;
use tracing_subscriber::{fmt, prelude::*};

use dynheap::analysis::memory::{MemoryAnalysis, Options};
use dynheap::cli;

fn setup_global_subscriber() -> impl Drop {
    let filter_layer = tracing::level_filters::LevelFilter::TRACE;
    let fmt_layer = fmt::Layer::default();
    let (flame_layer, _guard) = FlameLayer::with_file("./tracing.folded").unwrap();
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(flame_layer)
        .init();
    _guard
}

fn main() -> Result<()> {
    let args = cli::Args::parse();

    if args.tracing {
        setup_global_subscriber();
    }

    let analysis = MemoryAnalysis::new(
        args.dumps,
        Options {
            sensitivity: args.sensitivity,
            strings: args.strings,
        },
    )
    .context("Bad run configuration")?;

    let count = analysis
        .write_facts_to_db(&args.out)
        .context("Couldn't extract facts from heap dumps")?;

    if !args.quiet {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "dynamic facts")?;
        writeln!(stdout, "-------------")?;
        writeln!(stdout, "{}", count)?;
    }

    Ok(())
}
