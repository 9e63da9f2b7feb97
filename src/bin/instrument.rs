// SPDX-License-Identifier: BSD-3-Clause
use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;

use tracing_flame::FlameLayer;
use tracing_subscriber::{fmt, prelude::*};

use dynheap::bytecode::rewriter::{ClassRewriter, RewriteOptions};
use dynheap::bytecode::ClassModule;

/// Ahead-of-time call and allocation instrumentation for class modules
#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Class module to instrument (JSON)
    #[arg()]
    pub module: std::path::PathBuf,

    /// Output path for the instrumented module
    #[arg(short, long)]
    pub out: std::path::PathBuf,

    /// Record call-graph edges at method entry
    #[arg(long)]
    pub call_edges: bool,

    /// Track all pending allocations and fail on pairing mismatches
    #[arg(long)]
    pub strict_pairing: bool,

    /// Quiet
    #[arg(long)]
    pub quiet: bool,

    /// Tracing
    #[arg(long)]
    pub tracing: bool,
}

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
    let args = Args::parse();

    if args.tracing {
        setup_global_subscriber();
    }

    let module = ClassModule::from_file(&args.module)?;
    let rewriter = ClassRewriter::new(RewriteOptions {
        instrument_call_edges: args.call_edges,
        strict_pairing: args.strict_pairing,
    });
    let instrumented = rewriter
        .rewrite_module(&module)
        .context("Couldn't instrument class module")?;
    instrumented.to_file(&args.out)?;

    if !args.quiet {
        let methods: usize = instrumented.classes.iter().map(|c| c.methods.len()).sum();
        let mut stdout = io::stdout().lock();
        writeln!(
            stdout,
            "instrumented {} classes ({} methods)",
            instrumented.classes.len(),
            methods
        )?;
    }

    Ok(())
}
