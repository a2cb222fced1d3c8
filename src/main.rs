//! rfmlens: RFM customer ranking and sales aggregates for an order ledger
//!
//! Loads the two ledger tables, resolves the date window, builds the
//! dashboard and prints it.

use std::io::{self, Write};
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use rfmlens::{report, Args, Dashboard, Ledger, Window};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.verbose {
        println!("rfmlens - RFM Customer Ranking and Sales Aggregates");
        println!("===================================================\n");
        println!("  Order summaries: {}", args.summary);
        println!("  Order lines:     {}", args.lines);
    }

    let start_time = Instant::now();

    let ledger = Ledger::load(&args.summary, &args.lines)?;
    let window = args.window(Window::spanning(&ledger.summaries))?;
    if window.is_empty() {
        info!(window = %window, "start is after end, every table will be empty");
    }

    let dashboard = Dashboard::build(&ledger, window, &args.scorer())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    report::write_dashboard(&mut out, &dashboard, args.rows)?;
    out.flush()?;
    drop(out);

    let elapsed = start_time.elapsed();
    println!("\n✓ Dashboard built for {}", window);
    println!("  Processing time: {:.2}s", elapsed.as_secs_f64());
    info!(elapsed_secs = elapsed.as_secs_f64(), "done");
    Ok(())
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
