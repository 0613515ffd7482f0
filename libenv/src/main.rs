//! # libenv
//!
//! Command-line companion to the C ABI host: lists the spaces of a bundled
//! family or drives a pool of it with random actions.

mod app;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    app::run(app::Cli::parse())
}
