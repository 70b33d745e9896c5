//! cpd - copy/paste daemon for local networks
//!
//! Share a file from one machine and pull it from another on the same
//! network, with a browser fallback for devices without cpd installed.
//!
//! ## Quick Start
//!
//! ```bash
//! # On the sending machine
//! cpd send ./document.pdf
//!
//! # On the receiving machine (address and port are printed by send)
//! cpd receive 192.168.1.10 4100 document.pdf
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;

mod commands;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Send(args) => commands::send::run(args).await,
        Command::Receive(args) => commands::receive::run(args).await,
        Command::Key(args) => commands::key::run(&args),
        Command::Copy(args) => commands::copy::run(&args),
        Command::List(args) => commands::list::run(&args),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,cpd=info,cpd_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
