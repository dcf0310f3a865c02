//! nowdev - local development server emulating the Now platform
//! request pipeline.

mod build;
mod builders;
mod cli;
mod config;
mod core;
mod index;
mod logger;
mod router;
mod serve;
mod utils;
mod watch;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::Cli;
use config::NowConfig;
use serve::DevServer;
use std::path::PathBuf;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();
    logger::set_verbose(cli.verbose);

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let root = cli.dir.clone().unwrap_or_else(|| PathBuf::from("."));

    // Config faults are fatal: log and exit non-zero
    let config = match NowConfig::load(&root) {
        Ok(config) => config,
        Err(e) => {
            log!("error"; "{:#}", anyhow::Error::new(e));
            std::process::exit(1);
        }
    };

    // Before threads exist: build env becomes process env
    config.apply_build_env();

    let server = DevServer::new(root, config)?;
    server.start(&cli.listen_spec())
}
