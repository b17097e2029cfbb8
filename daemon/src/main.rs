//! dgov: runs one governance operation or query against the local ledger.

mod cli;
mod commands;
mod config;

use anyhow::Context;
use clap::Parser;

use dgov_governance::GovernanceLedger;
use dgov_store_lmdb::{LmdbEnvironment, Migrator};
use dgov_types::{Clock, SystemClock};

use crate::cli::Cli;
use crate::config::DaemonConfig;

/// Named databases plus headroom.
const MAX_DBS: u32 = 16;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DaemonConfig::from_toml_file(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => DaemonConfig::default(),
    };
    cli.apply_overrides(&mut config);

    dgov_utils::init_logging(config.log_format, &config.log_level)?;
    if let Some(path) = &cli.config {
        tracing::debug!(path = %path.display(), "loaded config");
    }
    if tracing::enabled!(tracing::Level::TRACE) {
        let rendered = config.to_toml_string()?;
        tracing::trace!(effective = %rendered, "configuration");
    }

    let env = LmdbEnvironment::open(&config.data_dir, MAX_DBS, config.map_size)
        .with_context(|| format!("open ledger at {}", config.data_dir.display()))?;
    let custody = config.custody_address()?;
    let store = env.custody_store(custody);
    let schema = Migrator::run(&store).context("migrate ledger schema")?;
    let book = env.balance_book(custody);
    let clock = SystemClock;
    let now = clock.now().as_secs();

    let mut ledger = GovernanceLedger::open(store, book, clock, config.params())
        .context("open governance ledger")?;
    tracing::debug!(schema, data_dir = %config.data_dir.display(), "ledger ready");

    let output = commands::run(cli.command, &mut ledger, &config, now)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
