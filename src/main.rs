// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::{Context, bail};
use log::{info, warn};
use unlsim::config::DEFAULT_SWEEP;
use unlsim::{Study, StudyConfig, SweepParams, logging};

/// Byzantine sensitivity study over varying UNL overlap.
#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Sweep parameters: peers, min/max/step Byzantine, min/max/step overlap.
    ///
    /// Missing trailing values keep their defaults.
    #[arg(default_value = DEFAULT_SWEEP)]
    params: String,
    /// TOML file with study settings.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the base seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Overrides the directory the CSV logs are written to.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Runs combinations in parallel.
    #[arg(long)]
    parallel: bool,
    /// Prints the effective study settings as TOML and exits.
    #[arg(long)]
    dump_config: bool,
}

fn main() -> Result<()> {
    // enable fancy `color_eyre` error messages
    color_eyre::install()?;
    logging::enable_logforth();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => StudyConfig::from_file(path)
            .with_context(|| format!("Can not load config {}", path.display()))?,
        None => StudyConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if args.dump_config {
        print!("{}", toml::to_string(&config)?);
        return Ok(());
    }

    let sweep: SweepParams = args.params.parse().context("Can not parse sweep parameters")?;
    if sweep.num_combinations() == 0 {
        bail!("sweep {:?} has no combinations", args.params);
    }
    info!(
        "writing logs to {} and {}",
        config.tx_log_path().display(),
        config.ledger_log_path().display()
    );

    let study = Study::new(config)?.with_parallel(args.parallel);
    let summary = study.run(&sweep)?;
    if !summary.failed.is_empty() {
        warn!("{} of {} combinations failed", summary.failed.len(), sweep.num_combinations());
    }
    if summary.completed.is_empty() {
        bail!("all {} combinations failed", summary.failed.len());
    }
    Ok(())
}
