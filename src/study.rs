// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Byzantine sensitivity study.
//!
//! A study sweeps over the number of Byzantine peers and the UNL overlap
//! factor. For every combination it builds a fresh topology, runs honest and
//! Byzantine traffic against it for the configured duration, and appends the
//! collected statistics to two CSV logs, one for transactions and one for
//! ledgers. Combinations that fail are logged and skipped.

use std::fs::File;
use std::io;

use log::{debug, info, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::collector::{Collector, LedgerCollector, TxCollector};
use crate::config::{Combination, ConfigError, StudyConfig, SweepParams};
use crate::sampling::InterArrival;
use crate::sampling::distribution::DistributionError;
use crate::scheduler::SchedulerError;
use crate::sim::Simulation;
use crate::time::SimDuration;
use crate::topology::{TopologyBuilder, TopologyError, TopologyParams, TrustSetBounds};
use crate::traffic::TrafficGenerator;

#[derive(Debug, Error)]
pub enum StudyError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("topology: {0}")]
    Topology(#[from] TopologyError),
    #[error("scheduler: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("distribution: {0}")]
    Distribution(#[from] DistributionError),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("combination ({combination}): {source}")]
    Combination {
        combination: Combination,
        source: Box<StudyError>,
    },
}

/// Everything collected from a single combination.
#[derive(Debug)]
pub struct CombinationOutcome {
    pub combination: Combination,
    pub bounds: TrustSetBounds,
    /// Realized size of the common UNL.
    pub common_unl_size: usize,
    pub duration: SimDuration,
    pub tx: TxCollector,
    pub ledger: LedgerCollector,
    /// Number of events executed by the scheduler.
    pub events: u64,
}

impl CombinationOutcome {
    /// Writes the per-combination summary and the collector reports.
    pub fn report(&self, sink: &mut dyn io::Write) -> io::Result<()> {
        let c = &self.combination;
        writeln!(
            sink,
            "| Peers: {:>2} | Byzantines: {:>2} | UNL overlapping: {:.2} |",
            c.num_peers, c.num_byzantine, c.overlap
        )?;
        writeln!(
            sink,
            "| Duration: {} ms | Branches: {} | Synchronized: {} |",
            self.duration.as_nanos() / 1_000_000,
            self.ledger.branches(),
            if self.ledger.synchronized() { "Y" } else { "N" },
        )?;
        self.tx.report(self.duration, sink, true)?;
        self.ledger.report(self.duration, sink, false)
    }
}

/// Result of a whole sweep.
#[derive(Debug, Default)]
pub struct SweepSummary {
    pub completed: Vec<CombinationOutcome>,
    pub failed: Vec<StudyError>,
}

/// Runs a single combination with its own simulation, seeded with `seed`.
pub fn run_combination(
    config: &StudyConfig,
    combination: &Combination,
    seed: u64,
) -> Result<CombinationOutcome, StudyError> {
    let params = TopologyParams {
        num_peers: combination.num_peers,
        num_byzantine: combination.num_byzantine,
        overlap: combination.overlap,
        delay: config.link_delay(),
    };
    let builder = TopologyBuilder::new(params)?.with_rank_distribution(config.rank_distribution()?);

    let mut sim = Simulation::new(seed, (TxCollector::new(), LedgerCollector::new()));
    let topology = builder.build(&mut sim.ctx.peers, &mut sim.ctx.rng)?;

    sim.start_ledger_rounds(config.ledger_interval())?;
    if let Some(interval) = config.heartbeat() {
        sim.start_heartbeat(interval)?;
    }

    let dist = InterArrival::new(config.inter_arrival, config.rate()?)?;
    let start = sim.now().saturating_add(config.quiet());
    let stop = sim.now().saturating_add(config.sim_duration() - config.quiet());
    match topology.honest_selector {
        Some(selector) => {
            TrafficGenerator::submitter(dist, start, stop, selector).spawn(&mut sim.scheduler)?;
        }
        None => debug!("no honest peers, not submitting"),
    }
    if config.sybil_injection && !topology.byzantine.is_empty() {
        TrafficGenerator::sybil_injector(dist, start, stop, topology.byzantine)
            .spawn(&mut sim.scheduler)?;
    } else if let Some(selector) = topology.byzantine_selector {
        TrafficGenerator::injector(dist, start, stop, selector).spawn(&mut sim.scheduler)?;
    }

    let events = sim.run_for(config.sim_duration())?;
    let dropped = sim.shutdown();
    debug!("executed {events} events, dropped {dropped} pending events");

    let (tx, ledger) = sim.ctx.collector;
    Ok(CombinationOutcome {
        combination: *combination,
        bounds: topology.bounds,
        common_unl_size: topology.common_unl.len(),
        duration: config.sim_duration(),
        tx,
        ledger,
        events,
    })
}

/// A parameter sweep with fixed study configuration.
pub struct Study {
    config: StudyConfig,
    parallel: bool,
}

/// Append-mode CSV logs of a study.
struct StudyLogs {
    tx: csv::Writer<File>,
    ledger: csv::Writer<File>,
    header_written: bool,
}

impl StudyLogs {
    fn open(config: &StudyConfig) -> Result<Self, StudyError> {
        std::fs::create_dir_all(&config.output_dir)?;
        let open = |path| -> Result<csv::Writer<File>, io::Error> {
            let file = File::options().create(true).append(true).open(path)?;
            Ok(csv::WriterBuilder::new().has_headers(false).from_writer(file))
        };
        Ok(Self {
            tx: open(config.tx_log_path())?,
            ledger: open(config.ledger_log_path())?,
            header_written: false,
        })
    }

    /// Appends one row per log for `outcome`.
    ///
    /// Both rows are buffered before either log is flushed, so a failure to
    /// format a row leaves both files untouched. An I/O error during the
    /// flush itself can still leave the logs with different row counts.
    fn append(&mut self, outcome: &CombinationOutcome) -> Result<(), StudyError> {
        let tag = outcome.combination.tag();
        let include_header = !self.header_written;
        outcome
            .tx
            .write_csv(outcome.duration, &mut self.tx, &tag, include_header)?;
        outcome
            .ledger
            .write_csv(outcome.duration, &mut self.ledger, &tag, include_header)?;
        self.header_written = true;
        self.tx.flush()?;
        self.ledger.flush()?;
        Ok(())
    }
}

impl Study {
    /// Creates a new study, validating `config`.
    pub fn new(config: StudyConfig) -> Result<Self, StudyError> {
        config.validate()?;
        Ok(Self {
            config,
            parallel: false,
        })
    }

    /// Runs independent combinations on the rayon thread pool.
    ///
    /// Results are still written in sweep order, so logs are identical to a
    /// sequential run.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// Runs every combination of `sweep`.
    ///
    /// # Errors
    ///
    /// Only fails if the logs cannot be opened or written. Failing
    /// combinations are reported in the returned [`SweepSummary`].
    pub fn run(&self, sweep: &SweepParams) -> Result<SweepSummary, StudyError> {
        info!(
            "ByzantineSensitivitySim: {} peers, byzantine {}..={} step {}, overlap {}..={} step {}",
            sweep.num_peers,
            sweep.min_byzantine,
            sweep.max_byzantine,
            sweep.byzantine_step,
            sweep.min_overlap,
            sweep.max_overlap,
            sweep.overlap_step,
        );
        let combinations = sweep.combinations();
        info!("running {} combinations", combinations.len());
        let mut logs = StudyLogs::open(&self.config)?;
        let mut summary = SweepSummary::default();

        if self.parallel {
            let results: Vec<_> = combinations
                .par_iter()
                .map(|c| self.run_one(c))
                .collect();
            for result in results {
                self.finish(result, &mut logs, &mut summary)?;
            }
        } else {
            for c in &combinations {
                let result = self.run_one(c);
                self.finish(result, &mut logs, &mut summary)?;
            }
        }

        info!(
            "study done: {} combinations completed, {} failed",
            summary.completed.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    fn run_one(&self, combination: &Combination) -> Result<CombinationOutcome, StudyError> {
        info!("starting combination ({combination})");
        let seed = self.config.seed.wrapping_add(combination.index as u64);
        run_combination(&self.config, combination, seed).map_err(|e| StudyError::Combination {
            combination: *combination,
            source: Box::new(e),
        })
    }

    fn finish(
        &self,
        result: Result<CombinationOutcome, StudyError>,
        logs: &mut StudyLogs,
        summary: &mut SweepSummary,
    ) -> Result<(), StudyError> {
        match result {
            Ok(outcome) => {
                let mut report = Vec::new();
                outcome.report(&mut report)?;
                for line in String::from_utf8_lossy(&report).lines() {
                    info!("{line}");
                }
                logs.append(&outcome)?;
                summary.completed.push(outcome);
            }
            Err(err) => {
                warn!("skipping {err}");
                summary.failed.push(err);
            }
        }
        Ok(())
    }
}
