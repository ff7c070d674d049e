// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Study parameters.
//!
//! There are two layers of configuration:
//! - [`SweepParams`] are the numeric bounds of a parameter sweep, given as a
//!   single whitespace-delimited string (usually on the command line).
//! - [`StudyConfig`] holds everything else, like durations, rates, and output
//!   locations. It can be read from a TOML file, every field has a default.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sampling::distribution::DistributionError;
use crate::sampling::{InterArrivalKind, PowerLaw, Rate};
use crate::time::SimDuration;

/// Sweep used when no parameter string is given.
pub const DEFAULT_SWEEP: &str = "50 0 18 2 0.1 0.9 0.1";

/// Log file prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "ByzantineSensitivity__varyingUNLoverlapping";

/// Overlap factors are rounded to this many decimals.
const OVERLAP_DECIMALS: i32 = 6;

/// Largest sweep that is accepted.
pub const MAX_COMBINATIONS: usize = 100_000;

const FIELDS: [&str; 7] = [
    "peers",
    "min byzantine",
    "max byzantine",
    "byzantine step",
    "min overlap",
    "max overlap",
    "overlap step",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot parse {field} from {value:?}")]
    Parse { field: &'static str, value: String },
    #[error("expected at most {max} parameters, got {0}", max = FIELDS.len())]
    TooManyParams(usize),
    #[error("{0} must be positive")]
    NonPositiveStep(&'static str),
    #[error("invalid study config: {0}")]
    Invalid(String),
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
}

/// Bounds of a sweep over Byzantine count and overlap factor.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepParams {
    pub num_peers: usize,
    pub min_byzantine: usize,
    pub max_byzantine: usize,
    pub byzantine_step: usize,
    pub min_overlap: f64,
    pub max_overlap: f64,
    pub overlap_step: f64,
}

impl Default for SweepParams {
    fn default() -> Self {
        Self {
            num_peers: 50,
            min_byzantine: 0,
            max_byzantine: 18,
            byzantine_step: 2,
            min_overlap: 0.1,
            max_overlap: 0.9,
            overlap_step: 0.1,
        }
    }
}

/// A single point of a sweep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Combination {
    /// Position within the sweep, starting at 0.
    pub index: usize,
    pub num_peers: usize,
    pub num_byzantine: usize,
    pub overlap: f64,
}

impl Combination {
    /// Tag identifying this combination in the CSV logs.
    pub fn tag(&self) -> String {
        format!(
            "( {},{},{:.6})",
            self.num_peers, self.num_byzantine, self.overlap
        )
    }
}

impl Display for Combination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "peers {}, byzantine {}, overlap {:.2}",
            self.num_peers, self.num_byzantine, self.overlap
        )
    }
}

impl SweepParams {
    /// Enumerates all combinations, Byzantine count in the outer loop.
    ///
    /// Both ranges include their upper bound. Overlap values are computed as
    /// `min + i * step` and rounded, so floating-point drift neither skips nor
    /// adds a final value.
    pub fn combinations(&self) -> Vec<Combination> {
        let overlaps = self.overlaps();
        let mut combinations = Vec::new();
        for num_byzantine in self.byzantine_counts() {
            for &overlap in &overlaps {
                combinations.push(Combination {
                    index: combinations.len(),
                    num_peers: self.num_peers,
                    num_byzantine,
                    overlap,
                });
            }
        }
        combinations
    }

    /// Returns the number of combinations, without enumerating them.
    pub fn num_combinations(&self) -> usize {
        let byzantine = if self.max_byzantine < self.min_byzantine {
            0
        } else {
            ((self.max_byzantine - self.min_byzantine) / self.byzantine_step.max(1)).saturating_add(1)
        };
        byzantine.saturating_mul(self.overlaps().len())
    }

    fn byzantine_counts(&self) -> impl Iterator<Item = usize> {
        (self.min_byzantine..=self.max_byzantine).step_by(self.byzantine_step.max(1))
    }

    fn overlaps(&self) -> Vec<f64> {
        let finite = self.min_overlap.is_finite() && self.max_overlap.is_finite();
        if !(finite && self.overlap_step > 0.0) {
            return Vec::new();
        }
        let scale = 10f64.powi(OVERLAP_DECIMALS);
        let round = |x: f64| (x * scale).round() / scale;
        let max_overlap = round(self.max_overlap);
        (0..=MAX_COMBINATIONS as u32)
            .map(|i| round(self.min_overlap + f64::from(i) * self.overlap_step))
            .take_while(|overlap| *overlap <= max_overlap)
            .collect()
    }
}

impl FromStr for SweepParams {
    type Err = ConfigError;

    /// Parses `"<peers> <minByz> <maxByz> <byzStep> <minOv> <maxOv> <ovStep>"`.
    ///
    /// Missing trailing values keep their defaults.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        if tokens.len() > FIELDS.len() {
            return Err(ConfigError::TooManyParams(tokens.len()));
        }
        let mut params = Self::default();
        for (i, token) in tokens.iter().enumerate() {
            let field = FIELDS[i];
            match i {
                0 => params.num_peers = parse(field, token)?,
                1 => params.min_byzantine = parse(field, token)?,
                2 => params.max_byzantine = parse(field, token)?,
                3 => params.byzantine_step = parse(field, token)?,
                4 => params.min_overlap = parse(field, token)?,
                5 => params.max_overlap = parse(field, token)?,
                _ => params.overlap_step = parse(field, token)?,
            }
        }
        if params.byzantine_step == 0 {
            return Err(ConfigError::NonPositiveStep(FIELDS[3]));
        }
        if !(params.overlap_step > 0.0) || !params.overlap_step.is_finite() {
            return Err(ConfigError::NonPositiveStep(FIELDS[6]));
        }
        if !params.min_overlap.is_finite() || !params.max_overlap.is_finite() {
            return Err(ConfigError::Invalid("overlap bounds must be finite".into()));
        }
        let count = params.num_combinations();
        if count > MAX_COMBINATIONS {
            return Err(ConfigError::Invalid(format!(
                "sweep of {count} combinations exceeds {MAX_COMBINATIONS}"
            )));
        }
        Ok(params)
    }
}

fn parse<T: FromStr>(field: &'static str, token: &str) -> Result<T, ConfigError> {
    token.parse().map_err(|_| ConfigError::Parse {
        field,
        value: token.to_string(),
    })
}

/// Settings shared by all combinations of a study.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StudyConfig {
    /// Base seed, combination `i` uses `seed + i`.
    pub seed: u64,
    /// Delay of every trust link.
    pub link_delay_ms: i64,
    pub sim_duration_secs: i64,
    /// Time without traffic at the start and at the end of each run.
    pub quiet_secs: i64,
    /// Transactions per `tx_window_ms`, for the submitter and the injector each.
    pub tx_rate: u64,
    pub tx_window_ms: i64,
    pub inter_arrival: InterArrivalKind,
    pub ledger_interval_ms: i64,
    /// Progress log interval, 0 disables the heartbeat.
    pub heartbeat_secs: i64,
    pub rank_xmin: f64,
    pub rank_exponent: f64,
    /// Inject into every Byzantine peer at once, instead of one selected peer.
    pub sybil_injection: bool,
    pub output_dir: PathBuf,
    pub prefix: String,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            link_delay_ms: 200,
            sim_duration_secs: 120,
            quiet_secs: 10,
            tx_rate: 100,
            tx_window_ms: 1000,
            inter_arrival: InterArrivalKind::Constant,
            ledger_interval_ms: 1000,
            heartbeat_secs: 10,
            rank_xmin: 1.0,
            rank_exponent: 3.0,
            sybil_injection: false,
            output_dir: PathBuf::from("."),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl StudyConfig {
    /// Reads and validates a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        contents.parse()
    }

    /// Checks that all durations and rates make sense together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sim_duration_secs <= 0 {
            return Err(ConfigError::Invalid("simulation duration must be positive".into()));
        }
        if self.quiet_secs < 0 || self.quiet_secs.saturating_mul(2) >= self.sim_duration_secs {
            return Err(ConfigError::Invalid(format!(
                "quiet period of {} s does not fit twice into {} s",
                self.quiet_secs, self.sim_duration_secs
            )));
        }
        if self.link_delay_ms < 0 {
            return Err(ConfigError::Invalid("link delay must not be negative".into()));
        }
        if self.ledger_interval_ms <= 0 {
            return Err(ConfigError::Invalid("ledger interval must be positive".into()));
        }
        if self.heartbeat_secs < 0 {
            return Err(ConfigError::Invalid("heartbeat interval must not be negative".into()));
        }
        if self.prefix.is_empty() {
            return Err(ConfigError::Invalid("log prefix must not be empty".into()));
        }
        self.rate()?;
        self.rank_distribution()?;
        Ok(())
    }

    pub fn link_delay(&self) -> SimDuration {
        SimDuration::from_millis(self.link_delay_ms)
    }

    pub fn sim_duration(&self) -> SimDuration {
        SimDuration::from_secs(self.sim_duration_secs)
    }

    pub fn quiet(&self) -> SimDuration {
        SimDuration::from_secs(self.quiet_secs)
    }

    pub fn ledger_interval(&self) -> SimDuration {
        SimDuration::from_millis(self.ledger_interval_ms)
    }

    /// Returns the heartbeat interval, if enabled.
    pub fn heartbeat(&self) -> Option<SimDuration> {
        (self.heartbeat_secs > 0).then(|| SimDuration::from_secs(self.heartbeat_secs))
    }

    pub fn rate(&self) -> Result<Rate, DistributionError> {
        Rate::new(self.tx_rate, SimDuration::from_millis(self.tx_window_ms))
    }

    pub fn rank_distribution(&self) -> Result<PowerLaw, DistributionError> {
        PowerLaw::new(self.rank_xmin, self.rank_exponent)
    }

    pub fn tx_log_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_tx.csv", self.prefix))
    }

    pub fn ledger_log_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_ledger.csv", self.prefix))
    }
}

impl FromStr for StudyConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
