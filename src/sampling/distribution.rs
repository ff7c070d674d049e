// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Distributions used to shape ranks and traffic inter-arrival times.
//!
//! All of these implement [`rand::distr::Distribution`], so any of them can be
//! substituted for another wherever a value of the same numeric type is
//! needed. Inter-arrival samples are `f64` nanoseconds.

use rand::prelude::*;
use rand_distr::{Exp, Pareto};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::SimDuration;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DistributionError {
    #[error("power-law exponent must be greater than 1, got {0}")]
    Exponent(String),
    #[error("invalid distribution parameter: {0}")]
    Parameter(String),
    #[error("rate needs a positive count")]
    ZeroCount,
    #[error("rate needs a positive window, got {0}")]
    NonPositiveWindow(SimDuration),
    #[error("rate of {count} per {window} has a mean interval below 1 ns")]
    SubNanosecondInterval { count: u64, window: SimDuration },
}

/// Continuous power-law distribution with density proportional to `x^-exponent`
/// for `x >= xmin`.
///
/// This is a Pareto distribution with scale `xmin` and shape `exponent - 1`.
#[derive(Clone, Copy, Debug)]
pub struct PowerLaw {
    xmin: f64,
    exponent: f64,
    pareto: Pareto<f64>,
}

impl PowerLaw {
    pub fn new(xmin: f64, exponent: f64) -> Result<Self, DistributionError> {
        if !(exponent > 1.0) {
            return Err(DistributionError::Exponent(exponent.to_string()));
        }
        let pareto = Pareto::new(xmin, exponent - 1.0)
            .map_err(|e| DistributionError::Parameter(e.to_string()))?;
        Ok(Self {
            xmin,
            exponent,
            pareto,
        })
    }

    pub fn xmin(&self) -> f64 {
        self.xmin
    }

    pub fn exponent(&self) -> f64 {
        self.exponent
    }
}

impl Distribution<f64> for PowerLaw {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.pareto.sample(rng)
    }
}

/// Degenerate distribution that always yields the same value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Constant(pub f64);

impl Distribution<f64> for Constant {
    fn sample<R: Rng + ?Sized>(&self, _rng: &mut R) -> f64 {
        self.0
    }
}

/// Exponentially distributed inter-arrival times of a Poisson process.
#[derive(Clone, Copy, Debug)]
pub struct Poisson {
    exp: Exp<f64>,
}

impl Poisson {
    /// Creates the inter-arrival distribution for a process with the given
    /// mean interval, in nanoseconds.
    pub fn new(mean_nanos: f64) -> Result<Self, DistributionError> {
        if !(mean_nanos > 0.0) {
            return Err(DistributionError::Parameter(format!(
                "mean interval must be positive, got {mean_nanos}"
            )));
        }
        let exp = Exp::new(1.0 / mean_nanos).map_err(|e| DistributionError::Parameter(e.to_string()))?;
        Ok(Self { exp })
    }
}

impl Distribution<f64> for Poisson {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.exp.sample(rng)
    }
}

/// Selects the shape of traffic inter-arrival times.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterArrivalKind {
    /// Fire exactly every mean interval.
    #[default]
    Constant,
    /// Exponentially distributed intervals around the mean.
    Poisson,
}

/// Inter-arrival distribution chosen at runtime.
#[derive(Clone, Copy, Debug)]
pub enum InterArrival {
    Constant(Constant),
    Poisson(Poisson),
}

impl InterArrival {
    pub fn new(kind: InterArrivalKind, rate: Rate) -> Result<Self, DistributionError> {
        Ok(match kind {
            InterArrivalKind::Constant => Self::Constant(Constant(rate.inv())),
            InterArrivalKind::Poisson => Self::Poisson(Poisson::new(rate.inv())?),
        })
    }
}

impl Distribution<f64> for InterArrival {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Self::Constant(c) => c.sample(rng),
            Self::Poisson(p) => p.sample(rng),
        }
    }
}

/// A number of events per time window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rate {
    count: u64,
    window: SimDuration,
}

impl Rate {
    pub fn new(count: u64, window: SimDuration) -> Result<Self, DistributionError> {
        if count == 0 {
            return Err(DistributionError::ZeroCount);
        }
        if window <= SimDuration::ZERO {
            return Err(DistributionError::NonPositiveWindow(window));
        }
        // the scheduler cannot advance by less than one tick
        if count > window.as_nanos().unsigned_abs() {
            return Err(DistributionError::SubNanosecondInterval { count, window });
        }
        Ok(Self { count, window })
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn window(&self) -> SimDuration {
        self.window
    }

    /// Mean interval between two events, in nanoseconds.
    pub fn inv(&self) -> f64 {
        self.window.as_nanos() as f64 / self.count as f64
    }

    /// Mean interval between two events, truncated to whole nanoseconds.
    pub fn mean_interval(&self) -> SimDuration {
        SimDuration::from_nanos(self.window.as_nanos() / self.count as i64)
    }
}
