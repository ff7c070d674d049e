// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Rank-weighted sampling of population members.
//!
//! The main type is [`RankedSelector`], which draws members of a fixed
//! population with probability proportional to a per-member rank, always with
//! replacement. Ranks are normally shaped once per population by a power-law
//! distribution, see [`sample_ranks`] and [`distribution::PowerLaw`].

pub mod distribution;

use rand::distr::weighted::WeightedIndex;
use rand::prelude::*;
use thiserror::Error;

pub use self::distribution::{Constant, InterArrival, InterArrivalKind, Poisson, PowerLaw, Rate};

/// Errors that can occur when constructing a [`RankedSelector`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("cannot select from an empty population")]
    Empty,
    #[error("got {ranks} ranks for a population of {population}")]
    LengthMismatch { population: usize, ranks: usize },
    #[error("invalid ranks: {0}")]
    InvalidRanks(String),
}

/// Weighted random selection of population members, with replacement.
///
/// Each call to [`RankedSelector::pick`] returns a member with probability
/// proportional to its rank. The population is never consumed, so repeated
/// calls may return the same member.
#[derive(Clone, Debug)]
pub struct RankedSelector<T> {
    population: Vec<T>,
    ranks: Vec<f64>,
    rank_index: WeightedIndex<f64>,
}

impl<T> RankedSelector<T> {
    /// Creates a new selector from a population and a parallel list of ranks.
    ///
    /// # Errors
    ///
    /// Returns an error if the population is empty, if the number of ranks
    /// differs from the population size, or if the ranks are not all
    /// non-negative and finite with at least one positive rank.
    pub fn new(population: Vec<T>, ranks: Vec<f64>) -> Result<Self, SelectorError> {
        if population.is_empty() {
            return Err(SelectorError::Empty);
        }
        if population.len() != ranks.len() {
            return Err(SelectorError::LengthMismatch {
                population: population.len(),
                ranks: ranks.len(),
            });
        }
        if let Some(bad) = ranks.iter().find(|r| !r.is_finite()) {
            return Err(SelectorError::InvalidRanks(format!("non-finite rank {bad}")));
        }
        let rank_index =
            WeightedIndex::new(&ranks).map_err(|e| SelectorError::InvalidRanks(e.to_string()))?;
        Ok(Self {
            population,
            ranks,
            rank_index,
        })
    }

    /// Creates a new selector, drawing one rank per member from `dist`.
    pub fn with_ranks<D>(
        population: Vec<T>,
        dist: &D,
        rng: &mut dyn RngCore,
    ) -> Result<Self, SelectorError>
    where
        D: Distribution<f64> + ?Sized,
    {
        let ranks = sample_ranks(population.len(), dist, rng);
        Self::new(population, ranks)
    }

    /// Draws a single member, with probability proportional to its rank.
    pub fn pick(&self, rng: &mut dyn RngCore) -> &T {
        let index = self.rank_index.sample(rng);
        &self.population[index]
    }

    /// Returns the full population, in construction order.
    pub fn population(&self) -> &[T] {
        &self.population
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.population.len()
    }

    /// Always `false`, a selector cannot be empty.
    pub fn is_empty(&self) -> bool {
        self.population.is_empty()
    }

    /// Returns the rank of the member at position `index`.
    pub fn rank_of(&self, index: usize) -> Option<f64> {
        self.ranks.get(index).copied()
    }
}

/// Draws `n` ranks from `dist`.
pub fn sample_ranks<D>(n: usize, dist: &D, rng: &mut dyn RngCore) -> Vec<f64>
where
    D: Distribution<f64> + ?Sized,
{
    (0..n).map(|_| dist.sample(rng)).collect()
}
