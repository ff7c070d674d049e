// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Construction of trust topologies with a Byzantine population.
//!
//! The [`TopologyBuilder`] splits a fresh peer population into an honest and
//! a Byzantine group, draws a common UNL shared by every peer, and then
//! extends each peer's UNL to a random size within [`TrustSetBounds`]. New
//! members are drawn from rank-weighted selectors over the two groups, in
//! proportion to the global Byzantine fraction.
//!
//! The overlap factor controls how much of the maximum trust-set size is
//! taken up by the common UNL. A factor of 1 makes all UNLs (nearly)
//! identical, small factors leave most of each UNL to individual choice.
//!
//! Honest and Byzantine shares of any number of draws `n` are split as
//! `honest = floor(n * (P - B) / P)`, with the remainder going to the
//! Byzantine group.

use std::fmt::Display;

use log::{debug, trace};
use rand::prelude::*;
use thiserror::Error;

use crate::PeerId;
use crate::peer::{PeerGroup, Peers};
use crate::sampling::distribution::DistributionError;
use crate::sampling::{PowerLaw, RankedSelector, SelectorError};
use crate::time::SimDuration;

/// Maximum number of draws spent on finding one new UNL member.
pub const MAX_TRIES_PER_MEMBER: usize = 100_000;

/// Tolerance when flooring products of decimal overlap factors.
const FLOOR_EPSILON: f64 = 1e-9;

/// The two halves of a partitioned population.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupKind {
    Honest,
    Byzantine,
}

impl Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Honest => write!(f, "honest"),
            Self::Byzantine => write!(f, "byzantine"),
        }
    }
}

/// Errors that abort the construction of a topology.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TopologyError {
    #[error("topology needs at least one peer")]
    ZeroPeers,
    #[error("{byzantine} byzantine peers exceed total of {peers}")]
    TooManyByzantine { peers: usize, byzantine: usize },
    #[error("overlap factor must be in (0, 1], got {0}")]
    InvalidOverlap(f64),
    #[error("trust-set bounds {bounds} violate {constraint}")]
    InvalidBounds {
        bounds: TrustSetBounds,
        constraint: &'static str,
    },
    #[error("peer {peer}: no new {group} member found after {tries} draws")]
    SamplingExhausted {
        peer: PeerId,
        group: GroupKind,
        tries: usize,
    },
    #[error("peer {peer}: needs {needed} new members, only {available} candidates left")]
    InsufficientCandidates {
        peer: PeerId,
        needed: usize,
        available: usize,
    },
    #[error("selector: {0}")]
    Selector(#[from] SelectorError),
    #[error("rank distribution: {0}")]
    Distribution(#[from] DistributionError),
}

/// Size constraints on every peer's UNL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrustSetBounds {
    /// Number of UNL slots under consideration.
    pub num_cnls: usize,
    pub max_size: usize,
    pub min_size: usize,
    /// Targeted size of the common UNL.
    pub common_size: usize,
}

impl TrustSetBounds {
    /// Derives the bounds for `num_peers` peers and the given overlap factor.
    pub fn derive(num_peers: usize, overlap: f64) -> Self {
        let num_cnls = num_peers.max(1);
        let max_size = floor_frac(0.5, num_cnls).max(1);
        let common_size = floor_frac(overlap, max_size);
        let min_size = common_size.max(floor_frac(0.25, num_cnls).max(1));
        Self {
            num_cnls,
            max_size,
            min_size,
            common_size,
        }
    }

    /// Checks `1 <= min <= max <= num_peers` and `min >= common`.
    pub fn validate(&self, num_peers: usize) -> Result<(), TopologyError> {
        let violated = |constraint| TopologyError::InvalidBounds {
            bounds: *self,
            constraint,
        };
        if self.min_size < 1 {
            return Err(violated("1 <= min"));
        }
        if self.min_size > self.max_size {
            return Err(violated("min <= max"));
        }
        if self.max_size > num_peers {
            return Err(violated("max <= peers"));
        }
        if self.min_size < self.common_size {
            return Err(violated("min >= common"));
        }
        Ok(())
    }
}

impl Display for TrustSetBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}] (common {}, cnls {})",
            self.min_size, self.max_size, self.common_size, self.num_cnls
        )
    }
}

fn floor_frac(factor: f64, n: usize) -> usize {
    (factor * n as f64 + FLOOR_EPSILON).floor() as usize
}

/// Input of a topology construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TopologyParams {
    pub num_peers: usize,
    pub num_byzantine: usize,
    /// Overlap factor, in (0, 1].
    pub overlap: f64,
    /// Delay of every trust link.
    pub delay: SimDuration,
}

impl TopologyParams {
    /// Checks the parameters and derives the trust-set bounds.
    pub fn validate(&self) -> Result<TrustSetBounds, TopologyError> {
        if self.num_peers == 0 {
            return Err(TopologyError::ZeroPeers);
        }
        if self.num_byzantine > self.num_peers {
            return Err(TopologyError::TooManyByzantine {
                peers: self.num_peers,
                byzantine: self.num_byzantine,
            });
        }
        if !(self.overlap > 0.0 && self.overlap <= 1.0) {
            return Err(TopologyError::InvalidOverlap(self.overlap));
        }
        let bounds = TrustSetBounds::derive(self.num_peers, self.overlap);
        bounds.validate(self.num_peers)?;
        Ok(bounds)
    }

    /// Fraction of Byzantine peers in the population.
    pub fn byzantine_fraction(&self) -> f64 {
        self.num_byzantine as f64 / self.num_peers.max(1) as f64
    }

    /// Splits `n` draws into honest and Byzantine shares.
    pub fn split(&self, n: usize) -> (usize, usize) {
        let honest_peers = self.num_peers - self.num_byzantine;
        let honest = honest_peers * n / self.num_peers.max(1);
        (honest, n - honest)
    }
}

/// Result of a topology construction.
pub struct Topology {
    pub honest: PeerGroup,
    pub byzantine: PeerGroup,
    pub network: PeerGroup,
    /// Selector over the honest group, `None` iff the group is empty.
    pub honest_selector: Option<RankedSelector<PeerId>>,
    /// Selector over the Byzantine group, `None` iff the group is empty.
    pub byzantine_selector: Option<RankedSelector<PeerId>>,
    pub network_selector: RankedSelector<PeerId>,
    pub common_unl: PeerGroup,
    pub bounds: TrustSetBounds,
}

/// Builds Byzantine trust topologies.
pub struct TopologyBuilder {
    params: TopologyParams,
    rank_distribution: PowerLaw,
    max_tries: usize,
}

impl TopologyBuilder {
    /// Creates a builder with power-law ranks (`xmin = 1`, exponent 3).
    pub fn new(params: TopologyParams) -> Result<Self, TopologyError> {
        Ok(Self {
            params,
            rank_distribution: PowerLaw::new(1.0, 3.0)?,
            max_tries: MAX_TRIES_PER_MEMBER,
        })
    }

    #[must_use]
    pub fn with_rank_distribution(mut self, dist: PowerLaw) -> Self {
        self.rank_distribution = dist;
        self
    }

    /// Overrides [`MAX_TRIES_PER_MEMBER`].
    #[must_use]
    pub fn with_max_tries(mut self, max_tries: usize) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn params(&self) -> &TopologyParams {
        &self.params
    }

    /// Returns the trust-set bounds, if the parameters are valid.
    pub fn bounds(&self) -> Result<TrustSetBounds, TopologyError> {
        self.params.validate()
    }

    /// Creates the peer population in `peers` and wires up every peer's UNL.
    ///
    /// UNLs are first computed for all peers; trust relationships are only
    /// established once every computation succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid, or if some peer's UNL
    /// cannot be completed within the retry limit.
    pub fn build(
        &self,
        peers: &mut Peers,
        rng: &mut dyn RngCore,
    ) -> Result<Topology, TopologyError> {
        let params = &self.params;
        let bounds = params.validate()?;
        debug!(
            "building topology: {} peers, {} byzantine, overlap {:.2}, bounds {}",
            params.num_peers, params.num_byzantine, params.overlap, bounds
        );

        let honest = peers.create_group(params.num_peers - params.num_byzantine);
        let byzantine = peers.create_group(params.num_byzantine);
        let network = &honest + &byzantine;

        let dist = &self.rank_distribution;
        let honest_selector = if honest.is_empty() {
            None
        } else {
            Some(RankedSelector::with_ranks(honest.members().to_vec(), dist, rng)?)
        };
        let byzantine_selector = if byzantine.is_empty() {
            None
        } else {
            Some(RankedSelector::with_ranks(byzantine.members().to_vec(), dist, rng)?)
        };
        let network_selector = RankedSelector::with_ranks(network.members().to_vec(), dist, rng)?;

        // draws may repeat, so the common UNL is usually smaller than targeted
        let (common_honest, common_byzantine) = params.split(bounds.common_size);
        let mut common_unl = PeerGroup::new();
        for (selector, count) in [
            (&honest_selector, common_honest),
            (&byzantine_selector, common_byzantine),
        ] {
            if let Some(selector) = selector {
                for _ in 0..count {
                    common_unl = common_unl + *selector.pick(rng);
                }
            }
        }
        debug!(
            "common UNL: {} of {} targeted members, {} byzantine",
            common_unl.len(),
            bounds.common_size,
            common_unl.intersection_len(&byzantine)
        );

        let fresh_honest = honest.len() - common_unl.intersection_len(&honest);
        let fresh_byzantine = byzantine.len() - common_unl.intersection_len(&byzantine);
        let lo = bounds.min_size.saturating_sub(common_unl.len());
        let hi = bounds.max_size.saturating_sub(common_unl.len()).max(lo);

        let mut unls = Vec::with_capacity(network.len());
        for peer in &network {
            let extra = rng.random_range(lo..=hi);
            let (want_honest, want_byzantine) = params.split(extra);
            let (num_honest, num_byzantine) = spill_over(
                peer,
                (want_honest, fresh_honest),
                (want_byzantine, fresh_byzantine),
            )?;

            let mut unl = common_unl.clone();
            unl = self.extend(unl, peer, GroupKind::Honest, &honest_selector, num_honest, rng)?;
            unl = self.extend(
                unl,
                peer,
                GroupKind::Byzantine,
                &byzantine_selector,
                num_byzantine,
                rng,
            )?;
            trace!(
                "peer {peer}: UNL of {} ({} byzantine)",
                unl.len(),
                unl.intersection_len(&byzantine)
            );
            unls.push((peer, unl));
        }

        for (peer, unl) in &unls {
            let from = PeerGroup::new() + *peer;
            peers.trust_and_connect(&from, unl, params.delay);
        }

        Ok(Topology {
            honest,
            byzantine,
            network,
            honest_selector,
            byzantine_selector,
            network_selector,
            common_unl,
            bounds,
        })
    }

    /// Adds `count` members not yet in `unl`, drawn from `selector`.
    fn extend(
        &self,
        mut unl: PeerGroup,
        peer: PeerId,
        group: GroupKind,
        selector: &Option<RankedSelector<PeerId>>,
        count: usize,
        rng: &mut dyn RngCore,
    ) -> Result<PeerGroup, TopologyError> {
        if count == 0 {
            return Ok(unl);
        }
        let Some(selector) = selector else {
            return Err(TopologyError::InsufficientCandidates {
                peer,
                needed: count,
                available: 0,
            });
        };
        for _ in 0..count {
            let mut tries = 0;
            loop {
                if tries == self.max_tries {
                    return Err(TopologyError::SamplingExhausted {
                        peer,
                        group,
                        tries,
                    });
                }
                tries += 1;
                let candidate = *selector.pick(rng);
                if !unl.contains(candidate) {
                    unl = unl + candidate;
                    break;
                }
            }
        }
        Ok(unl)
    }
}

/// Moves any share exceeding its group's fresh candidates to the other group.
///
/// Takes `(wanted, available)` for the honest and the Byzantine group.
fn spill_over(
    peer: PeerId,
    (honest, fresh_honest): (usize, usize),
    (byzantine, fresh_byzantine): (usize, usize),
) -> Result<(usize, usize), TopologyError> {
    let total = honest + byzantine;
    if total > fresh_honest + fresh_byzantine {
        return Err(TopologyError::InsufficientCandidates {
            peer,
            needed: total,
            available: fresh_honest + fresh_byzantine,
        });
    }
    let honest = honest.max(total.saturating_sub(fresh_byzantine)).min(fresh_honest);
    Ok((honest, total - honest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(num_peers: usize, num_byzantine: usize, overlap: f64) -> TopologyParams {
        TopologyParams {
            num_peers,
            num_byzantine,
            overlap,
            delay: SimDuration::from_millis(200),
        }
    }

    fn build(params: TopologyParams, seed: u64) -> (Peers, Topology) {
        let mut peers = Peers::new();
        let mut rng = StdRng::seed_from_u64(seed);
        let topology = TopologyBuilder::new(params)
            .unwrap()
            .build(&mut peers, &mut rng)
            .unwrap();
        (peers, topology)
    }

    #[test]
    fn bounds() {
        let b = TrustSetBounds::derive(10, 1.0);
        assert_eq!((b.num_cnls, b.max_size, b.min_size, b.common_size), (10, 5, 5, 5));
        let b = TrustSetBounds::derive(10, 0.1);
        assert_eq!((b.max_size, b.min_size, b.common_size), (5, 2, 0));
        let b = TrustSetBounds::derive(50, 0.3);
        assert_eq!((b.max_size, b.min_size, b.common_size), (25, 12, 7));
        // decimal factors are floored without float noise
        let b = TrustSetBounds::derive(200, 0.57);
        assert_eq!(b.common_size, 57);
        let b = TrustSetBounds::derive(1, 1.0);
        assert_eq!((b.max_size, b.min_size, b.common_size), (1, 1, 1));
        assert!(b.validate(1).is_ok());
    }

    #[test]
    fn invalid_params() {
        assert_eq!(params(0, 0, 0.5).validate(), Err(TopologyError::ZeroPeers));
        assert_eq!(
            params(5, 6, 0.5).validate(),
            Err(TopologyError::TooManyByzantine {
                peers: 5,
                byzantine: 6
            })
        );
        assert!(matches!(
            params(5, 0, 0.0).validate(),
            Err(TopologyError::InvalidOverlap(_))
        ));
        assert!(matches!(
            params(5, 0, 1.5).validate(),
            Err(TopologyError::InvalidOverlap(_))
        ));
        assert!(matches!(
            params(5, 0, f64::NAN).validate(),
            Err(TopologyError::InvalidOverlap(_))
        ));
        let bounds = TrustSetBounds {
            num_cnls: 4,
            max_size: 2,
            min_size: 3,
            common_size: 1,
        };
        assert!(matches!(
            bounds.validate(4),
            Err(TopologyError::InvalidBounds {
                constraint: "min <= max",
                ..
            })
        ));
    }

    #[test]
    fn split() {
        let p = params(10, 4, 0.1);
        assert_eq!(p.split(5), (3, 2));
        assert_eq!(p.split(2), (1, 1));
        assert_eq!(params(10, 0, 0.1).split(5), (5, 0));
        assert_eq!(params(10, 10, 0.1).split(5), (0, 5));
    }

    #[test]
    fn spill() {
        assert_eq!(spill_over(0, (3, 10), (2, 10)), Ok((3, 2)));
        assert_eq!(spill_over(0, (3, 10), (2, 1)), Ok((4, 1)));
        assert_eq!(spill_over(0, (3, 1), (2, 10)), Ok((1, 4)));
        assert!(matches!(
            spill_over(0, (3, 2), (2, 2)),
            Err(TopologyError::InsufficientCandidates { needed: 5, .. })
        ));
    }

    #[test]
    fn full_overlap() {
        for seed in 0..20 {
            let (peers, topology) = build(params(10, 0, 1.0), seed);
            assert!(topology.byzantine_selector.is_none());
            assert!(!topology.common_unl.is_empty());
            let first = peers.get(0).unwrap().unl().clone();
            for peer in peers.iter() {
                assert_eq!(peer.unl().len(), 5);
                assert!(topology.common_unl.is_subset(peer.unl()));
                if topology.common_unl.len() == 5 {
                    assert_eq!(peer.unl(), &first);
                }
            }
        }
    }

    #[test]
    fn byzantine_mix() {
        for seed in 0..20 {
            let p = params(10, 4, 0.1);
            let (peers, topology) = build(p, seed);
            assert_eq!(topology.bounds.min_size, 2);
            assert_eq!(topology.bounds.max_size, 5);
            assert_eq!(topology.byzantine.len(), 4);
            for peer in peers.iter() {
                let unl = peer.unl();
                assert!((2..=5).contains(&unl.len()), "UNL size {}", unl.len());
                let byz = unl.intersection_len(&topology.byzantine) as f64;
                let expected = p.byzantine_fraction() * unl.len() as f64;
                assert!((byz - expected).abs() < 1.0, "{byz} vs {expected}");
            }
        }
    }

    #[test]
    fn bounds_hold_across_sweep() {
        for byzantine in (0..=18).step_by(2) {
            for overlap in [0.1, 0.3, 0.5, 0.7, 0.9, 1.0] {
                let (peers, topology) = build(params(50, byzantine, overlap), byzantine as u64);
                let b = topology.bounds;
                assert_eq!(peers.len(), 50);
                for peer in peers.iter() {
                    let size = peer.unl().len();
                    assert!(b.min_size <= size && size <= b.max_size);
                    assert!(topology.common_unl.is_subset(peer.unl()));
                    for member in peer.unl() {
                        assert_eq!(peer.link(member).is_some(), member != peer.id());
                    }
                }
            }
        }
    }

    #[test]
    fn all_byzantine() {
        let (peers, topology) = build(params(8, 8, 0.5), 1);
        assert!(topology.honest_selector.is_none());
        assert!(topology.honest.is_empty());
        for peer in peers.iter() {
            assert!(peer.unl().is_subset(&topology.byzantine));
        }
    }

    #[test]
    fn deterministic() {
        let (a, _) = build(params(30, 6, 0.4), 42);
        let (b, _) = build(params(30, 6, 0.4), 42);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.unl(), y.unl());
        }
    }

    #[test]
    fn exhaustion() {
        // every peer needs at least two new members, none can be found without draws
        let mut peers = Peers::new();
        let mut rng = StdRng::seed_from_u64(0);
        let builder = TopologyBuilder::new(params(10, 0, 0.1))
            .unwrap()
            .with_rank_distribution(PowerLaw::new(1.0, 2.5).unwrap())
            .with_max_tries(0);
        let res = builder.build(&mut peers, &mut rng);
        assert!(matches!(res, Err(TopologyError::SamplingExhausted { .. })));
        // no trust was established
        assert!(peers.iter().all(|p| p.unl().is_empty()));
    }
}
