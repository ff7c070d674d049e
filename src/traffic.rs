// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Self-rescheduling transaction generators.
//!
//! A [`TrafficGenerator`] fires repeatedly at stochastic intervals. On every
//! firing it resolves its targets through a [`TargetSelector`] and applies a
//! [`TxAction`] with a fresh transaction to each of them. It keeps
//! rescheduling itself until a firing observes that the stop time has been
//! reached.
//!
//! The four classic variants are combinations of the two selectors and the
//! two actions:
//!
//! | | one ranked peer | every peer of a group |
//! |---|---|---|
//! | [`Submit`] | [`TrafficGenerator::submitter`] | [`TrafficGenerator::sybil_submitter`] |
//! | [`Inject`] | [`TrafficGenerator::injector`] | [`TrafficGenerator::sybil_injector`] |

use std::marker::PhantomData;

use log::trace;
use rand::prelude::*;
use smallvec::{SmallVec, smallvec};

use crate::PeerId;
use crate::collector::{Collector, SimEvent};
use crate::peer::{Peer, PeerGroup, Tx};
use crate::sampling::RankedSelector;
use crate::scheduler::{Scheduler, SchedulerError};
use crate::sim::SimContext;
use crate::time::{AsSimDuration, SimTime};

/// Resolves the peers a single firing is applied to.
pub trait TargetSelector {
    fn targets(&self, rng: &mut dyn RngCore) -> SmallVec<[PeerId; 1]>;
}

impl TargetSelector for RankedSelector<PeerId> {
    fn targets(&self, rng: &mut dyn RngCore) -> SmallVec<[PeerId; 1]> {
        smallvec![*self.pick(rng)]
    }
}

impl TargetSelector for PeerGroup {
    fn targets(&self, _rng: &mut dyn RngCore) -> SmallVec<[PeerId; 1]> {
        self.iter().collect()
    }
}

/// What a firing does to each target peer.
pub trait TxAction {
    /// Creates the transaction with identifier `id`.
    fn tx(&self, id: u32) -> Tx;

    /// Applies the action to `peer`, returning what happened.
    fn apply(&self, peer: &mut Peer, tx: Tx) -> SimEvent;
}

/// Sends the transaction to the peer, as if externally originated.
#[derive(Clone, Copy, Debug, Default)]
pub struct Submit;

impl TxAction for Submit {
    fn tx(&self, id: u32) -> Tx {
        Tx::submitted(id)
    }

    fn apply(&self, peer: &mut Peer, tx: Tx) -> SimEvent {
        peer.submit(tx);
        SimEvent::Submitted { peer: peer.id(), tx }
    }
}

/// Places the transaction into the peer's injection queue, keyed by its
/// last closed ledger.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inject;

impl TxAction for Inject {
    fn tx(&self, id: u32) -> Tx {
        Tx::injected(id)
    }

    fn apply(&self, peer: &mut Peer, tx: Tx) -> SimEvent {
        let seq = peer.inject(tx);
        SimEvent::Injected {
            peer: peer.id(),
            tx,
            seq,
        }
    }
}

/// Periodic stochastic transaction generator.
///
/// `D` is the inter-arrival distribution, producing values of type `T` that
/// are converted to virtual time via [`AsSimDuration`].
pub struct TrafficGenerator<S, A, D, T = f64> {
    /// `None` once `u32::MAX` has been handed out.
    next_id: Option<u32>,
    start: SimTime,
    stop: SimTime,
    selector: S,
    action: A,
    distribution: D,
    _sample: PhantomData<fn() -> T>,
}

impl<S, A, D, T> TrafficGenerator<S, A, D, T>
where
    S: TargetSelector + 'static,
    A: TxAction + 'static,
    D: Distribution<T> + 'static,
    T: AsSimDuration + 'static,
{
    pub fn new(distribution: D, start: SimTime, stop: SimTime, selector: S, action: A) -> Self {
        Self {
            next_id: Some(0),
            start,
            stop,
            selector,
            action,
            distribution,
            _sample: PhantomData,
        }
    }

    /// Hands the generator over to `scheduler`, with its first firing at the
    /// start time.
    pub fn spawn<C: Collector + 'static>(
        self,
        scheduler: &mut Scheduler<SimContext<C>>,
    ) -> Result<(), SchedulerError> {
        scheduler.at(self.start, move |ctx, scheduler| self.fire(ctx, scheduler))
    }

    fn fire<C: Collector + 'static>(
        mut self,
        ctx: &mut SimContext<C>,
        scheduler: &mut Scheduler<SimContext<C>>,
    ) -> Result<(), SchedulerError> {
        let now = scheduler.now();
        let id = self.next_id.ok_or(SchedulerError::TxIdsExhausted)?;
        self.next_id = id.checked_add(1);
        let tx = self.action.tx(id);
        for target in self.selector.targets(&mut ctx.rng) {
            let Some(peer) = ctx.peers.get_mut(target) else {
                continue;
            };
            let event = self.action.apply(peer, tx);
            ctx.record(now, &event);
        }
        trace!("fired {tx} at {now}");

        if now < self.stop {
            let interval = self.distribution.sample(&mut ctx.rng).as_sim_duration();
            scheduler.after(interval, move |ctx, scheduler| self.fire(ctx, scheduler))?;
        }
        Ok(())
    }
}

impl<D: Distribution<f64> + 'static> TrafficGenerator<RankedSelector<PeerId>, Submit, D> {
    /// Submits each transaction to one rank-selected peer.
    pub fn submitter(
        distribution: D,
        start: SimTime,
        stop: SimTime,
        selector: RankedSelector<PeerId>,
    ) -> Self {
        Self::new(distribution, start, stop, selector, Submit)
    }
}

impl<D: Distribution<f64> + 'static> TrafficGenerator<RankedSelector<PeerId>, Inject, D> {
    /// Injects each transaction into one rank-selected peer.
    pub fn injector(
        distribution: D,
        start: SimTime,
        stop: SimTime,
        selector: RankedSelector<PeerId>,
    ) -> Self {
        Self::new(distribution, start, stop, selector, Inject)
    }
}

impl<D: Distribution<f64> + 'static> TrafficGenerator<PeerGroup, Submit, D> {
    /// Submits each transaction to every peer of `group` at once.
    pub fn sybil_submitter(
        distribution: D,
        start: SimTime,
        stop: SimTime,
        group: PeerGroup,
    ) -> Self {
        Self::new(distribution, start, stop, group, Submit)
    }
}

impl<D: Distribution<f64> + 'static> TrafficGenerator<PeerGroup, Inject, D> {
    /// Injects each transaction into every peer of `group` at once.
    pub fn sybil_injector(
        distribution: D,
        start: SimTime,
        stop: SimTime,
        group: PeerGroup,
    ) -> Self {
        Self::new(distribution, start, stop, group, Inject)
    }
}

#[cfg(test)]
mod tests {
    use rand::distr::Uniform;

    use super::*;
    use crate::collector::EventLog;
    use crate::sampling::{Constant, InterArrival, InterArrivalKind, Rate};
    use crate::sim::Simulation;
    use crate::time::SimDuration;

    fn secs(s: u64) -> SimTime {
        SimTime::from_nanos(s * 1_000_000_000)
    }

    fn fired(log: &EventLog) -> Vec<(SimTime, PeerId, Tx)> {
        log.events
            .iter()
            .filter_map(|(time, event)| match event {
                SimEvent::Submitted { peer, tx } | SimEvent::Injected { peer, tx, .. } => {
                    Some((*time, *peer, *tx))
                }
                SimEvent::LedgerClosed { .. } => None,
            })
            .collect()
    }

    #[test]
    fn submitter_firing_count() {
        let mut sim = Simulation::new(1, EventLog::default());
        let group = sim.ctx.peers.create_group(20);
        let selector = RankedSelector::new(group.members().to_vec(), vec![1.0; 20]).unwrap();
        let rate = Rate::new(100, SimDuration::from_millis(1000)).unwrap();
        let duration = SimDuration::from_secs(120);
        let quiet = SimDuration::from_secs(10);
        let start = sim.now().saturating_add(quiet);
        let stop = sim.now().saturating_add(duration - quiet);

        let dist = Constant(rate.inv());
        TrafficGenerator::submitter(dist, start, stop, selector)
            .spawn(&mut sim.scheduler)
            .unwrap();
        sim.run_for(duration).unwrap();

        let fired = fired(&sim.ctx.collector);
        // one firing at 10 s, then every 10 ms until the first firing at or after 110 s
        assert_eq!(fired.len(), 10_001);
        assert_eq!(fired.first().unwrap().0, secs(10));
        assert_eq!(fired.last().unwrap().0, secs(110));
        assert!(fired.iter().all(|(t, _, _)| *t >= start));
        for (i, (_, _, tx)) in fired.iter().enumerate() {
            assert_eq!(*tx, Tx::submitted(i as u32));
        }
        assert_eq!(sim.scheduler.pending(), 0);
    }

    #[test]
    fn poisson_firing_count() {
        let mut sim = Simulation::new(2, EventLog::default());
        let group = sim.ctx.peers.create_group(5);
        let selector = RankedSelector::new(group.members().to_vec(), vec![1.0; 5]).unwrap();
        let rate = Rate::new(100, SimDuration::from_millis(1000)).unwrap();
        let dist = InterArrival::new(InterArrivalKind::Poisson, rate).unwrap();
        TrafficGenerator::submitter(dist, secs(10), secs(110), selector)
            .spawn(&mut sim.scheduler)
            .unwrap();
        sim.run_for(SimDuration::from_secs(120)).unwrap();

        // 10_000 expected, standard deviation 100
        let n = fired(&sim.ctx.collector).len();
        assert!((9_500..=10_500).contains(&n), "{n} firings");
    }

    #[test]
    fn last_firing_before_stop() {
        let mut sim = Simulation::new(3, EventLog::default());
        let group = sim.ctx.peers.create_group(1);
        let selector = RankedSelector::new(group.members().to_vec(), vec![1.0]).unwrap();
        // 3 s interval: fires at 1, 4, 7 and then 10, which is past the stop time
        TrafficGenerator::submitter(Constant(3e9), secs(1), secs(8), selector)
            .spawn(&mut sim.scheduler)
            .unwrap();
        sim.run_for(SimDuration::from_secs(60)).unwrap();
        let times: Vec<_> = fired(&sim.ctx.collector).iter().map(|f| f.0).collect();
        assert_eq!(times, vec![secs(1), secs(4), secs(7), secs(10)]);
    }

    #[test]
    fn sybil_fires_once_per_tick() {
        let mut sim = Simulation::new(4, EventLog::default());
        let group = sim.ctx.peers.create_group(3);
        TrafficGenerator::sybil_injector(Constant(1e9), secs(0), secs(2), group.clone())
            .spawn(&mut sim.scheduler)
            .unwrap();
        sim.run_for(SimDuration::from_secs(5)).unwrap();

        let fired = fired(&sim.ctx.collector);
        // ticks at 0, 1 and 2 s, each hitting all three peers with the same id
        assert_eq!(fired.len(), 9);
        for (tick, chunk) in fired.chunks(3).enumerate() {
            let peers: Vec<_> = chunk.iter().map(|f| f.1).collect();
            assert_eq!(peers, group.members());
            assert!(chunk.iter().all(|f| f.2 == Tx::injected(tick as u32)));
            assert!(chunk.iter().all(|f| f.0 == secs(tick as u64)));
        }
        for id in &group {
            let peer = sim.ctx.peers.get(id).unwrap();
            let queued: usize = peer.tx_injections().values().map(Vec::len).sum();
            assert_eq!(queued, 3);
        }
    }

    #[test]
    fn sybil_submitter_and_injector() {
        let mut sim = Simulation::new(5, EventLog::default());
        let honest = sim.ctx.peers.create_group(2);
        let byzantine = sim.ctx.peers.create_group(2);
        let selector = RankedSelector::new(byzantine.members().to_vec(), vec![1.0, 1.0]).unwrap();
        TrafficGenerator::sybil_submitter(Constant(5e8), secs(0), secs(1), honest.clone())
            .spawn(&mut sim.scheduler)
            .unwrap();
        TrafficGenerator::injector(Constant(5e8), secs(0), secs(1), selector)
            .spawn(&mut sim.scheduler)
            .unwrap();
        sim.run_for(SimDuration::from_secs(1)).unwrap();

        let events = &sim.ctx.collector.events;
        let count = |f: fn(&SimEvent) -> bool| events.iter().filter(|(_, e)| f(e)).count();
        let submitted = count(|e| matches!(e, SimEvent::Submitted { .. }));
        let injected = count(|e| matches!(e, SimEvent::Injected { .. }));
        assert_eq!(submitted, 3 * honest.len());
        assert_eq!(injected, 3);
        for (_, event) in events {
            if let SimEvent::Injected { peer, .. } = event {
                assert!(byzantine.contains(*peer));
            }
        }
    }

    #[test]
    fn integer_intervals() {
        let mut sim = Simulation::new(6, EventLog::default());
        let group = sim.ctx.peers.create_group(1);
        let dist = Uniform::new_inclusive(1_000u64, 2_000u64).unwrap();
        let stop = SimTime::from_nanos(10_000_000);
        TrafficGenerator::<_, _, _, u64>::new(dist, SimTime::ZERO, stop, group, Submit)
            .spawn(&mut sim.scheduler)
            .unwrap();
        sim.run_for(SimDuration::from_secs(1)).unwrap();

        let fired = fired(&sim.ctx.collector);
        assert!((5_000..=10_001).contains(&fired.len()));
        for pair in fired.windows(2) {
            let gap = (pair[1].0 - pair[0].0).as_nanos();
            assert!((1_000..=2_000).contains(&gap));
            assert!(pair[0].2.id < pair[1].2.id);
        }
    }

    #[test]
    fn negative_interval_aborts_run() {
        let mut sim = Simulation::new(7, ());
        let group = sim.ctx.peers.create_group(1);
        TrafficGenerator::sybil_submitter(Constant(-1.0e6), secs(0), secs(1), group)
            .spawn(&mut sim.scheduler)
            .unwrap();
        let res = sim.run_for(SimDuration::from_secs(1));
        assert_eq!(
            res,
            Err(SchedulerError::NegativeDelay(SimDuration::from_millis(-1)))
        );
    }

    #[test]
    fn exhausted_ids_abort_run() {
        let mut sim = Simulation::new(7, EventLog::default());
        let group = sim.ctx.peers.create_group(1);
        let mut generator =
            TrafficGenerator::sybil_submitter(Constant(1.0e6), secs(0), secs(1), group);
        generator.next_id = Some(u32::MAX - 1);
        generator.spawn(&mut sim.scheduler).unwrap();
        let res = sim.run_for(SimDuration::from_secs(1));
        assert_eq!(res, Err(SchedulerError::TxIdsExhausted));

        // the last id is still handed out, exactly once
        let ids: Vec<u32> = fired(&sim.ctx.collector).iter().map(|(_, _, tx)| tx.id).collect();
        assert_eq!(ids, vec![u32::MAX - 1, u32::MAX]);
    }

    #[test]
    fn deterministic() {
        let run = |seed| {
            let mut sim = Simulation::new(seed, EventLog::default());
            let group = sim.ctx.peers.create_group(10);
            let ranks = (1..=10).map(f64::from).collect();
            let selector = RankedSelector::new(group.members().to_vec(), ranks).unwrap();
            let rate = Rate::new(50, SimDuration::from_secs(1)).unwrap();
            let dist = InterArrival::new(InterArrivalKind::Poisson, rate).unwrap();
            TrafficGenerator::submitter(dist, secs(0), secs(5), selector)
                .spawn(&mut sim.scheduler)
                .unwrap();
            sim.run_for(SimDuration::from_secs(10)).unwrap();
            fired(&sim.ctx.collector)
        };
        assert_eq!(run(11), run(11));
        assert_ne!(run(11), run(12));
    }
}
