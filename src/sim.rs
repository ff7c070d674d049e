// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Simulation context and the periodic events driving a run.
//!
//! A [`Simulation`] bundles all mutable state of a single run: the peers, the
//! random number generator, the collector, and the scheduler. Everything is
//! owned explicitly, so independent simulations can run side by side.

use std::time::Instant;

use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::collector::{Collector, SimEvent};
use crate::peer::Peers;
use crate::scheduler::{Scheduler, SchedulerError};
use crate::time::{SimDuration, SimTime};

/// State every scheduled callback has access to.
pub struct SimContext<C> {
    pub peers: Peers,
    pub rng: StdRng,
    pub collector: C,
}

impl<C: Collector> SimContext<C> {
    pub fn record(&mut self, time: SimTime, event: &SimEvent) {
        self.collector.record(time, event);
    }
}

/// A single simulation run.
pub struct Simulation<C> {
    pub ctx: SimContext<C>,
    pub scheduler: Scheduler<SimContext<C>>,
}

impl<C: Collector + 'static> Simulation<C> {
    /// Creates an empty simulation, with its RNG seeded from `seed`.
    pub fn new(seed: u64, collector: C) -> Self {
        Self {
            ctx: SimContext {
                peers: Peers::new(),
                rng: StdRng::seed_from_u64(seed),
                collector,
            },
            scheduler: Scheduler::new(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    /// Runs the simulation for `duration` of virtual time.
    ///
    /// Returns the number of executed events.
    pub fn run_for(&mut self, duration: SimDuration) -> Result<u64, SchedulerError> {
        self.scheduler.run_for(&mut self.ctx, duration)
    }

    /// Makes every peer close a ledger every `interval`, starting one
    /// interval from now.
    pub fn start_ledger_rounds(&mut self, interval: SimDuration) -> Result<(), SchedulerError> {
        LedgerRounds { interval }.schedule(&mut self.scheduler)
    }

    /// Logs simulation progress every `interval` of virtual time.
    pub fn start_heartbeat(&mut self, interval: SimDuration) -> Result<(), SchedulerError> {
        Heartbeat {
            interval,
            started: Instant::now(),
        }
        .schedule(&mut self.scheduler)
    }

    /// Tears down the scheduler, discarding all pending events.
    ///
    /// Returns the number of discarded events.
    pub fn shutdown(&mut self) -> usize {
        self.scheduler.shutdown()
    }
}

/// Periodic ledger closing on all peers.
#[derive(Clone, Copy, Debug)]
struct LedgerRounds {
    interval: SimDuration,
}

impl LedgerRounds {
    fn schedule<C: Collector + 'static>(
        self,
        scheduler: &mut Scheduler<SimContext<C>>,
    ) -> Result<(), SchedulerError> {
        scheduler.after(self.interval, move |ctx, scheduler| {
            let now = scheduler.now();
            for event in ctx.peers.close_ledgers(now) {
                ctx.record(now, &event);
            }
            self.schedule(scheduler)
        })
    }
}

/// Periodic progress log, relating virtual to wall-clock time.
#[derive(Clone, Copy, Debug)]
struct Heartbeat {
    interval: SimDuration,
    started: Instant,
}

impl Heartbeat {
    fn schedule<C: 'static>(
        self,
        scheduler: &mut Scheduler<SimContext<C>>,
    ) -> Result<(), SchedulerError> {
        scheduler.after(self.interval, move |_, scheduler| {
            info!(
                "heartbeat: sim time {}, wall time {:.2} s",
                scheduler.now(),
                self.started.elapsed().as_secs_f64()
            );
            self.schedule(scheduler)
        })
    }
}
