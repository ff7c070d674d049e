// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Virtual-time event scheduler.
//!
//! The [`Scheduler`] owns a time-ordered queue of pending callbacks and is the
//! only thing in a simulation that advances the clock. It is generic over a
//! context type `C`, which every callback receives mutably alongside the
//! scheduler itself. Callbacks can therefore schedule further callbacks,
//! which is how self-perpetuating components such as traffic generators and
//! ledger rounds keep running.
//!
//! Ordering guarantees:
//! - callbacks run in non-decreasing timestamp order,
//! - callbacks with equal timestamps run in registration order,
//! - a callback never runs before its timestamp, and never runs twice.
//!
//! # Examples
//!
//! ```
//! use unlsim::scheduler::Scheduler;
//! use unlsim::time::{SimDuration, SimTime};
//!
//! let mut log = Vec::new();
//! let mut scheduler = Scheduler::<Vec<SimTime>>::new();
//! scheduler
//!     .after(SimDuration::from_millis(5), |log, s| {
//!         log.push(s.now());
//!         Ok(())
//!     })
//!     .unwrap();
//! scheduler.run_for(&mut log, SimDuration::from_secs(1)).unwrap();
//! assert_eq!(log, vec![SimTime::from_nanos(5_000_000)]);
//! ```

use std::collections::BinaryHeap;

use log::trace;
use thiserror::Error;

use crate::time::{SimDuration, SimTime};

/// Errors raised at the scheduler boundary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("cannot schedule with negative delay {0}")]
    NegativeDelay(SimDuration),
    #[error("scheduler has been shut down")]
    ShutDown,
    #[error("transaction ids exhausted")]
    TxIdsExhausted,
}

/// Deferred callback, receiving the simulation context and the scheduler.
pub type Callback<C> = Box<dyn FnOnce(&mut C, &mut Scheduler<C>) -> Result<(), SchedulerError>>;

/// A callback together with the time it is due.
struct ScheduledEvent<C> {
    time: SimTime,
    /// Registration sequence number, used as FIFO tie-breaker.
    seq: u64,
    callback: Callback<C>,
}

// Needed to turn BinaryHeap into min-heap
impl<C> Ord for ScheduledEvent<C> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.time, other.seq).cmp(&(self.time, self.seq))
    }
}
impl<C> PartialOrd for ScheduledEvent<C> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<C> PartialEq for ScheduledEvent<C> {
    fn eq(&self, other: &Self) -> bool {
        (self.time, self.seq) == (other.time, other.seq)
    }
}
impl<C> Eq for ScheduledEvent<C> {}

/// Discrete-event scheduler driving a simulation in virtual time.
pub struct Scheduler<C> {
    now: SimTime,
    pending: BinaryHeap<ScheduledEvent<C>>,
    next_seq: u64,
    executed: u64,
    shut_down: bool,
}

impl<C> Scheduler<C> {
    /// Creates a new scheduler with the clock at [`SimTime::ZERO`].
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            pending: BinaryHeap::new(),
            next_seq: 0,
            executed: 0,
            shut_down: false,
        }
    }

    /// Returns the current virtual time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Returns the number of events waiting to be executed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Returns the number of events executed so far.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Returns `true` iff [`Self::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Schedules `callback` to run when virtual time reaches `time`.
    ///
    /// A `time` in the past is clamped to [`Self::now`], so the callback runs
    /// as soon as possible instead of being dropped. It is still ordered after
    /// all callbacks already registered for the current instant.
    pub fn at<F>(&mut self, time: SimTime, callback: F) -> Result<(), SchedulerError>
    where
        F: FnOnce(&mut C, &mut Scheduler<C>) -> Result<(), SchedulerError> + 'static,
    {
        if self.shut_down {
            return Err(SchedulerError::ShutDown);
        }
        let time = time.max(self.now);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(ScheduledEvent {
            time,
            seq,
            callback: Box::new(callback),
        });
        Ok(())
    }

    /// Schedules `callback` to run `delay` after the current virtual time.
    ///
    /// Negative delays are rejected with [`SchedulerError::NegativeDelay`].
    pub fn after<F>(&mut self, delay: SimDuration, callback: F) -> Result<(), SchedulerError>
    where
        F: FnOnce(&mut C, &mut Scheduler<C>) -> Result<(), SchedulerError> + 'static,
    {
        if delay.is_negative() {
            return Err(SchedulerError::NegativeDelay(delay));
        }
        let time = self.now.saturating_add(delay);
        self.at(time, callback)
    }

    /// Executes every pending event due within the next `duration`.
    ///
    /// Events scheduled by callbacks during the run are executed too, if they
    /// fall within the window. Afterwards the clock reads `now + duration`.
    /// Returns the number of executed events.
    pub fn run_for(&mut self, ctx: &mut C, duration: SimDuration) -> Result<u64, SchedulerError> {
        if duration.is_negative() {
            return Err(SchedulerError::NegativeDelay(duration));
        }
        let end = self.now.saturating_add(duration);
        self.run_until(ctx, end)
    }

    /// Executes every pending event with a timestamp up to and including `end`.
    ///
    /// Afterwards the clock reads `end`, unless `end` is already in the past.
    /// If a callback fails, the run stops and its error is returned, with the
    /// clock at the failing event's timestamp.
    pub fn run_until(&mut self, ctx: &mut C, end: SimTime) -> Result<u64, SchedulerError> {
        let mut count = 0;
        while self.pending.peek().is_some_and(|event| event.time <= end) {
            self.step(ctx)?;
            count += 1;
        }
        self.now = self.now.max(end);
        Ok(count)
    }

    /// Executes the single earliest pending event, if any.
    ///
    /// Returns `false` iff there was nothing to execute.
    pub fn step(&mut self, ctx: &mut C) -> Result<bool, SchedulerError> {
        let Some(event) = self.pending.pop() else {
            return Ok(false);
        };
        debug_assert!(event.time >= self.now);
        self.now = event.time;
        self.executed += 1;
        trace!("executing event #{} at {}", event.seq, event.time);
        (event.callback)(ctx, self)?;
        Ok(true)
    }

    /// Tears the scheduler down.
    ///
    /// All pending events are discarded without running them and any later
    /// attempt to schedule fails with [`SchedulerError::ShutDown`].
    /// Returns the number of discarded events.
    pub fn shutdown(&mut self) -> usize {
        self.shut_down = true;
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}
