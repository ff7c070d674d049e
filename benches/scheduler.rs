// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use divan::counter::ItemsCount;
use rand::prelude::*;
use unlsim::scheduler::{Scheduler, SchedulerError};
use unlsim::time::SimDuration;

fn main() {
    divan::main();
}

#[divan::bench(args = [1_000, 10_000, 100_000])]
fn random_order(bencher: divan::Bencher, n: u64) {
    bencher
        .counter(ItemsCount::new(n))
        .with_inputs(|| {
            let mut rng = StdRng::seed_from_u64(0);
            let mut scheduler = Scheduler::<u64>::new();
            for _ in 0..n {
                let delay = SimDuration::from_nanos(rng.random_range(0..1_000_000_000));
                let callback = |count: &mut u64, _: &mut Scheduler<u64>| {
                    *count += 1;
                    Ok(())
                };
                scheduler.after(delay, callback).unwrap();
            }
            scheduler
        })
        .bench_values(|mut scheduler| {
            let mut count = 0;
            scheduler
                .run_for(&mut count, SimDuration::from_secs(1))
                .unwrap();
            assert_eq!(count, n);
        });
}

#[divan::bench(args = [1_000, 100_000])]
fn self_rescheduling(bencher: divan::Bencher, n: u64) {
    fn tick(count: &mut u64, scheduler: &mut Scheduler<u64>) -> Result<(), SchedulerError> {
        *count += 1;
        scheduler.after(SimDuration::from_millis(1), tick)
    }

    bencher.counter(ItemsCount::new(n)).bench(|| {
        let mut scheduler = Scheduler::new();
        let mut count = 0;
        scheduler.after(SimDuration::ZERO, tick).unwrap();
        // events at 0, 1, ..., n - 1 ms
        scheduler
            .run_for(&mut count, SimDuration::from_millis(n as i64 - 1))
            .unwrap();
        assert_eq!(count, n);
    });
}
