// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use rand::prelude::*;
use unlsim::peer::Peers;
use unlsim::time::SimDuration;
use unlsim::topology::{TopologyBuilder, TopologyParams};

fn main() {
    divan::main();
}

fn params(num_peers: usize, overlap: f64) -> TopologyParams {
    TopologyParams {
        num_peers,
        num_byzantine: num_peers / 5,
        overlap,
        delay: SimDuration::from_millis(200),
    }
}

#[divan::bench(args = [0.1, 0.5, 0.9])]
fn build_50(bencher: divan::Bencher, overlap: f64) {
    let builder = TopologyBuilder::new(params(50, overlap)).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    bencher.bench_local(|| {
        let mut peers = Peers::new();
        builder.build(&mut peers, &mut rng).unwrap()
    });
}

#[divan::bench(args = [100, 500, 1000])]
fn build_low_overlap(bencher: divan::Bencher, num_peers: usize) {
    let builder = TopologyBuilder::new(params(num_peers, 0.1)).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    bencher.bench_local(|| {
        let mut peers = Peers::new();
        builder.build(&mut peers, &mut rng).unwrap()
    });
}
