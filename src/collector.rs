// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Collection of simulation outcomes.
//!
//! Components report what happens in the simulation as [`SimEvent`]s to a
//! [`Collector`]. After a run, collectors can print a human-readable report
//! and append a row of summary statistics to a CSV log.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;

use crate::PeerId;
use crate::peer::{Ledger, LedgerSeq, Tx, TxOrigin};
use crate::time::{SimDuration, SimTime};

/// Observable outcome of a simulation step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimEvent {
    /// A transaction was submitted to a peer.
    Submitted { peer: PeerId, tx: Tx },
    /// A transaction was injected into a peer, keyed by ledger `seq`.
    Injected { peer: PeerId, tx: Tx, seq: LedgerSeq },
    /// A peer closed a ledger.
    LedgerClosed { peer: PeerId, ledger: Ledger },
}

/// Sink for [`SimEvent`]s.
///
/// Only [`Collector::record`] is required, reporting is optional.
pub trait Collector {
    /// Records a single event, which happened at virtual time `time`.
    fn record(&mut self, time: SimTime, event: &SimEvent);

    /// Writes a human-readable summary of a run of the given `duration`.
    fn report(
        &self,
        _duration: SimDuration,
        _sink: &mut dyn io::Write,
        _verbose: bool,
    ) -> io::Result<()> {
        Ok(())
    }

    /// Appends one row of statistics for a run of the given `duration`.
    ///
    /// The row starts with `tag`. If `include_header` is set, a header row
    /// is written first. Flushing `writer` is left to the caller.
    fn write_csv<W: io::Write>(
        &self,
        _duration: SimDuration,
        _writer: &mut csv::Writer<W>,
        _tag: &str,
        _include_header: bool,
    ) -> csv::Result<()> {
        Ok(())
    }
}

impl Collector for () {
    fn record(&mut self, _time: SimTime, _event: &SimEvent) {}
}

impl<A: Collector, B: Collector> Collector for (A, B) {
    fn record(&mut self, time: SimTime, event: &SimEvent) {
        self.0.record(time, event);
        self.1.record(time, event);
    }

    fn report(
        &self,
        duration: SimDuration,
        sink: &mut dyn io::Write,
        verbose: bool,
    ) -> io::Result<()> {
        self.0.report(duration, sink, verbose)?;
        self.1.report(duration, sink, verbose)
    }

    fn write_csv<W: io::Write>(
        &self,
        duration: SimDuration,
        writer: &mut csv::Writer<W>,
        tag: &str,
        include_header: bool,
    ) -> csv::Result<()> {
        self.0.write_csv(duration, writer, tag, include_header)?;
        self.1.write_csv(duration, writer, tag, include_header)
    }
}

/// Keeps every event, in the order it was recorded.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    pub events: Vec<(SimTime, SimEvent)>,
}

impl Collector for EventLog {
    fn record(&mut self, time: SimTime, event: &SimEvent) {
        self.events.push((time, event.clone()));
    }
}

/// Statistics about transaction submission and acceptance.
#[derive(Clone, Debug, Default)]
pub struct TxCollector {
    submitted: u64,
    injected: u64,
    /// First time each transaction was seen by any peer.
    first_seen: HashMap<Tx, SimTime>,
    /// First time each transaction was included in any closed ledger.
    accepted: HashMap<Tx, SimTime>,
    latency_sum: SimDuration,
    latency_max: SimDuration,
}

impl TxCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of submit actions, counting each target peer.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Number of inject actions, counting each target peer.
    pub fn injected(&self) -> u64 {
        self.injected
    }

    /// Number of distinct transactions included in at least one ledger.
    pub fn accepted(&self) -> usize {
        self.accepted.len()
    }

    /// Number of distinct injected transactions included in at least one ledger.
    pub fn accepted_injected(&self) -> usize {
        self.accepted
            .keys()
            .filter(|tx| tx.origin == TxOrigin::Injected)
            .count()
    }

    /// Mean time from first sighting to first inclusion.
    pub fn mean_latency(&self) -> Option<SimDuration> {
        let n = self.accepted.len() as i64;
        (n > 0).then(|| SimDuration::from_nanos(self.latency_sum.as_nanos() / n))
    }

    pub fn max_latency(&self) -> SimDuration {
        self.latency_max
    }

    fn seen(&mut self, time: SimTime, tx: Tx) {
        self.first_seen.entry(tx).or_insert(time);
    }
}

impl Collector for TxCollector {
    fn record(&mut self, time: SimTime, event: &SimEvent) {
        match event {
            SimEvent::Submitted { tx, .. } => {
                self.submitted += 1;
                self.seen(time, *tx);
            }
            SimEvent::Injected { tx, .. } => {
                self.injected += 1;
                self.seen(time, *tx);
            }
            SimEvent::LedgerClosed { ledger, .. } => {
                for tx in &ledger.txs {
                    if self.accepted.contains_key(tx) {
                        continue;
                    }
                    self.accepted.insert(*tx, time);
                    let seen = self.first_seen.get(tx).copied().unwrap_or(time);
                    let latency = time - seen;
                    self.latency_sum = self.latency_sum + latency;
                    self.latency_max = self.latency_max.max(latency);
                }
            }
        }
    }

    fn report(
        &self,
        duration: SimDuration,
        sink: &mut dyn io::Write,
        verbose: bool,
    ) -> io::Result<()> {
        let secs = duration.as_secs_f64();
        writeln!(
            sink,
            "TxStats: submitted {} ({:.1}/s), injected {}, accepted {} ({:.1}/s)",
            self.submitted,
            self.submitted as f64 / secs,
            self.injected,
            self.accepted(),
            self.accepted() as f64 / secs,
        )?;
        if verbose {
            let mean = self.mean_latency().unwrap_or_default();
            writeln!(
                sink,
                "  latency mean {} / max {}, accepted injected {}, never accepted {}",
                mean,
                self.latency_max,
                self.accepted_injected(),
                self.first_seen
                    .keys()
                    .filter(|tx| !self.accepted.contains_key(tx))
                    .count(),
            )?;
        }
        Ok(())
    }

    fn write_csv<W: io::Write>(
        &self,
        duration: SimDuration,
        writer: &mut csv::Writer<W>,
        tag: &str,
        include_header: bool,
    ) -> csv::Result<()> {
        if include_header {
            writer.write_record([
                "tag",
                "duration_ms",
                "tx_submitted",
                "tx_injected",
                "tx_accepted",
                "tx_accepted_injected",
                "tx_rate_submitted",
                "tx_rate_accepted",
                "latency_mean_ms",
                "latency_max_ms",
            ])?;
        }
        let secs = duration.as_secs_f64();
        let mean = self.mean_latency().unwrap_or_default();
        writer.write_record([
            tag.to_string(),
            (duration.as_nanos() / 1_000_000).to_string(),
            self.submitted.to_string(),
            self.injected.to_string(),
            self.accepted().to_string(),
            self.accepted_injected().to_string(),
            format!("{:.3}", self.submitted as f64 / secs),
            format!("{:.3}", self.accepted() as f64 / secs),
            format!("{:.3}", mean.as_millis_f64()),
            format!("{:.3}", self.latency_max.as_millis_f64()),
        ])?;
        Ok(())
    }
}

/// Statistics about closed ledgers and whether peers agree on them.
#[derive(Clone, Debug, Default)]
pub struct LedgerCollector {
    closed: u64,
    max_seq: LedgerSeq,
    /// Last ledger closed by each peer.
    latest: BTreeMap<PeerId, Ledger>,
    interval_sum: SimDuration,
    interval_count: u64,
    /// First ledger seen for each sequence number.
    first_by_seq: BTreeMap<LedgerSeq, BTreeSet<Tx>>,
    /// Sequence numbers at which peers closed differing ledgers.
    forked: BTreeSet<LedgerSeq>,
}

impl LedgerCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of ledgers closed, over all peers.
    pub fn closed(&self) -> u64 {
        self.closed
    }

    pub fn max_seq(&self) -> LedgerSeq {
        self.max_seq
    }

    /// Number of ledger sequences for which not all peers agreed.
    pub fn branches(&self) -> usize {
        self.forked.len()
    }

    /// Returns `true` iff all peers' last closed ledgers are identical.
    pub fn synchronized(&self) -> bool {
        let mut ledgers = self.latest.values();
        let Some(first) = ledgers.next() else {
            return true;
        };
        ledgers.all(|l| l.seq == first.seq && l.txs == first.txs)
    }

    /// Mean time between consecutive ledger closes of a peer.
    pub fn mean_close_interval(&self) -> Option<SimDuration> {
        (self.interval_count > 0).then(|| {
            SimDuration::from_nanos(self.interval_sum.as_nanos() / self.interval_count as i64)
        })
    }
}

impl Collector for LedgerCollector {
    fn record(&mut self, _time: SimTime, event: &SimEvent) {
        let SimEvent::LedgerClosed { peer, ledger } = event else {
            return;
        };
        self.closed += 1;
        self.max_seq = self.max_seq.max(ledger.seq);
        if let Some(prev) = self.latest.get(peer) {
            self.interval_sum = self.interval_sum + (ledger.close_time - prev.close_time);
            self.interval_count += 1;
        }
        match self.first_by_seq.get(&ledger.seq) {
            Some(txs) if *txs != ledger.txs => {
                self.forked.insert(ledger.seq);
            }
            Some(_) => {}
            None => {
                self.first_by_seq.insert(ledger.seq, ledger.txs.clone());
            }
        }
        self.latest.insert(*peer, ledger.clone());
    }

    fn report(
        &self,
        duration: SimDuration,
        sink: &mut dyn io::Write,
        verbose: bool,
    ) -> io::Result<()> {
        let mean = self.mean_close_interval().unwrap_or_default();
        writeln!(
            sink,
            "LedgerStats: closed {} ({:.1}/s), max seq {}, mean close interval {}, branches {}, synchronized {}",
            self.closed,
            self.closed as f64 / duration.as_secs_f64(),
            self.max_seq,
            mean,
            self.branches(),
            if self.synchronized() { "Y" } else { "N" },
        )?;
        if verbose && !self.forked.is_empty() {
            let seqs: Vec<String> = self.forked.iter().map(ToString::to_string).collect();
            writeln!(sink, "  forked at {}", seqs.join(" "))?;
        }
        Ok(())
    }

    fn write_csv<W: io::Write>(
        &self,
        duration: SimDuration,
        writer: &mut csv::Writer<W>,
        tag: &str,
        include_header: bool,
    ) -> csv::Result<()> {
        if include_header {
            writer.write_record([
                "tag",
                "duration_ms",
                "ledgers_closed",
                "max_seq",
                "close_rate",
                "close_interval_mean_ms",
                "branches",
                "synchronized",
            ])?;
        }
        let mean = self.mean_close_interval().unwrap_or_default();
        writer.write_record([
            tag.to_string(),
            (duration.as_nanos() / 1_000_000).to_string(),
            self.closed.to_string(),
            self.max_seq.0.to_string(),
            format!("{:.3}", self.closed as f64 / duration.as_secs_f64()),
            format!("{:.3}", mean.as_millis_f64()),
            self.branches().to_string(),
            u8::from(self.synchronized()).to_string(),
        ])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(seq: u64, close_ns: u64, txs: &[Tx]) -> Ledger {
        Ledger {
            seq: LedgerSeq(seq),
            close_time: SimTime::from_nanos(close_ns),
            txs: txs.iter().copied().collect(),
        }
    }

    #[test]
    fn tx_collector() {
        let mut c = TxCollector::new();
        let t = SimTime::from_nanos;
        c.record(t(0), &SimEvent::Submitted { peer: 0, tx: Tx::submitted(0) });
        c.record(t(5), &SimEvent::Submitted { peer: 1, tx: Tx::submitted(1) });
        c.record(
            t(5),
            &SimEvent::Injected {
                peer: 2,
                tx: Tx::injected(0),
                seq: LedgerSeq(0),
            },
        );
        let l = ledger(1, 10, &[Tx::submitted(0), Tx::injected(0)]);
        c.record(t(10), &SimEvent::LedgerClosed { peer: 0, ledger: l.clone() });
        c.record(t(10), &SimEvent::LedgerClosed { peer: 1, ledger: l });

        assert_eq!(c.submitted(), 2);
        assert_eq!(c.injected(), 1);
        assert_eq!(c.accepted(), 2);
        assert_eq!(c.accepted_injected(), 1);
        // latencies 10 and 5
        assert_eq!(c.mean_latency(), Some(SimDuration::from_nanos(7)));
        assert_eq!(c.max_latency(), SimDuration::from_nanos(10));
    }

    #[test]
    fn ledger_collector() {
        let mut c = LedgerCollector::new();
        let a = ledger(1, 1_000, &[Tx::submitted(0)]);
        let b = ledger(1, 1_000, &[Tx::submitted(0), Tx::injected(0)]);
        c.record(SimTime::ZERO, &SimEvent::LedgerClosed { peer: 0, ledger: a.clone() });
        c.record(SimTime::ZERO, &SimEvent::LedgerClosed { peer: 1, ledger: a });
        assert!(c.synchronized());
        c.record(SimTime::ZERO, &SimEvent::LedgerClosed { peer: 2, ledger: b });
        assert!(!c.synchronized());
        assert_eq!(c.branches(), 1);

        for peer in 0..3 {
            let l = ledger(2, 2_000, &[]);
            c.record(SimTime::ZERO, &SimEvent::LedgerClosed { peer, ledger: l });
        }
        assert!(c.synchronized());
        assert_eq!(c.branches(), 1);
        assert_eq!(c.closed(), 6);
        assert_eq!(c.max_seq(), LedgerSeq(2));
        assert_eq!(c.mean_close_interval(), Some(SimDuration::from_nanos(1_000)));
    }

    #[test]
    fn csv_rows() {
        let mut c = (TxCollector::new(), LedgerCollector::new());
        c.record(SimTime::ZERO, &SimEvent::Submitted { peer: 0, tx: Tx::submitted(0) });
        let duration = SimDuration::from_secs(2);

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(vec![]);
        c.0.write_csv(duration, &mut writer, "( 10,2,0.500000)", true).unwrap();
        c.0.write_csv(duration, &mut writer, "( 10,4,0.500000)", false).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("tag,duration_ms,tx_submitted"));
        assert!(lines[1].starts_with("\"( 10,2,0.500000)\",2000,1,0,0,"));

        let mut report = Vec::new();
        c.report(duration, &mut report, true).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("TxStats: submitted 1"));
        assert!(report.contains("LedgerStats: closed 0"));
    }

    #[test]
    fn event_log() {
        let mut log = EventLog::default();
        let mut pair = (EventLog::default(), ());
        let event = SimEvent::Submitted { peer: 3, tx: Tx::submitted(9) };
        log.record(SimTime::from_nanos(1), &event);
        pair.record(SimTime::from_nanos(1), &event);
        assert_eq!(log.events, pair.0.events);
        assert_eq!(log.events, vec![(SimTime::from_nanos(1), event)]);
    }
}
