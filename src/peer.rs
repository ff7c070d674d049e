// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Simulated peers of a federated consensus network.
//!
//! A [`Peer`] owns its trust set (UNL), its network links, and its queues of
//! pending transactions. All peers of a simulation live in one [`Peers`]
//! arena and are addressed by [`PeerId`].
//!
//! Ledger closing here is a stand-in for the real consensus protocol: every
//! round each peer closes a ledger from the transactions its trusted peers
//! have seen, plus whatever was injected into it directly. This is enough to
//! observe how injected transactions make ledgers diverge.

mod group;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use log::trace;

pub use self::group::PeerGroup;
use crate::PeerId;
use crate::collector::SimEvent;
use crate::time::{SimDuration, SimTime};

/// Where a transaction entered the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TxOrigin {
    /// Sent to a peer as if externally originated.
    Submitted,
    /// Placed directly into a peer's injection queue.
    Injected,
}

/// Simulated transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tx {
    pub origin: TxOrigin,
    pub id: u32,
}

impl Tx {
    pub const fn submitted(id: u32) -> Self {
        Self {
            origin: TxOrigin::Submitted,
            id,
        }
    }

    pub const fn injected(id: u32) -> Self {
        Self {
            origin: TxOrigin::Injected,
            id,
        }
    }
}

impl Display for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.origin {
            TxOrigin::Submitted => write!(f, "tx{}", self.id),
            TxOrigin::Injected => write!(f, "itx{}", self.id),
        }
    }
}

/// Ledger sequence number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LedgerSeq(pub u64);

impl LedgerSeq {
    pub const GENESIS: Self = Self(0);

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for LedgerSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A closed ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Ledger {
    pub seq: LedgerSeq,
    pub close_time: SimTime,
    pub txs: BTreeSet<Tx>,
}

impl Ledger {
    pub const fn seq(&self) -> LedgerSeq {
        self.seq
    }
}

/// A single simulated peer.
#[derive(Clone, Debug)]
pub struct Peer {
    id: PeerId,
    unl: PeerGroup,
    links: BTreeMap<PeerId, SimDuration>,
    open_txs: BTreeSet<Tx>,
    tx_injections: BTreeMap<LedgerSeq, Vec<Tx>>,
    last_closed: Ledger,
}

impl Peer {
    fn new(id: PeerId) -> Self {
        Self {
            id,
            unl: PeerGroup::new(),
            links: BTreeMap::new(),
            open_txs: BTreeSet::new(),
            tx_injections: BTreeMap::new(),
            last_closed: Ledger::default(),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Returns the peer's trust set.
    pub fn unl(&self) -> &PeerGroup {
        &self.unl
    }

    /// Returns the delay of the link to `other`, if connected.
    pub fn link(&self, other: PeerId) -> Option<SimDuration> {
        self.links.get(&other).copied()
    }

    pub fn links(&self) -> impl Iterator<Item = (PeerId, SimDuration)> + '_ {
        self.links.iter().map(|(id, d)| (*id, *d))
    }

    pub fn last_closed_ledger(&self) -> &Ledger {
        &self.last_closed
    }

    /// Returns the transactions waiting for the next ledger close.
    pub fn open_txs(&self) -> &BTreeSet<Tx> {
        &self.open_txs
    }

    /// Returns all queued injections, keyed by the ledger they target.
    pub fn tx_injections(&self) -> &BTreeMap<LedgerSeq, Vec<Tx>> {
        &self.tx_injections
    }

    /// Accepts an externally originated transaction.
    ///
    /// Returns `false` if the transaction was already pending.
    pub fn submit(&mut self, tx: Tx) -> bool {
        self.open_txs.insert(tx)
    }

    /// Queues `tx` for inclusion on top of the current last closed ledger,
    /// bypassing the open transaction set.
    ///
    /// Returns the ledger sequence the injection is keyed by.
    pub fn inject(&mut self, tx: Tx) -> LedgerSeq {
        let seq = self.last_closed.seq();
        self.tx_injections.entry(seq).or_default().push(tx);
        seq
    }

    /// Adds `other` to this peer's trust set.
    pub fn trust(&mut self, other: PeerId) {
        let unl = std::mem::take(&mut self.unl);
        self.unl = unl + other;
    }

    /// Records a link to `other` with the given one-way delay.
    ///
    /// Links to self are ignored.
    pub fn connect(&mut self, other: PeerId, delay: SimDuration) {
        if other != self.id {
            self.links.insert(other, delay);
        }
    }
}

/// Arena of all peers of a simulation.
#[derive(Clone, Debug, Default)]
pub struct Peers {
    peers: Vec<Peer>,
}

impl Peers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `n` new peers, with consecutive identities.
    pub fn create_group(&mut self, n: usize) -> PeerGroup {
        let first = self.peers.len() as PeerId;
        let ids = first..first + n as PeerId;
        self.peers.extend(ids.clone().map(Peer::new));
        ids.collect()
    }

    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(id as usize)
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(id as usize)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    /// Makes every peer in `from` trust every peer in `to`, and connects each
    /// such pair in both directions with the given `delay`.
    ///
    /// Identities without a peer in this arena are skipped.
    pub fn trust_and_connect(&mut self, from: &PeerGroup, to: &PeerGroup, delay: SimDuration) {
        for a in from {
            for b in to {
                let Some(peer) = self.get_mut(a) else {
                    break;
                };
                peer.trust(b);
                peer.connect(b, delay);
                if let Some(other) = self.get_mut(b) {
                    other.connect(a, delay);
                }
            }
        }
    }

    /// Closes one ledger on every peer.
    ///
    /// Each new ledger contains the open transactions of the peer itself and
    /// of every peer in its UNL, plus the peer's own injections keyed by its
    /// previous ledger. All ledgers are computed from the same snapshot, then
    /// applied. Returns one [`SimEvent::LedgerClosed`] per peer.
    pub fn close_ledgers(&mut self, now: SimTime) -> Vec<SimEvent> {
        let ledgers: Vec<Ledger> = self
            .peers
            .iter()
            .map(|peer| {
                let mut txs = peer.open_txs.clone();
                for member in &peer.unl {
                    if let Some(trusted) = self.get(member) {
                        txs.extend(trusted.open_txs.iter().copied());
                    }
                }
                let seq = peer.last_closed.seq();
                if let Some(injected) = peer.tx_injections.get(&seq) {
                    txs.extend(injected.iter().copied());
                }
                Ledger {
                    seq: seq.next(),
                    close_time: now,
                    txs,
                }
            })
            .collect();

        let mut events = Vec::with_capacity(ledgers.len());
        for (peer, ledger) in self.peers.iter_mut().zip(ledgers) {
            let prev = peer.last_closed.seq();
            peer.tx_injections.remove(&prev);
            peer.open_txs.retain(|tx| !ledger.txs.contains(tx));
            trace!(
                "peer {} closed ledger {} with {} txs",
                peer.id,
                ledger.seq,
                ledger.txs.len()
            );
            events.push(SimEvent::LedgerClosed {
                peer: peer.id,
                ledger: ledger.clone(),
            });
            peer.last_closed = ledger;
        }
        events
    }
}
