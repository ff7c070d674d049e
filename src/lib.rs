// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! UNL overlap simulator.
//!
//! Discrete-event simulation of a peer network where every peer trusts a
//! unique node list (UNL). The main use is a Byzantine sensitivity study:
//! sweeping over the number of Byzantine peers and the overlap between UNLs,
//! and measuring how often honest peers end up on different ledger branches.
//!
//! The building blocks are:
//! - [`scheduler`]: virtual-time event queue,
//! - [`sampling`]: rank-weighted selection and distributions,
//! - [`peer`]: peers, their trust relations and ledgers,
//! - [`topology`]: construction of overlapping UNLs,
//! - [`traffic`]: transaction generators,
//! - [`collector`]: statistics gathering and reporting,
//! - [`study`]: the parameter sweep itself.

#![deny(rustdoc::broken_intra_doc_links)]

pub mod collector;
pub mod config;
pub mod logging;
pub mod peer;
pub mod sampling;
pub mod scheduler;
pub mod sim;
pub mod study;
pub mod time;
pub mod topology;
pub mod traffic;

/// Peer ID number type.
pub type PeerId = u32;

pub use self::collector::{Collector, LedgerCollector, SimEvent, TxCollector};
pub use self::config::{StudyConfig, SweepParams};
pub use self::peer::{Peer, PeerGroup, Peers};
pub use self::scheduler::Scheduler;
pub use self::sim::Simulation;
pub use self::study::Study;
pub use self::time::{SimDuration, SimTime};
pub use self::topology::{Topology, TopologyBuilder};
