//! A standalone IPv4 datagram reassembly engine.
//!
//! Buffers incoming IP fragments, joins overlapping and out-of-order pieces
//! into original datagrams, and enforces memory, timing, and hash-flooding
//! limits against adversarial or malformed input. Ported from the reassembly
//! procedure of RFC791 section 3.2 as implemented by the Linux kernel's
//! `net/ipv4/ip_fragment.c`.
//!
//! The input path that parses raw packets into [`RawFragment`]s, delivery of
//! a reassembled [`Datagram`] to upper-layer protocols, and ICMP emission are
//! all the caller's responsibility; this crate only implements the core.

pub mod checksum;
pub mod config;
pub mod engine;
pub mod error;
mod fragment_list;
mod hash;
mod memory;
pub mod notifier;
pub mod queue;
mod table;

pub mod fragment;
pub mod key;
pub mod stats;

pub use checksum::ChecksumState;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{DropReason, EngineError, IngestResult};
pub use fragment::{Datagram, RawFragment};
pub use key::ReassemblyKey;
pub use notifier::{NullNotifier, Notifier};
pub use stats::StatsSnapshot;
