//! # riptide-transport
//!
//! Riptide pure-Rust reliable-datagram transport.
//!
//! A conversation-oriented ARQ engine layered over an unreliable, unordered
//! datagram channel: ordered, reliable, optionally-fragmented message
//! delivery with sliding-window flow control, RTT-driven retransmission,
//! fast retransmit, and Reno-style congestion control. The engine is pure
//! logic — it consumes raw datagrams through [`engine::Engine::input`] and
//! emits raw datagrams through a caller-supplied output callback. Sockets,
//! timers, and threads belong to the collaborator driving
//! [`engine::Engine::update`].
//!
//! ## Crate structure
//!
//! - [`wire`] — fixed-width segment header serialization
//! - [`pool`] — payload buffer pool, protocol clock, sequence arithmetic
//! - [`rtt`] — smoothed-RTT / RTO estimation
//! - [`congestion`] — Reno-style congestion window
//! - [`engine`] — the protocol state machine
//! - [`stats`] — per-engine statistics snapshots
//! - [`error`] — typed failure taxonomy

pub mod congestion;
pub mod engine;
pub mod error;
pub mod pool;
pub mod rtt;
pub mod stats;
pub mod wire;
