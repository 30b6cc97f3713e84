//! # Error Taxonomy
//!
//! Typed failures for the transport crate, split by who caused them:
//!
//! - [`SendError`] / [`ConfigError`] — caller misuse, surfaced synchronously
//!   and never retried internally.
//! - [`DecodeError`] / [`InputError`] — malformed datagrams; processing of
//!   the offending datagram stops at the first bad segment, segments decoded
//!   earlier in the same call stay applied.
//! - [`RecvError`] — flow conditions, expected and recoverable ("try again
//!   after more input"), not failures.
//!
//! Loss and retransmission are never surfaced as errors; they are absorbed
//! by the RTO and fast-retransmit machinery.

use thiserror::Error;

use crate::wire::{HEADER_LEN, MAX_FRAGMENTS};

/// Rejections from [`crate::engine::Engine::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// Zero-length messages carry no information the protocol can deliver.
    #[error("cannot send an empty message")]
    EmptyMessage,

    /// The fragment index on the wire is a single byte.
    #[error("message needs {fragments} fragments, limit is {}", MAX_FRAGMENTS)]
    TooManyFragments { fragments: usize },
}

/// Flow conditions from [`crate::engine::Engine::recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvError {
    /// The ready queue is empty or the next message is still missing
    /// fragments.
    #[error("no complete message available")]
    NoData,

    /// The destination buffer is smaller than the next message. Nothing was
    /// consumed; retry with at least `required` bytes.
    #[error("buffer of {provided} bytes too small for {required}-byte message")]
    BufferTooSmall { required: usize, provided: usize },
}

/// Wire-level decode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("datagram truncated: {remaining} bytes left, header needs {}", HEADER_LEN)]
    TruncatedHeader { remaining: usize },

    #[error("payload declared {declared} bytes but only {remaining} remain")]
    TruncatedPayload { declared: usize, remaining: usize },

    #[error("unrecognized command byte {0:#04x}")]
    UnknownCommand(u8),
}

/// Failures from [`crate::engine::Engine::input`]. Any of these aborts the
/// rest of the datagram that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The datagram belongs to a different conversation.
    #[error("conversation mismatch: ours {ours}, datagram {theirs}")]
    ConversationMismatch { ours: u32, theirs: u32 },
}

/// Rejections from the engine configuration setters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("mtu of {0} bytes is below the {floor}-byte floor", floor = crate::engine::MIN_MTU)]
    MtuTooSmall(usize),

    /// The reserved prefix plus the segment header must leave room for at
    /// least one payload byte per segment.
    #[error("reserving {reserved} bytes leaves no payload room in a {mtu}-byte mtu")]
    ReserveTooLarge { reserved: usize, mtu: usize },

    #[error("window sizes must be nonzero")]
    ZeroWindow,

    #[error("flush interval of {0} ms is outside 10..=5000")]
    IntervalOutOfRange(u32),
}
