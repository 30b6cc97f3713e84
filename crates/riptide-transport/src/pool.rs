//! # Payload Pool & Protocol Clock
//!
//! A bounded free list of `BytesMut` payload buffers keeps the steady-state
//! send and receive paths off the allocator. Capacities round up to the next
//! power of two; buffers released while the list is full are simply dropped.
//!
//! Pooling is an allocator optimization, not protocol behavior — an engine
//! behaves identically with a zero-capacity pool. The pool is owned by its
//! engine; sharing one across engines means serializing access externally,
//! matching the engine's own single-threaded contract.
//!
//! This module also hosts the engine-relative millisecond clock and the
//! wrapping sequence/time comparison helpers the state machine leans on.

use bytes::BytesMut;
use quanta::Instant;

/// Default bound on the free list.
pub const DEFAULT_POOL_LIMIT: usize = 200;

// ─── BufferPool ──────────────────────────────────────────────────────────────

/// Bounded free list of payload buffers.
pub struct BufferPool {
    free: Vec<BytesMut>,
    limit: usize,
}

impl BufferPool {
    pub fn new(limit: usize) -> Self {
        BufferPool {
            free: Vec::with_capacity(limit.min(DEFAULT_POOL_LIMIT)),
            limit,
        }
    }

    /// A cleared buffer with at least `capacity` bytes available, reused
    /// from the free list when possible. Capacity rounds up to the next
    /// power of two so repeated acquire/release cycles converge on a small
    /// set of sizes.
    pub fn acquire(&mut self, capacity: usize) -> BytesMut {
        let capacity = capacity.next_power_of_two();
        match self.free.pop() {
            Some(mut buf) => {
                if buf.capacity() < capacity {
                    buf.reserve(capacity);
                }
                buf
            }
            None => BytesMut::with_capacity(capacity),
        }
    }

    /// Return a buffer to the free list, or drop it when the list is full.
    pub fn release(&mut self, mut buf: BytesMut) {
        if self.free.len() < self.limit {
            buf.clear();
            self.free.push(buf);
        }
    }

    /// Buffers currently parked in the free list.
    pub fn parked(&self) -> usize {
        self.free.len()
    }
}

/// Append `bytes`, doubling capacity to the next power of two when the spare
/// room runs out.
pub fn append(buf: &mut BytesMut, bytes: &[u8]) {
    let needed = buf.len() + bytes.len();
    if needed > buf.capacity() {
        buf.reserve(needed.next_power_of_two() - buf.len());
    }
    buf.extend_from_slice(bytes);
}

// ─── ProtocolClock ───────────────────────────────────────────────────────────

/// Engine-relative millisecond clock. Wraps every ~49.7 days; all consumers
/// compare timestamps through [`time_delta`], which tolerates the wrap.
pub struct ProtocolClock {
    epoch: Instant,
}

impl ProtocolClock {
    pub fn new() -> Self {
        ProtocolClock {
            epoch: Instant::now(),
        }
    }

    /// Milliseconds since the engine was created, truncated to 32 bits.
    pub fn now_ms(&self) -> u32 {
        (self.epoch.elapsed().as_millis() & 0xFFFF_FFFF) as u32
    }
}

impl Default for ProtocolClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Wrapping Comparisons ────────────────────────────────────────────────────

/// Signed distance from `earlier` to `later` under wrapping arithmetic.
#[inline]
pub fn time_delta(later: u32, earlier: u32) -> i32 {
    later.wrapping_sub(earlier) as i32
}

/// Whether sequence number `a` precedes `b`, tolerating wrap-around.
#[inline]
pub fn seq_before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}
