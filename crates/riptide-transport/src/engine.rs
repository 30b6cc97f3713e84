//! # Protocol Engine
//!
//! The per-conversation ARQ state machine. Pure logic — no sockets, no
//! timers, no threads. The collaborator owns all I/O and scheduling:
//!
//! 1. application data enters through [`Engine::send`] and leaves through
//!    [`Engine::recv`];
//! 2. raw datagrams from the peer are fed to [`Engine::input`];
//! 3. a periodic tick (10–100 ms) calls [`Engine::update`], which drives
//!    [`Engine::flush`] on the configured cadence;
//! 4. every outbound datagram is pushed through the output callback, which
//!    must not block.
//!
//! Four segment containers carry the protocol state: the unsent queue, the
//! in-flight buffer (ordered by sequence number, acknowledged segments
//! marked in place and pruned from the front as the unacknowledged base
//! advances), the reorder buffer, and the ready queue that `recv` drains.

use std::collections::VecDeque;

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use crate::congestion::RenoController;
use crate::error::{ConfigError, InputError, RecvError, SendError};
use crate::pool::{self, seq_before, time_delta, BufferPool, ProtocolClock, DEFAULT_POOL_LIMIT};
use crate::rtt::{RttEstimator, RTO_MIN, RTO_MIN_NODELAY};
use crate::stats::EngineStats;
use crate::wire::{Command, SegmentHeader, HEADER_LEN, MAX_FRAGMENTS};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Smallest accepted MTU.
pub const MIN_MTU: usize = 50;
/// Default MTU per outbound datagram.
pub const DEFAULT_MTU: usize = 1400;
/// Default send window in segments.
pub const DEFAULT_SEND_WINDOW: u32 = 32;
/// Default receive window in segments.
pub const DEFAULT_RECV_WINDOW: u32 = 128;
/// Default flush cadence in milliseconds.
pub const DEFAULT_INTERVAL_MS: u32 = 100;

/// First wait before probing a zero remote window.
const PROBE_INIT_MS: u32 = 7_000;
/// Probe backoff ceiling.
const PROBE_LIMIT_MS: u32 = 120_000;
/// A segment stops fast-retransmitting after this many transmissions.
const FAST_ACK_LIMIT: u32 = 5;
/// Clock discontinuities beyond this reset the flush schedule.
const CLOCK_JUMP_MS: i32 = 10_000;

/// Outbound datagram sink. Receives each complete datagram, including the
/// caller-reserved prefix bytes at the front.
pub type OutputFn = Box<dyn FnMut(&[u8]) + Send>;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Engine tuning parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Largest datagram the engine will emit, reserved prefix included.
    pub mtu: usize,
    /// Send window in segments.
    pub send_window: u32,
    /// Receive window in segments.
    pub recv_window: u32,
    /// Flush cadence in milliseconds (10..=5000).
    pub interval_ms: u32,
    /// Aggressive retransmission timing: smaller minimum RTO and +50 %
    /// deadline backoff instead of doubling.
    pub nodelay: bool,
    /// Duplicate-ack count that triggers fast retransmit; 0 disables the
    /// threshold.
    pub fast_resend: u32,
    /// Disable the congestion window, leaving only flow control.
    pub no_congestion: bool,
    /// Bytes reserved at the front of every outbound datagram for the
    /// caller's envelope. Opaque to the protocol.
    pub reserved: usize,
    /// Free-list bound for the payload pool.
    pub pool_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            mtu: DEFAULT_MTU,
            send_window: DEFAULT_SEND_WINDOW,
            recv_window: DEFAULT_RECV_WINDOW,
            interval_ms: DEFAULT_INTERVAL_MS,
            nodelay: false,
            fast_resend: 0,
            no_congestion: false,
            reserved: 0,
            pool_limit: DEFAULT_POOL_LIMIT,
        }
    }
}

// ─── Segment ─────────────────────────────────────────────────────────────────

/// One protocol unit: header fields, pooled payload, and the transient
/// retransmission state that never touches the wire.
struct Segment {
    cmd: Command,
    frg: u8,
    wnd: u16,
    ts: u32,
    sn: u32,
    una: u32,
    payload: BytesMut,

    rto: u32,
    resend_at: u32,
    fast_acks: u32,
    transmits: u32,
    acked: bool,
}

impl Segment {
    fn new(cmd: Command, payload: BytesMut) -> Self {
        Segment {
            cmd,
            frg: 0,
            wnd: 0,
            ts: 0,
            sn: 0,
            una: 0,
            payload,
            rto: 0,
            resend_at: 0,
            fast_acks: 0,
            transmits: 0,
            acked: false,
        }
    }

    fn header(&self, conv: u32) -> SegmentHeader {
        SegmentHeader {
            conv,
            cmd: self.cmd,
            frg: self.frg,
            wnd: self.wnd,
            ts: self.ts,
            sn: self.sn,
            una: self.una,
            len: self.payload.len() as u32,
        }
    }
}

// ─── Probe State ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ProbeState {
    /// Send a WindowProbe on the next flush.
    ask_send: bool,
    /// Send a WindowTell on the next flush.
    ask_tell: bool,
    /// When the next probe becomes due.
    next_at: u32,
    /// Current backoff wait; 0 while the remote window is open.
    wait_ms: u32,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Reliable-delivery state machine for a single conversation.
pub struct Engine {
    conv: u32,
    mtu: usize,
    reserved: usize,
    interval: u32,
    nodelay: bool,
    fast_resend: u32,
    no_congestion: bool,

    snd_una: u32,
    snd_nxt: u32,
    rcv_nxt: u32,

    snd_wnd: u32,
    rcv_wnd: u32,
    rmt_wnd: u32,

    rtt: RttEstimator,
    congestion: RenoController,
    probe: ProbeState,

    snd_queue: VecDeque<Segment>,
    snd_buf: VecDeque<Segment>,
    rcv_buf: VecDeque<Segment>,
    rcv_queue: VecDeque<Segment>,
    ack_list: Vec<(u32, u32)>,

    pool: BufferPool,
    staging: BytesMut,
    clock: ProtocolClock,
    ts_flush: u32,
    updated: bool,
    /// `snd_una` as of the last congestion-growth evaluation.
    growth_mark: u32,

    output: OutputFn,
    stats: EngineStats,
}

impl Engine {
    /// Engine with default configuration.
    pub fn new(conv: u32, output: impl FnMut(&[u8]) + Send + 'static) -> Self {
        Self::build(conv, EngineConfig::default(), Box::new(output))
    }

    /// Engine with explicit configuration, validated up front.
    pub fn with_config(
        conv: u32,
        config: EngineConfig,
        output: impl FnMut(&[u8]) + Send + 'static,
    ) -> Result<Self, ConfigError> {
        validate(&config)?;
        Ok(Self::build(conv, config, Box::new(output)))
    }

    fn build(conv: u32, config: EngineConfig, output: OutputFn) -> Self {
        let min_rto = if config.nodelay {
            RTO_MIN_NODELAY
        } else {
            RTO_MIN
        };
        let mut staging = BytesMut::with_capacity(config.mtu);
        staging.resize(config.reserved, 0);

        Engine {
            conv,
            mtu: config.mtu,
            reserved: config.reserved,
            interval: config.interval_ms,
            nodelay: config.nodelay,
            fast_resend: config.fast_resend,
            no_congestion: config.no_congestion,

            snd_una: 0,
            snd_nxt: 0,
            rcv_nxt: 0,

            snd_wnd: config.send_window,
            rcv_wnd: config.recv_window,
            rmt_wnd: DEFAULT_RECV_WINDOW,

            rtt: RttEstimator::new(min_rto),
            congestion: RenoController::new(),
            probe: ProbeState::default(),

            snd_queue: VecDeque::new(),
            snd_buf: VecDeque::new(),
            rcv_buf: VecDeque::new(),
            rcv_queue: VecDeque::new(),
            ack_list: Vec::new(),

            pool: BufferPool::new(config.pool_limit),
            staging,
            clock: ProtocolClock::new(),
            ts_flush: 0,
            updated: false,
            growth_mark: 0,

            output,
            stats: EngineStats::default(),
        }
    }

    // ─── Application Surface ─────────────────────────────────────────────

    /// Queue a message for delivery. Fragments into at most
    /// [`MAX_FRAGMENTS`] segments of [`Engine::mss`] bytes each; the
    /// fragment index counts down so index 0 marks the final piece.
    pub fn send(&mut self, data: &[u8]) -> Result<(), SendError> {
        if data.is_empty() {
            return Err(SendError::EmptyMessage);
        }
        let mss = self.mss();
        let count = data.len().div_ceil(mss);
        if count > MAX_FRAGMENTS {
            return Err(SendError::TooManyFragments { fragments: count });
        }

        for (i, chunk) in data.chunks(mss).enumerate() {
            let mut payload = self.pool.acquire(chunk.len());
            pool::append(&mut payload, chunk);
            let mut seg = Segment::new(Command::Push, payload);
            seg.frg = (count - 1 - i) as u8;
            self.snd_queue.push_back(seg);
        }

        self.stats.messages_sent += 1;
        self.stats.bytes_sent += data.len() as u64;
        trace!(conv = self.conv, bytes = data.len(), fragments = count, "message queued");
        Ok(())
    }

    /// Size of the next complete message, or `None` while the ready queue
    /// is empty or still missing fragments.
    pub fn peek_size(&self) -> Option<usize> {
        let first = self.rcv_queue.front()?;
        if first.frg == 0 {
            return Some(first.payload.len());
        }
        if self.rcv_queue.len() < first.frg as usize + 1 {
            return None;
        }
        let mut total = 0;
        for seg in &self.rcv_queue {
            total += seg.payload.len();
            if seg.frg == 0 {
                break;
            }
        }
        Some(total)
    }

    /// Copy the next complete message into `buf`. On
    /// [`RecvError::BufferTooSmall`] nothing is consumed. Freeing slots in a
    /// previously exhausted receive window schedules a WindowTell so the
    /// peer resumes without waiting out its probe backoff.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize, RecvError> {
        let size = self.peek_size().ok_or(RecvError::NoData)?;
        if buf.len() < size {
            return Err(RecvError::BufferTooSmall {
                required: size,
                provided: buf.len(),
            });
        }

        let was_full = self.rcv_queue.len() >= self.rcv_wnd as usize;
        let mut written = 0;
        while let Some(seg) = self.rcv_queue.pop_front() {
            buf[written..written + seg.payload.len()].copy_from_slice(&seg.payload);
            written += seg.payload.len();
            let last = seg.frg == 0;
            self.pool.release(seg.payload);
            if last {
                break;
            }
        }

        self.promote_contiguous();
        if was_full && self.rcv_queue.len() < self.rcv_wnd as usize {
            self.probe.ask_tell = true;
        }

        self.stats.messages_received += 1;
        self.stats.bytes_received += written as u64;
        trace!(conv = self.conv, bytes = written, "message delivered");
        Ok(written)
    }

    // ─── Datagram Input ──────────────────────────────────────────────────

    /// Feed one datagram received from the peer. Segments are processed in
    /// order until the first malformed one, which aborts the rest of the
    /// datagram; earlier segments stay applied.
    ///
    /// `regular` marks a live packet whose advertised window and timestamp
    /// may be trusted (as opposed to replayed or externally recovered data).
    /// `ack_immediately` flushes pending acks before returning.
    pub fn input(
        &mut self,
        datagram: &[u8],
        regular: bool,
        ack_immediately: bool,
    ) -> Result<(), InputError> {
        let now = self.clock.now_ms();
        let mut cursor = datagram;
        let mut newest_ack: Option<(u32, u32)> = None;

        while !cursor.is_empty() {
            let header = SegmentHeader::decode(&mut cursor)?;
            if header.conv != self.conv {
                warn!(
                    conv = self.conv,
                    theirs = header.conv,
                    "dropping datagram for foreign conversation"
                );
                return Err(InputError::ConversationMismatch {
                    ours: self.conv,
                    theirs: header.conv,
                });
            }
            let (payload, rest) = cursor.split_at(header.len as usize);
            cursor = rest;
            self.stats.segments_received += 1;

            if regular {
                self.rmt_wnd = header.wnd as u32;
            }
            self.prune_acknowledged(header.una);
            self.refresh_snd_una();

            match header.cmd {
                Command::Ack => {
                    if regular && time_delta(now, header.ts) >= 0 {
                        self.rtt
                            .on_sample(time_delta(now, header.ts) as u32, self.interval);
                    }
                    self.mark_acked(header.sn);
                    self.refresh_snd_una();
                    newest_ack = match newest_ack {
                        Some((sn, _)) if !seq_before(sn, header.sn) => newest_ack,
                        _ => Some((header.sn, header.ts)),
                    };
                }
                Command::Push => {
                    if seq_before(header.sn, self.rcv_nxt.wrapping_add(self.rcv_wnd)) {
                        // Ack even duplicates: the peer may have lost our ack.
                        self.ack_list.push((header.sn, header.ts));
                        if !seq_before(header.sn, self.rcv_nxt) {
                            self.insert_reordered(&header, payload);
                            self.promote_contiguous();
                        } else {
                            self.stats.duplicates += 1;
                        }
                    }
                }
                Command::WindowProbe => {
                    self.probe.ask_tell = true;
                }
                Command::WindowTell => {
                    // Window already captured above; nothing else to do.
                }
            }
        }

        if let Some((sn, ts)) = newest_ack {
            self.bump_fast_acks(sn, ts);
        }
        if ack_immediately && !self.ack_list.is_empty() {
            self.flush_at(now, true);
        }
        Ok(())
    }

    // ─── Output Driver ───────────────────────────────────────────────────

    /// Emit everything currently due: pending acks, window probes and
    /// tells, newly admitted segments, and retransmissions. Returns the
    /// recommended delay in milliseconds until the next flush is worth
    /// calling — a delta, never an absolute timestamp.
    pub fn flush(&mut self, ack_only: bool) -> u32 {
        let now = self.clock.now_ms();
        self.flush_at(now, ack_only)
    }

    fn flush_at(&mut self, now: u32, ack_only: bool) -> u32 {
        let mtu = self.mtu;
        let reserved = self.reserved;
        let conv = self.conv;
        let wnd_unused = self.wnd_unused();
        let rcv_nxt = self.rcv_nxt;

        // Step 1: pending acks, one segment per remote sequence number.
        for i in 0..self.ack_list.len() {
            let (sn, ts) = self.ack_list[i];
            let header = SegmentHeader {
                conv,
                cmd: Command::Ack,
                frg: 0,
                wnd: wnd_unused,
                ts,
                sn,
                una: rcv_nxt,
                len: 0,
            };
            stage_segment(&mut self.staging, &mut self.output, mtu, reserved, &header, &[]);
            self.stats.acks_sent += 1;
        }
        self.ack_list.clear();

        // Step 2: ack-only callers ride the flush cadence for everything else.
        if ack_only {
            emit_datagram(&mut self.staging, &mut self.output, reserved);
            return self.interval;
        }

        // Step 3: a closed remote window is probed on an exponential backoff
        // between 7 s and 120 s.
        if self.rmt_wnd == 0 {
            if self.probe.wait_ms == 0 {
                self.probe.wait_ms = PROBE_INIT_MS;
                self.probe.next_at = now.wrapping_add(self.probe.wait_ms);
            } else if time_delta(now, self.probe.next_at) >= 0 {
                if self.probe.wait_ms < PROBE_INIT_MS {
                    self.probe.wait_ms = PROBE_INIT_MS;
                }
                self.probe.wait_ms += self.probe.wait_ms / 2;
                if self.probe.wait_ms > PROBE_LIMIT_MS {
                    self.probe.wait_ms = PROBE_LIMIT_MS;
                }
                self.probe.next_at = now.wrapping_add(self.probe.wait_ms);
                self.probe.ask_send = true;
            }
        } else {
            self.probe.wait_ms = 0;
            self.probe.next_at = 0;
        }

        // Steps 3–4: emit the probe and/or the window advertisement.
        if self.probe.ask_send {
            let header = control_header(conv, Command::WindowProbe, wnd_unused, now, rcv_nxt);
            stage_segment(&mut self.staging, &mut self.output, mtu, reserved, &header, &[]);
            self.stats.probes_sent += 1;
        }
        if self.probe.ask_tell {
            let header = control_header(conv, Command::WindowTell, wnd_unused, now, rcv_nxt);
            stage_segment(&mut self.staging, &mut self.output, mtu, reserved, &header, &[]);
        }
        self.probe.ask_send = false;
        self.probe.ask_tell = false;

        // Step 5: effective window.
        let mut window = self.snd_wnd.min(self.rmt_wnd);
        if !self.no_congestion {
            window = window.min(self.congestion.window());
        }

        // Step 6: admit unsent segments while the window allows.
        let mut admitted = 0u32;
        while seq_before(self.snd_nxt, self.snd_una.wrapping_add(window)) {
            let Some(mut seg) = self.snd_queue.pop_front() else {
                break;
            };
            seg.sn = self.snd_nxt;
            seg.rto = self.rtt.rto();
            seg.resend_at = now;
            seg.fast_acks = 0;
            seg.transmits = 0;
            self.snd_nxt = self.snd_nxt.wrapping_add(1);
            self.snd_buf.push_back(seg);
            admitted += 1;
        }

        // Step 7: transmit and retransmit.
        let resend_threshold = if self.fast_resend > 0 {
            self.fast_resend
        } else {
            u32::MAX
        };
        let first_send_grace = if self.nodelay { 0 } else { self.rtt.rto() / 8 };
        let base_rto = self.rtt.rto();
        let nodelay = self.nodelay;
        let mut timeout_loss = false;
        let mut fast_loss = false;

        for seg in self.snd_buf.iter_mut() {
            if seg.acked {
                continue;
            }
            let mut needsend = false;

            if seg.transmits == 0 {
                needsend = true;
                seg.rto = base_rto;
                seg.resend_at = now.wrapping_add(seg.rto + first_send_grace);
            } else if seg.fast_acks >= resend_threshold
                || (seg.fast_acks > 0 && admitted == 0)
            {
                if seg.transmits <= FAST_ACK_LIMIT {
                    needsend = true;
                    seg.fast_acks = 0;
                    seg.resend_at = now.wrapping_add(seg.rto);
                    fast_loss = true;
                    self.stats.fast_retransmissions += 1;
                }
            } else if time_delta(now, seg.resend_at) >= 0 {
                needsend = true;
                if nodelay {
                    seg.rto += seg.rto / 2;
                } else {
                    seg.rto += seg.rto.max(base_rto);
                }
                seg.resend_at = now.wrapping_add(seg.rto);
                timeout_loss = true;
                self.stats.retransmissions += 1;
            }

            if needsend {
                seg.transmits += 1;
                seg.ts = now;
                seg.wnd = wnd_unused;
                seg.una = rcv_nxt;
                let header = seg.header(conv);
                stage_segment(
                    &mut self.staging,
                    &mut self.output,
                    mtu,
                    reserved,
                    &header,
                    &seg.payload,
                );
                self.stats.segments_sent += 1;
            }
        }

        emit_datagram(&mut self.staging, &mut self.output, reserved);

        // Step 8: congestion reactions, then growth when the base advanced
        // without loss evidence this round.
        let mss = self.mss() as u32;
        if fast_loss {
            let inflight = self.snd_nxt.wrapping_sub(self.snd_una);
            self.congestion
                .on_fast_retransmit(inflight, self.fast_resend, mss);
            debug!(conv = self.conv, cwnd = self.congestion.window(), "fast retransmit backoff");
        }
        if timeout_loss {
            self.congestion.on_timeout(mss);
            debug!(conv = self.conv, "rto loss, congestion window collapsed");
        }
        if !fast_loss && !timeout_loss && self.snd_una != self.growth_mark {
            self.congestion.on_progress(mss, self.rmt_wnd);
        }
        self.growth_mark = self.snd_una;
        self.congestion.enforce_floor(mss);

        // Recommended re-poll delta: the flush cadence, pulled in by any
        // pending retransmit deadline.
        let mut next = self.interval;
        for seg in &self.snd_buf {
            if seg.acked || seg.transmits == 0 {
                continue;
            }
            let delta = time_delta(seg.resend_at, now);
            next = next.min(delta.max(0) as u32);
        }
        next
    }

    /// Periodic driver. Call every 10–100 ms; flushes when the internal
    /// schedule is due. A clock discontinuity beyond 10 s resets the
    /// schedule instead of flushing in a burst.
    pub fn update(&mut self) {
        let now = self.clock.now_ms();
        if !self.updated {
            self.updated = true;
            self.ts_flush = now;
        }

        let mut gap = time_delta(now, self.ts_flush);
        if gap.abs() >= CLOCK_JUMP_MS {
            self.ts_flush = now;
            gap = 0;
        }
        if gap >= 0 {
            self.ts_flush = self.ts_flush.wrapping_add(self.interval);
            if time_delta(now, self.ts_flush) >= 0 {
                self.ts_flush = now.wrapping_add(self.interval);
            }
            self.flush_at(now, false);
        }
    }

    /// Advisory delay in milliseconds until the next [`Engine::update`] can
    /// do useful work, from the flush schedule and pending retransmit
    /// deadlines. Sends nothing. Returns a delta for the caller to add to
    /// its own clock, never an absolute deadline.
    pub fn check(&self) -> u32 {
        if !self.updated {
            return 0;
        }
        let now = self.clock.now_ms();
        let mut ts_flush = self.ts_flush;
        if time_delta(now, ts_flush).abs() >= CLOCK_JUMP_MS {
            ts_flush = now;
        }
        if time_delta(now, ts_flush) >= 0 {
            return 0;
        }

        let mut best = time_delta(ts_flush, now) as u32;
        for seg in &self.snd_buf {
            if seg.acked || seg.transmits == 0 {
                continue;
            }
            let delta = time_delta(seg.resend_at, now);
            if delta <= 0 {
                return 0;
            }
            best = best.min(delta as u32);
        }
        best.min(self.interval)
    }

    // ─── Configuration ───────────────────────────────────────────────────

    /// Change the MTU. Reallocates the internal send-staging buffer.
    pub fn set_mtu(&mut self, mtu: usize) -> Result<(), ConfigError> {
        if mtu < MIN_MTU {
            return Err(ConfigError::MtuTooSmall(mtu));
        }
        if self.reserved + HEADER_LEN >= mtu {
            return Err(ConfigError::ReserveTooLarge {
                reserved: self.reserved,
                mtu,
            });
        }
        self.mtu = mtu;
        let mut staging = BytesMut::with_capacity(mtu);
        staging.resize(self.reserved, 0);
        self.staging = staging;
        Ok(())
    }

    /// Reserve prefix bytes at the front of every outbound datagram for an
    /// outer envelope owned by the caller.
    pub fn reserve(&mut self, bytes: usize) -> Result<(), ConfigError> {
        if bytes + HEADER_LEN >= self.mtu {
            return Err(ConfigError::ReserveTooLarge {
                reserved: bytes,
                mtu: self.mtu,
            });
        }
        self.reserved = bytes;
        self.staging.clear();
        self.staging.resize(bytes, 0);
        Ok(())
    }

    /// Set send and receive window limits, in segments.
    pub fn set_window_size(&mut self, send: u32, recv: u32) -> Result<(), ConfigError> {
        if send == 0 || recv == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        self.snd_wnd = send;
        self.rcv_wnd = recv;
        Ok(())
    }

    /// Latency/throughput trade-off knobs: aggressive RTO handling, flush
    /// cadence, fast-resend threshold (0 disables), and congestion-window
    /// bypass.
    pub fn set_nodelay(
        &mut self,
        nodelay: bool,
        interval_ms: u32,
        fast_resend: u32,
        no_congestion: bool,
    ) -> Result<(), ConfigError> {
        if !(10..=5_000).contains(&interval_ms) {
            return Err(ConfigError::IntervalOutOfRange(interval_ms));
        }
        self.nodelay = nodelay;
        self.interval = interval_ms;
        self.fast_resend = fast_resend;
        self.no_congestion = no_congestion;
        self.rtt
            .set_min_rto(if nodelay { RTO_MIN_NODELAY } else { RTO_MIN });
        Ok(())
    }

    // ─── Introspection ───────────────────────────────────────────────────

    /// Conversation identifier.
    pub fn conv(&self) -> u32 {
        self.conv
    }

    /// Maximum payload per segment under the current MTU and reservation.
    pub fn mss(&self) -> usize {
        self.mtu - HEADER_LEN - self.reserved
    }

    /// Current retransmission timeout in milliseconds.
    pub fn rto(&self) -> u32 {
        self.rtt.rto()
    }

    /// Segments not yet handed to the peer: unsent plus in flight.
    pub fn pending_send(&self) -> usize {
        self.snd_queue.len() + self.snd_buf.len()
    }

    /// Segments in the in-flight buffer (acknowledged segments count until
    /// the unacknowledged base passes them).
    pub fn segments_in_flight(&self) -> usize {
        self.snd_buf.len()
    }

    /// Statistics snapshot with refreshed gauges.
    pub fn stats(&self) -> EngineStats {
        let mut s = self.stats.clone();
        s.srtt_ms = self.rtt.srtt_ms();
        s.rttvar_ms = self.rtt.rttvar_ms();
        s.rto_ms = self.rtt.rto();
        s.cwnd = self.congestion.window();
        s.send_queue = self.snd_queue.len() as u32;
        s.in_flight = self.snd_buf.len() as u32;
        s.reorder_buffered = self.rcv_buf.len() as u32;
        s
    }

    // ─── Internals ───────────────────────────────────────────────────────

    /// Drop in-flight segments the peer has fully acknowledged via `una`.
    fn prune_acknowledged(&mut self, una: u32) {
        while self
            .snd_buf
            .front()
            .is_some_and(|seg| seq_before(seg.sn, una))
        {
            if let Some(seg) = self.snd_buf.pop_front() {
                self.pool.release(seg.payload);
            }
        }
    }

    fn refresh_snd_una(&mut self) {
        self.snd_una = match self.snd_buf.front() {
            Some(seg) => seg.sn,
            None => self.snd_nxt,
        };
    }

    /// Mark a single in-flight segment acknowledged. Kept in place until
    /// `una` advances past it.
    fn mark_acked(&mut self, sn: u32) {
        if seq_before(sn, self.snd_una) || !seq_before(sn, self.snd_nxt) {
            return;
        }
        for seg in self.snd_buf.iter_mut() {
            if seg.sn == sn {
                seg.acked = true;
                break;
            }
            if seq_before(sn, seg.sn) {
                break;
            }
        }
    }

    /// Count duplicate-ack evidence against unacked segments sent no later
    /// than the acked one.
    fn bump_fast_acks(&mut self, sn: u32, ts: u32) {
        if seq_before(sn, self.snd_una) || !seq_before(sn, self.snd_nxt) {
            return;
        }
        for seg in self.snd_buf.iter_mut() {
            if !seq_before(seg.sn, sn) {
                break;
            }
            if !seg.acked && time_delta(seg.ts, ts) <= 0 {
                seg.fast_acks += 1;
            }
        }
    }

    /// Insert a data segment into the reorder buffer, keeping it sorted by
    /// sequence number. Duplicate sequence numbers are a no-op.
    fn insert_reordered(&mut self, header: &SegmentHeader, payload: &[u8]) {
        let sn = header.sn;
        let mut index = self.rcv_buf.len();
        for (i, seg) in self.rcv_buf.iter().enumerate().rev() {
            if seg.sn == sn {
                self.stats.duplicates += 1;
                return;
            }
            if seq_before(sn, seg.sn) {
                index = i;
            } else {
                break;
            }
        }

        let mut buf = self.pool.acquire(payload.len());
        pool::append(&mut buf, payload);
        let mut seg = Segment::new(Command::Push, buf);
        seg.frg = header.frg;
        seg.wnd = header.wnd;
        seg.ts = header.ts;
        seg.sn = sn;
        seg.una = header.una;
        self.rcv_buf.insert(index, seg);
    }

    /// Move the contiguous run starting at `rcv_nxt` from the reorder
    /// buffer into the ready queue, window permitting.
    fn promote_contiguous(&mut self) {
        while self.rcv_queue.len() < self.rcv_wnd as usize
            && self
                .rcv_buf
                .front()
                .is_some_and(|seg| seg.sn == self.rcv_nxt)
        {
            if let Some(seg) = self.rcv_buf.pop_front() {
                self.rcv_queue.push_back(seg);
                self.rcv_nxt = self.rcv_nxt.wrapping_add(1);
            }
        }
    }

    /// Free receive-window slots to advertise, in segments.
    fn wnd_unused(&self) -> u16 {
        let used = self.rcv_queue.len() as u32;
        if used < self.rcv_wnd {
            (self.rcv_wnd - used).min(u16::MAX as u32) as u16
        } else {
            0
        }
    }
}

// ─── Free Helpers ────────────────────────────────────────────────────────────

fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.mtu < MIN_MTU {
        return Err(ConfigError::MtuTooSmall(config.mtu));
    }
    if config.reserved + HEADER_LEN >= config.mtu {
        return Err(ConfigError::ReserveTooLarge {
            reserved: config.reserved,
            mtu: config.mtu,
        });
    }
    if config.send_window == 0 || config.recv_window == 0 {
        return Err(ConfigError::ZeroWindow);
    }
    if !(10..=5_000).contains(&config.interval_ms) {
        return Err(ConfigError::IntervalOutOfRange(config.interval_ms));
    }
    Ok(())
}

fn control_header(conv: u32, cmd: Command, wnd: u16, ts: u32, una: u32) -> SegmentHeader {
    SegmentHeader {
        conv,
        cmd,
        frg: 0,
        wnd,
        ts,
        sn: 0,
        una,
        len: 0,
    }
}

/// Push one encoded segment into the staging buffer, emitting the staged
/// datagram first when the segment would not fit under the MTU.
fn stage_segment(
    staging: &mut BytesMut,
    output: &mut OutputFn,
    mtu: usize,
    reserved: usize,
    header: &SegmentHeader,
    payload: &[u8],
) {
    if staging.len() + HEADER_LEN + payload.len() > mtu {
        emit_datagram(staging, output, reserved);
    }
    header.encode(staging);
    staging.extend_from_slice(payload);
}

/// Hand the staged datagram to the output callback (reserved prefix
/// included) and reset the staging buffer to just the prefix.
fn emit_datagram(staging: &mut BytesMut, output: &mut OutputFn, reserved: usize) {
    if staging.len() > reserved {
        output(staging.as_ref());
    }
    staging.clear();
    staging.resize(reserved, 0);
}
