//! # Engine Statistics
//!
//! Per-engine counters plus a gauge snapshot of the estimator and window
//! state, designed for JSON export and log enrichment.

use serde::Serialize;

// ─── EngineStats ─────────────────────────────────────────────────────────────

/// Counter/gauge snapshot for one engine. Counters accumulate over the
/// engine's lifetime; gauges are refreshed when the snapshot is taken.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    /// Application messages accepted by `send`.
    pub messages_sent: u64,
    /// Complete messages handed out by `recv`.
    pub messages_received: u64,
    /// Application payload bytes accepted by `send`.
    pub bytes_sent: u64,
    /// Application payload bytes handed out by `recv`.
    pub bytes_received: u64,
    /// Data segments put on the wire, including retransmissions.
    pub segments_sent: u64,
    /// Segments decoded from incoming datagrams.
    pub segments_received: u64,
    /// Ack segments emitted.
    pub acks_sent: u64,
    /// Timeout-driven retransmissions.
    pub retransmissions: u64,
    /// Duplicate-ack-driven retransmissions.
    pub fast_retransmissions: u64,
    /// Data segments discarded as duplicates or below the receive window.
    pub duplicates: u64,
    /// Window probes emitted while the remote window sat at zero.
    pub probes_sent: u64,

    // Gauges, refreshed on snapshot.
    /// Smoothed RTT in milliseconds.
    pub srtt_ms: u32,
    /// RTT variation in milliseconds.
    pub rttvar_ms: u32,
    /// Current retransmission timeout in milliseconds.
    pub rto_ms: u32,
    /// Congestion window in segments.
    pub cwnd: u32,
    /// Segments waiting in the unsent queue.
    pub send_queue: u32,
    /// Segments in flight awaiting acknowledgment.
    pub in_flight: u32,
    /// Out-of-order segments parked in the reorder buffer.
    pub reorder_buffered: u32,
}

impl EngineStats {
    /// Retransmitted share of all data segments sent.
    pub fn retransmit_ratio(&self) -> f64 {
        if self.segments_sent == 0 {
            0.0
        } else {
            (self.retransmissions + self.fast_retransmissions) as f64 / self.segments_sent as f64
        }
    }

    /// Duplicate share of all segments received.
    pub fn duplicate_ratio(&self) -> f64 {
        if self.segments_received == 0 {
            0.0
        } else {
            self.duplicates as f64 / self.segments_received as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_are_zero_on_fresh_stats() {
        let stats = EngineStats::default();
        assert_eq!(stats.retransmit_ratio(), 0.0);
        assert_eq!(stats.duplicate_ratio(), 0.0);
    }

    #[test]
    fn retransmit_ratio_counts_both_kinds() {
        let stats = EngineStats {
            segments_sent: 100,
            retransmissions: 6,
            fast_retransmissions: 4,
            ..Default::default()
        };
        assert!((stats.retransmit_ratio() - 0.10).abs() < f64::EPSILON);
    }

    #[test]
    fn serializes_to_json() {
        let stats = EngineStats {
            messages_sent: 3,
            srtt_ms: 42,
            ..Default::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"messages_sent\":3"));
        assert!(json.contains("\"srtt_ms\":42"));
    }
}
