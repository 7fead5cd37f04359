//! Per-peer sequence validation and connection quality statistics.
//!
//! Used symmetrically: the server keeps one [`SequenceValidator`] per client
//! and the client one for the server's outgoing stream. [`NetworkStats`]
//! aggregates RTT samples from ping/pong exchanges; its numbers are
//! diagnostic and never cause packets to be dropped.

use log::debug;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

/// Arrivals further than this behind the high-water mark are dropped.
pub const OUT_OF_ORDER_WINDOW: u32 = 50;

/// How many recently seen sequence numbers are remembered per peer.
pub const SEQUENCE_HISTORY: u32 = 200;

/// Rolling RTT window length.
pub const RTT_HISTORY_SIZE: usize = 30;

/// How many sent packets are remembered for RTT bookkeeping.
pub const SENT_PACKET_HISTORY: usize = 100;

/// Interval between pings, seconds.
pub const PING_INTERVAL: Duration = Duration::from_secs(1);

/// Detects duplicated and badly reordered datagrams on one incoming stream.
#[derive(Debug, Default)]
pub struct SequenceValidator {
    last_received: u32,
    seen: HashSet<u32>,
}

impl SequenceValidator {
    pub fn new() -> Self {
        SequenceValidator::default()
    }

    /// Highest sequence number seen so far.
    pub fn last_received(&self) -> u32 {
        self.last_received
    }

    /// Whether a freshly arrived sequence should be applied.
    ///
    /// Rejects exact duplicates and packets more than
    /// [`OUT_OF_ORDER_WINDOW`] behind the high-water mark. Mild reordering
    /// inside the window is accepted; UDP reorders.
    pub fn check(&self, sequence: u32) -> bool {
        if self.seen.contains(&sequence) {
            return false;
        }
        if sequence.saturating_add(OUT_OF_ORDER_WINDOW) < self.last_received {
            return false;
        }
        true
    }

    /// Records an applied sequence and prunes entries older than
    /// `last_received - SEQUENCE_HISTORY`.
    pub fn record(&mut self, sequence: u32) {
        self.seen.insert(sequence);
        if sequence > self.last_received {
            self.last_received = sequence;
        }
        if self.seen.len() > SEQUENCE_HISTORY as usize {
            let min_kept = self.last_received.saturating_sub(SEQUENCE_HISTORY);
            self.seen.retain(|&s| s >= min_kept);
        }
    }

    /// `check` + `record` in one step; returns whether the packet was fresh.
    pub fn accept(&mut self, sequence: u32) -> bool {
        let fresh = self.check(sequence);
        if fresh {
            self.record(sequence);
        }
        fresh
    }
}

/// One entry in the sent-packet history.
#[derive(Debug, Clone, Copy)]
pub struct SentPacket {
    pub sequence: u32,
    pub sent_time_ms: i64,
}

/// Rolling connection-quality metrics for one peer.
#[derive(Debug)]
pub struct NetworkStats {
    rtt_history: VecDeque<f32>,
    sent_packets: VecDeque<SentPacket>,
    pub average_rtt: f32,
    pub min_rtt: f32,
    pub max_rtt: f32,
    pub jitter: f32,
    pub packets_sent: u32,
    pub packets_received: u32,
}

impl Default for NetworkStats {
    fn default() -> Self {
        NetworkStats {
            rtt_history: VecDeque::new(),
            sent_packets: VecDeque::new(),
            average_rtt: 0.0,
            min_rtt: f32::MAX,
            max_rtt: 0.0,
            jitter: 0.0,
            packets_sent: 0,
            packets_received: 0,
        }
    }
}

impl NetworkStats {
    pub fn new() -> Self {
        NetworkStats::default()
    }

    /// Remembers a sent packet so a later pong can be matched to its send
    /// time. Oldest entries fall off past [`SENT_PACKET_HISTORY`].
    pub fn record_sent(&mut self, sequence: u32, sent_time_ms: i64) {
        self.packets_sent = self.packets_sent.saturating_add(1);
        self.sent_packets.push_back(SentPacket {
            sequence,
            sent_time_ms,
        });
        while self.sent_packets.len() > SENT_PACKET_HISTORY {
            self.sent_packets.pop_front();
        }
    }

    pub fn record_received(&mut self) {
        self.packets_received = self.packets_received.saturating_add(1);
    }

    /// Folds an RTT sample into the rolling window. Samples outside
    /// `(0, 10000]` ms are rejected as clock glitches.
    pub fn record_rtt(&mut self, rtt_ms: f32) -> bool {
        if !rtt_ms.is_finite() || rtt_ms <= 0.0 || rtt_ms > 10_000.0 {
            debug!("discarding implausible rtt sample {} ms", rtt_ms);
            return false;
        }
        self.rtt_history.push_back(rtt_ms);
        while self.rtt_history.len() > RTT_HISTORY_SIZE {
            self.rtt_history.pop_front();
        }

        self.min_rtt = self.min_rtt.min(rtt_ms);
        self.max_rtt = self.max_rtt.max(rtt_ms);

        let n = self.rtt_history.len() as f32;
        self.average_rtt = self.rtt_history.iter().sum::<f32>() / n;

        // Jitter as the population standard deviation of the window.
        if self.rtt_history.len() > 1 {
            let variance = self
                .rtt_history
                .iter()
                .map(|r| {
                    let d = r - self.average_rtt;
                    d * d
                })
                .sum::<f32>()
                / n;
            self.jitter = variance.sqrt();
        }
        true
    }

    /// One-way latency estimate.
    pub fn average_latency(&self) -> f32 {
        self.average_rtt / 2.0
    }

    /// Fraction of sent packets never answered, as a percentage.
    pub fn packet_loss_percent(&self) -> f32 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        let lost = self.packets_sent.saturating_sub(self.packets_received);
        lost as f32 / self.packets_sent as f32 * 100.0
    }

    pub fn sent_packet_count(&self) -> usize {
        self.sent_packets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn first_packet_is_accepted() {
        let mut v = SequenceValidator::new();
        assert!(v.accept(1));
        assert_eq!(v.last_received(), 1);
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut v = SequenceValidator::new();
        assert!(v.accept(5));
        assert!(!v.accept(5));
    }

    #[test]
    fn mild_reordering_is_accepted() {
        let mut v = SequenceValidator::new();
        assert!(v.accept(10));
        assert!(v.accept(8));
        assert!(v.accept(9));
        assert_eq!(v.last_received(), 10);
    }

    #[test]
    fn stale_packets_outside_window_are_rejected() {
        let mut v = SequenceValidator::new();
        assert!(v.accept(100));
        assert!(v.accept(50));
        assert!(!v.accept(49));
    }

    #[test]
    fn history_is_pruned() {
        let mut v = SequenceValidator::new();
        for s in 1..=500 {
            v.accept(s);
        }
        assert!(v.seen.len() <= SEQUENCE_HISTORY as usize + 1);
        assert_eq!(v.last_received(), 500);
    }

    #[test]
    fn rtt_window_statistics() {
        let mut stats = NetworkStats::new();
        assert!(stats.record_rtt(20.0));
        assert!(stats.record_rtt(40.0));
        assert_approx_eq!(stats.average_rtt, 30.0, 1e-3);
        assert_approx_eq!(stats.min_rtt, 20.0, 1e-3);
        assert_approx_eq!(stats.max_rtt, 40.0, 1e-3);
        assert_approx_eq!(stats.jitter, 10.0, 1e-3);
        assert_approx_eq!(stats.average_latency(), 15.0, 1e-3);
    }

    #[test]
    fn invalid_rtt_samples_are_rejected() {
        let mut stats = NetworkStats::new();
        assert!(!stats.record_rtt(0.0));
        assert!(!stats.record_rtt(-5.0));
        assert!(!stats.record_rtt(10_001.0));
        assert!(!stats.record_rtt(f32::NAN));
        assert_eq!(stats.average_rtt, 0.0);
    }

    #[test]
    fn rtt_window_is_bounded() {
        let mut stats = NetworkStats::new();
        for i in 0..100 {
            stats.record_rtt(10.0 + i as f32);
        }
        assert_eq!(stats.rtt_history.len(), RTT_HISTORY_SIZE);
        // The window should only contain the most recent 30 samples.
        assert_approx_eq!(*stats.rtt_history.front().unwrap(), 80.0, 1e-3);
    }

    #[test]
    fn sent_history_is_bounded() {
        let mut stats = NetworkStats::new();
        for i in 0..250u32 {
            stats.record_sent(i, i as i64);
        }
        assert_eq!(stats.sent_packet_count(), SENT_PACKET_HISTORY);
        assert_eq!(stats.packets_sent, 250);
    }

    #[test]
    fn packet_loss_percentage() {
        let mut stats = NetworkStats::new();
        for i in 0..10 {
            stats.record_sent(i, 0);
        }
        for _ in 0..9 {
            stats.record_received();
        }
        assert_approx_eq!(stats.packet_loss_percent(), 10.0, 1e-3);
    }
}
