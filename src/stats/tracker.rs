//! Per-subscriber throughput and liveness tracking
//!
//! Bitrate and liveness are separate signals. A slow viewer can
//! show a bitrate near zero and still be alive; a viewer whose transport has
//! not accepted a single byte during a whole check interval is presumed dead
//! even if no write error has surfaced yet.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::transport::TransportStat;

/// Protocol label reported in [`SubscriberStat`]
pub const PROTOCOL_HTTP_FLV: &str = "HTTP-FLV";

/// Externally visible statistics of one subscriber session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriberStat {
    pub protocol: &'static str,
    pub session_id: String,
    pub start_time: DateTime<Local>,
    pub remote_addr: String,
    pub read_bytes_sum: u64,
    pub wrote_bytes_sum: u64,
    /// Outgoing bitrate over the last monitoring interval
    #[serde(rename = "bitrate(kbits/s)")]
    pub bitrate: u64,
}

impl SubscriberStat {
    pub fn new(session_id: impl Into<String>, remote_addr: impl Into<String>) -> Self {
        Self {
            protocol: PROTOCOL_HTTP_FLV,
            session_id: session_id.into(),
            start_time: Local::now(),
            remote_addr: remote_addr.into(),
            read_bytes_sum: 0,
            wrote_bytes_sum: 0,
            bitrate: 0,
        }
    }
}

/// Bitrate and liveness state over successive transport snapshots
///
/// Holds no locks; callers serialize access (normally a single monitoring
/// loop does all three calls).
#[derive(Debug, Clone)]
pub struct StatTracker {
    stat: SubscriberStat,
    prev: TransportStat,
    stale: Option<TransportStat>,
}

impl StatTracker {
    pub fn new(stat: SubscriberStat) -> Self {
        Self {
            stat,
            prev: TransportStat::default(),
            stale: None,
        }
    }

    /// Current counters merged into the visible record
    pub fn snapshot(&self, current: TransportStat) -> SubscriberStat {
        SubscriberStat {
            read_bytes_sum: current.read_bytes_sum,
            wrote_bytes_sum: current.wrote_bytes_sum,
            ..self.stat.clone()
        }
    }

    /// Recompute the bitrate from bytes written since the previous call
    ///
    /// Assumes exactly `interval_secs` elapsed since the last call. An
    /// interval of zero is ignored and leaves the baseline untouched.
    pub fn update_bitrate(&mut self, current: TransportStat, interval_secs: u32) {
        if interval_secs == 0 {
            tracing::warn!(session = %self.stat.session_id, "update_bitrate called with zero interval");
            return;
        }

        let wrote = current
            .wrote_bytes_sum
            .saturating_sub(self.prev.wrote_bytes_sum);
        self.stat.bitrate = wrote * 8 / 1024 / u64::from(interval_secs);
        self.prev = current;
    }

    /// Whether any byte was written since the previous check
    ///
    /// The first call only records the baseline and reports alive. The
    /// interval does not influence the decision.
    pub fn is_alive(&mut self, current: TransportStat, _interval_secs: u32) -> bool {
        let alive = match self.stale {
            None => true,
            Some(stale) => current.wrote_bytes_sum != stale.wrote_bytes_sum,
        };
        self.stale = Some(current);
        alive
    }

    /// Last computed bitrate in kbit/s
    pub fn bitrate(&self) -> u64 {
        self.stat.bitrate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrote(bytes: u64) -> TransportStat {
        TransportStat {
            read_bytes_sum: 0,
            wrote_bytes_sum: bytes,
        }
    }

    fn tracker() -> StatTracker {
        StatTracker::new(SubscriberStat::new("FLVSUB1", "127.0.0.1:5000"))
    }

    #[test]
    fn test_snapshot_merges_counters() {
        let t = tracker();
        let stat = t.snapshot(TransportStat {
            read_bytes_sum: 120,
            wrote_bytes_sum: 4096,
        });

        assert_eq!(stat.protocol, "HTTP-FLV");
        assert_eq!(stat.session_id, "FLVSUB1");
        assert_eq!(stat.remote_addr, "127.0.0.1:5000");
        assert_eq!(stat.read_bytes_sum, 120);
        assert_eq!(stat.wrote_bytes_sum, 4096);
        assert_eq!(stat.bitrate, 0);
    }

    #[test]
    fn test_snapshot_has_no_side_effects() {
        let mut t = tracker();
        t.snapshot(wrote(10_240));
        t.update_bitrate(wrote(10_240), 10);
        // Delta is measured from zero, not from the snapshot
        assert_eq!(t.bitrate(), 8);
    }

    #[test]
    fn test_update_bitrate() {
        let mut t = tracker();

        t.update_bitrate(wrote(10_240), 10);
        assert_eq!(t.bitrate(), 8);

        // Only the delta since the previous call counts
        t.update_bitrate(wrote(10_240 + 1024 * 100), 5);
        assert_eq!(t.bitrate(), 160);

        t.update_bitrate(wrote(10_240 + 1024 * 100), 5);
        assert_eq!(t.bitrate(), 0);
    }

    #[test]
    fn test_update_bitrate_reported_in_snapshot() {
        let mut t = tracker();
        t.update_bitrate(wrote(1024 * 1024), 1);
        assert_eq!(t.snapshot(wrote(1024 * 1024)).bitrate, 8192);
    }

    #[test]
    fn test_update_bitrate_zero_interval_ignored() {
        let mut t = tracker();
        t.update_bitrate(wrote(10_240), 0);
        assert_eq!(t.bitrate(), 0);

        // Baseline was not advanced
        t.update_bitrate(wrote(10_240), 10);
        assert_eq!(t.bitrate(), 8);
    }

    #[test]
    fn test_is_alive_first_call_always_true() {
        let mut t = tracker();
        assert!(t.is_alive(wrote(0), 5));

        let mut t = tracker();
        assert!(t.is_alive(wrote(1_000_000), 5));
    }

    #[test]
    fn test_is_alive_detects_zero_progress() {
        let mut t = tracker();
        assert!(t.is_alive(wrote(100), 5));

        assert!(!t.is_alive(wrote(100), 5));
        assert!(t.is_alive(wrote(101), 5));
        assert!(!t.is_alive(wrote(101), 5));
        assert!(!t.is_alive(wrote(101), 5));
        assert!(t.is_alive(wrote(5000), 5));
    }

    #[test]
    fn test_is_alive_ignores_interval() {
        let mut a = tracker();
        let mut b = tracker();
        for (bytes, interval) in [(0, 1), (10, 60), (10, 1), (20, 3600)] {
            assert_eq!(a.is_alive(wrote(bytes), interval), b.is_alive(wrote(bytes), 5));
        }
    }

    #[test]
    fn test_is_alive_independent_of_bitrate_baseline() {
        let mut t = tracker();
        assert!(t.is_alive(wrote(100), 5));
        t.update_bitrate(wrote(200), 5);
        assert!(t.is_alive(wrote(200), 5));
    }

    #[test]
    fn test_stat_serialization() {
        let mut t = tracker();
        t.update_bitrate(wrote(10_240), 10);
        let json = serde_json::to_value(t.snapshot(wrote(10_240))).unwrap();

        assert_eq!(json["protocol"], "HTTP-FLV");
        assert_eq!(json["session_id"], "FLVSUB1");
        assert_eq!(json["wrote_bytes_sum"], 10_240);
        assert_eq!(json["bitrate(kbits/s)"], 8);
        assert!(json["start_time"].is_string());
    }
}
