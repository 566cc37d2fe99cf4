//! Cumulative protocol counters kept by a reliable-UDP engine.
//!
//! An engine owns one [`Snmp`] block and bumps it from every session it
//! drives, so the values aggregate all sessions of that engine in the process.
//! The interval collector diffs successive [`SnmpSnapshot`]s; it never writes
//! to the block.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! snmp_counters {
    ($( $(#[$doc:meta])* $field:ident => $label:literal, )+) => {
        /// Live counter block, written by the transport engine.
        #[derive(Debug, Default)]
        pub struct Snmp {
            $( $(#[$doc])* pub $field: AtomicU64, )+
        }

        /// Point-in-time copy of an [`Snmp`] block.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct SnmpSnapshot {
            $( $(#[$doc])* pub $field: u64, )+
        }

        impl Snmp {
            /// Creates a zeroed block. Usable in a `static`.
            pub const fn new() -> Self {
                Self { $( $field: AtomicU64::new(0), )+ }
            }

            /// Reads every counter.
            pub fn snapshot(&self) -> SnmpSnapshot {
                SnmpSnapshot { $( $field: self.$field.load(Ordering::Relaxed), )+ }
            }

            /// Zeroes every counter.
            pub fn reset(&self) {
                $( self.$field.store(0, Ordering::Relaxed); )+
            }
        }

        impl SnmpSnapshot {
            /// Counter names, in the same order as [`SnmpSnapshot::values`].
            pub const HEADER: &'static [&'static str] = &[ $( $label, )+ ];

            /// Counter values, in the same order as [`SnmpSnapshot::HEADER`].
            pub fn values(&self) -> Vec<u64> {
                vec![ $( self.$field, )+ ]
            }
        }
    };
}

snmp_counters! {
    /// Payload bytes written by sessions
    bytes_sent => "BytesSent",
    /// Payload bytes read by sessions
    bytes_received => "BytesReceived",
    /// Highest number of concurrently established sessions
    max_conn => "MaxConn",
    /// Sessions opened by dialing
    active_opens => "ActiveOpens",
    /// Sessions opened by accepting
    passive_opens => "PassiveOpens",
    /// Currently established sessions
    curr_estab => "CurrEstab",
    /// Malformed inbound packets
    in_errs => "InErrs",
    /// Inbound checksum failures
    in_csum_errors => "InCsumErrors",
    /// Inbound segments rejected by the protocol core
    kcp_in_errors => "KCPInErrors",
    in_pkts => "InPkts",
    out_pkts => "OutPkts",
    in_segs => "InSegs",
    out_segs => "OutSegs",
    in_bytes => "InBytes",
    out_bytes => "OutBytes",
    /// Segments retransmitted for any reason
    retrans_segs => "RetransSegs",
    /// Retransmits triggered by duplicate ACKs
    fast_retrans_segs => "FastRetransSegs",
    /// Retransmits triggered by early retransmit
    early_retrans_segs => "EarlyRetransSegs",
    /// Segments declared lost on RTO
    lost_segs => "LostSegs",
    /// Duplicate segments received
    repeat_segs => "RepeatSegs",
    /// Segments reconstructed from parity
    fec_recovered => "FECRecovered",
    /// FEC groups that could not be decoded
    fec_errs => "FECErrs",
    fec_parity_shards => "FECParityShards",
    fec_short_shards => "FECShortShards",
}

impl SnmpSnapshot {
    /// Renders `Name: value` pairs, tab separated, on one line.
    pub fn diagnostic_line(&self) -> String {
        let mut line = String::new();
        for (name, value) in Self::HEADER.iter().zip(self.values()) {
            if !line.is_empty() {
                line.push('\t');
            }
            let _ = write!(line, "{name}: {value}");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_matches_values() {
        let snapshot = SnmpSnapshot::default();
        assert_eq!(SnmpSnapshot::HEADER.len(), snapshot.values().len());
        assert_eq!(SnmpSnapshot::HEADER[0], "BytesSent");
        assert_eq!(SnmpSnapshot::HEADER[SnmpSnapshot::HEADER.len() - 1], "FECShortShards");
    }

    #[test]
    fn test_snapshot_and_reset() {
        let snmp = Snmp::new();
        snmp.retrans_segs.fetch_add(7, Ordering::Relaxed);
        snmp.lost_segs.fetch_add(2, Ordering::Relaxed);

        let snapshot = snmp.snapshot();
        assert_eq!(snapshot.retrans_segs, 7);
        assert_eq!(snapshot.lost_segs, 2);
        assert_eq!(snapshot.in_pkts, 0);

        snmp.reset();
        assert_eq!(snmp.snapshot(), SnmpSnapshot::default());
    }

    #[test]
    fn test_values_follow_header_order() {
        let snmp = Snmp::new();
        snmp.retrans_segs.store(11, Ordering::Relaxed);
        let snapshot = snmp.snapshot();
        let idx = SnmpSnapshot::HEADER
            .iter()
            .position(|h| *h == "RetransSegs")
            .unwrap();
        assert_eq!(snapshot.values()[idx], 11);
    }

    #[test]
    fn test_diagnostic_line() {
        let snmp = Snmp::new();
        snmp.bytes_sent.store(1024, Ordering::Relaxed);
        let line = snmp.snapshot().diagnostic_line();
        assert!(line.starts_with("BytesSent: 1024\tBytesReceived: 0"));
        assert!(line.ends_with("FECShortShards: 0"));
        assert_eq!(line.split('\t').count(), SnmpSnapshot::HEADER.len());
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_static_block() {
        static GLOBAL: Snmp = Snmp::new();
        GLOBAL.out_segs.fetch_add(3, Ordering::Relaxed);
        assert!(GLOBAL.snapshot().out_segs >= 3);
    }
}
