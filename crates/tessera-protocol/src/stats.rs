//! Per-connection packet statistics.
//!
//! The packet codec reports every packet it sends or receives to a
//! [`PacketStats`] implementation, with the payload size before and after
//! compression. Counters live with the connection that produced them;
//! nothing here is global.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::PacketId;

/// Receives one call per packet sent or received.
pub trait PacketStats: Send + 'static {
    fn record_send(&mut self, id: PacketId, uncompressed: usize, compressed: usize);
    fn record_receive(&mut self, id: PacketId, uncompressed: usize, compressed: usize);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStats;

impl PacketStats for NoopStats {
    fn record_send(&mut self, _: PacketId, _: usize, _: usize) {}
    fn record_receive(&mut self, _: PacketId, _: usize, _: usize) {}
}

/// Count, totals and extremes for one direction of one packet type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectionStats {
    pub count: u64,
    pub uncompressed_total: u64,
    pub compressed_total: u64,
    pub uncompressed_min: usize,
    pub uncompressed_max: usize,
    pub compressed_min: usize,
    pub compressed_max: usize,
}

impl DirectionStats {
    fn record(&mut self, uncompressed: usize, compressed: usize) {
        if self.count == 0 {
            self.uncompressed_min = uncompressed;
            self.compressed_min = compressed;
        } else {
            self.uncompressed_min = self.uncompressed_min.min(uncompressed);
            self.compressed_min = self.compressed_min.min(compressed);
        }
        self.uncompressed_max = self.uncompressed_max.max(uncompressed);
        self.compressed_max = self.compressed_max.max(compressed);
        self.count += 1;
        self.uncompressed_total += uncompressed as u64;
        self.compressed_total += compressed as u64;
    }

    /// Mean uncompressed size, `0.0` before any packet.
    pub fn uncompressed_avg(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.uncompressed_total as f64 / self.count as f64
    }

    /// Mean compressed size, `0.0` before any packet.
    pub fn compressed_avg(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.compressed_total as f64 / self.count as f64
    }
}

/// Both directions for one packet type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PacketStatsEntry {
    pub sent: DirectionStats,
    pub received: DirectionStats,
}

/// Counters for a single connection, keyed by packet id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionStats {
    entries: BTreeMap<PacketId, PacketStatsEntry>,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, id: PacketId) -> Option<&PacketStatsEntry> {
        self.entries.get(&id)
    }

    /// Every packet type seen, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (PacketId, &PacketStatsEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn total_sent(&self) -> u64 {
        self.entries.values().map(|e| e.sent.count).sum()
    }

    pub fn total_received(&self) -> u64 {
        self.entries.values().map(|e| e.received.count).sum()
    }
}

impl PacketStats for ConnectionStats {
    fn record_send(&mut self, id: PacketId, uncompressed: usize, compressed: usize) {
        self.entries.entry(id).or_default().sent.record(uncompressed, compressed);
    }

    fn record_receive(&mut self, id: PacketId, uncompressed: usize, compressed: usize) {
        self.entries
            .entry(id)
            .or_default()
            .received
            .record(uncompressed, compressed);
    }
}
