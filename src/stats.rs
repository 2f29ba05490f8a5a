//! Per-exporter diagnostic counters.
//!
//! Every decode failure is packet-fatal at most; what survives a bad
//! datagram is its counter. The collector logs these periodically so a
//! misbehaving exporter is visible without killing the receive loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::template::ExporterKey;

#[derive(Debug, Default)]
pub struct ExporterStats {
    /// Successfully decoded datagrams.
    pub packets: AtomicU64,
    /// Flow records emitted.
    pub flows: AtomicU64,
    /// Datagrams that ended before their declared structure.
    pub truncated: AtomicU64,
    /// Framing violations (bad set lengths, stride mismatches, overruns).
    pub malformed: AtomicU64,
    /// Version tags other than 1/5/9/10.
    pub unsupported: AtomicU64,
    /// Datagrams parked while waiting for a template.
    pub deferred: AtomicU64,
    /// Deferred datagrams dropped because their template never came.
    pub template_timeout: AtomicU64,
    /// Fields decoded as opaque bytes because the catalog has no entry.
    pub unknown_fields: AtomicU64,
    /// v9 header `count` disagreeing with the records actually present.
    pub count_mismatch: AtomicU64,
    /// Detected exporter restarts (sequence reset + template reshape).
    pub restarts: AtomicU64,
}

impl ExporterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ExporterStatsSnapshot {
        ExporterStatsSnapshot {
            packets: self.packets.load(Ordering::Relaxed),
            flows: self.flows.load(Ordering::Relaxed),
            truncated: self.truncated.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unsupported: self.unsupported.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            template_timeout: self.template_timeout.load(Ordering::Relaxed),
            unknown_fields: self.unknown_fields.load(Ordering::Relaxed),
            count_mismatch: self.count_mismatch.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExporterStatsSnapshot {
    pub packets: u64,
    pub flows: u64,
    pub truncated: u64,
    pub malformed: u64,
    pub unsupported: u64,
    pub deferred: u64,
    pub template_timeout: u64,
    pub unknown_fields: u64,
    pub count_mismatch: u64,
    pub restarts: u64,
}

impl ExporterStatsSnapshot {
    /// Sum of everything that went wrong for this exporter.
    pub fn error_total(&self) -> u64 {
        self.truncated + self.malformed + self.unsupported + self.template_timeout
    }
}

/// Shared registry of per-exporter counters.
#[derive(Clone, Default)]
pub struct StatsRegistry {
    exporters: Arc<RwLock<HashMap<ExporterKey, Arc<ExporterStats>>>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, exporter: ExporterKey) -> Arc<ExporterStats> {
        {
            let stats = self.exporters.read();
            if let Some(s) = stats.get(&exporter) {
                return s.clone();
            }
        }
        let mut stats = self.exporters.write();
        stats
            .entry(exporter)
            .or_insert_with(|| Arc::new(ExporterStats::new()))
            .clone()
    }

    pub fn exporter_count(&self) -> usize {
        self.exporters.read().len()
    }

    pub fn all(&self) -> HashMap<String, ExporterStatsSnapshot> {
        self.exporters
            .read()
            .iter()
            .map(|(key, stats)| (key.to_string(), stats.snapshot()))
            .collect()
    }
}
