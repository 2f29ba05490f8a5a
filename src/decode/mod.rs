//! Stateful multi-version flow decoder.
//!
//! [`Decoder`] routes each datagram by its leading version tag, owns the
//! template registry for v9/IPFIX, and holds back datagrams whose data
//! sets reference templates that have not arrived yet. Deferred datagrams
//! re-emerge through [`Decoder::drain_resolved`] once their templates are
//! installed, carrying their original receipt time.

pub mod cursor;
pub mod error;
pub mod fields;
pub mod ipfix;
pub mod record;
pub mod v1;
pub mod v5;
pub mod v9;

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

pub use cursor::Cursor;
pub use error::{DecodeError, SnapshotError};
pub use record::{
    ExportPacket, FieldValue, FlowRecord, HeaderIpfix, HeaderV1, HeaderV5, HeaderV9, PacketIpfix,
    PacketV1, PacketV5, PacketV9,
};

use crate::stats::{ExporterStats, StatsRegistry};
use crate::template::{ExporterKey, TemplateRegistry};

/// Wire version tag, the first two bytes of every export datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
pub enum WireVersion {
    V1 = 1,
    V5 = 5,
    V9 = 9,
    Ipfix = 10,
}

/// Bounds on the per-exporter deferred-datagram queue.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Oldest entries are dropped once an exporter has this many datagrams
    /// waiting for templates.
    pub max_deferred_per_exporter: usize,
    /// Deferred datagrams older than this are dropped with a
    /// template-timeout diagnostic.
    pub deferred_ttl: Duration,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_deferred_per_exporter: 500,
            deferred_ttl: Duration::from_secs(600),
        }
    }
}

/// A deferred datagram that has been decoded after its templates arrived.
#[derive(Debug, Clone)]
pub struct ResolvedPacket {
    /// When the datagram originally arrived, not when it was resolved.
    pub received_at: SystemTime,
    pub exporter: ExporterKey,
    pub packet: ExportPacket,
}

#[derive(Debug)]
struct DeferredDatagram {
    data: Vec<u8>,
    received_at: SystemTime,
    missing: BTreeSet<u16>,
}

/// The dispatch layer: one instance per collector.
///
/// Single-threaded by design; decoding never blocks and performs no I/O.
pub struct Decoder {
    config: DecoderConfig,
    registry: TemplateRegistry,
    deferred: HashMap<ExporterKey, VecDeque<DeferredDatagram>>,
    resolved: VecDeque<ResolvedPacket>,
    last_sequence: HashMap<ExporterKey, u32>,
    stats: StatsRegistry,
}

impl Decoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self::with_registry(config, TemplateRegistry::new())
    }

    /// Start from a registry rehydrated out of a snapshot, so a restarted
    /// collector can decode data-only exporters immediately.
    pub fn with_registry(config: DecoderConfig, registry: TemplateRegistry) -> Self {
        Self {
            config,
            registry,
            deferred: HashMap::new(),
            resolved: VecDeque::new(),
            last_sequence: HashMap::new(),
            stats: StatsRegistry::new(),
        }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Shared handle to the per-exporter diagnostic counters.
    pub fn stats(&self) -> StatsRegistry {
        self.stats.clone()
    }

    /// Datagrams currently parked waiting for templates, across exporters.
    pub fn deferred_count(&self) -> usize {
        self.deferred.values().map(VecDeque::len).sum()
    }

    /// Forget all state held for one exporter: templates, deferred
    /// datagrams and sequence tracking. For use by embedders on idle
    /// timeout.
    pub fn drop_exporter(&mut self, exporter: &ExporterKey) {
        self.registry.drop_exporter(exporter);
        self.deferred.remove(exporter);
        self.last_sequence.remove(exporter);
    }

    /// Decode one datagram received from `peer` at `received_at`.
    ///
    /// `Ok(None)` means the datagram was legally deferred against missing
    /// templates; it will come back through [`Decoder::drain_resolved`]
    /// once they arrive. Errors are fatal for this datagram only.
    pub fn decode(
        &mut self,
        data: &[u8],
        peer: SocketAddr,
        received_at: SystemTime,
    ) -> Result<Option<ExportPacket>, DecodeError> {
        if data.len() < 2 {
            let stats = self.stats.get_or_create(ExporterKey::new(peer, 0));
            stats.truncated.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Err(DecodeError::Truncated {
                offset: 0,
                needed: 2,
                remaining: data.len(),
            });
        }

        let tag = u16::from_be_bytes([data[0], data[1]]);
        let Some(version) = WireVersion::from_u16(tag) else {
            // No registry mutation for unrecognized datagrams.
            let stats = self.stats.get_or_create(ExporterKey::new(peer, 0));
            stats.unsupported.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            tracing::debug!(version = tag, %peer, "unsupported export version");
            return Err(DecodeError::UnsupportedVersion(tag));
        };

        match version {
            WireVersion::V1 => {
                let exporter = ExporterKey::new(peer, 0);
                let stats = self.stats.get_or_create(exporter);
                let packet = v1::parse(data).map_err(|e| Self::count_error(&stats, e))?;
                Self::count_success(&stats, packet.flows.len());
                Ok(Some(ExportPacket::V1(packet)))
            }
            WireVersion::V5 => {
                let exporter = ExporterKey::new(peer, 0);
                let stats = self.stats.get_or_create(exporter);
                let packet = v5::parse(data).map_err(|e| Self::count_error(&stats, e))?;
                Self::count_success(&stats, packet.flows.len());
                Ok(Some(ExportPacket::V5(packet)))
            }
            WireVersion::V9 => {
                let domain = self.peek_domain_counted(data, 16, peer)?;
                self.decode_v9(data, ExporterKey::new(peer, domain), received_at)
            }
            WireVersion::Ipfix => {
                let domain = self.peek_domain_counted(data, 12, peer)?;
                self.decode_ipfix(data, ExporterKey::new(peer, domain), received_at)
            }
        }
    }

    /// Pull every deferred datagram that has been decoded since the last
    /// call, in per-exporter receipt order.
    pub fn drain_resolved(&mut self) -> impl Iterator<Item = ResolvedPacket> + '_ {
        self.resolved.drain(..)
    }

    /// Drop deferred datagrams older than the configured bound. The
    /// embedder calls this periodically; it also runs whenever an
    /// exporter's queue is touched.
    pub fn expire_deferred(&mut self, now: SystemTime) {
        let ttl = self.config.deferred_ttl;
        for (exporter, queue) in self.deferred.iter_mut() {
            let stats = self.stats.get_or_create(*exporter);
            expire_queue(queue, ttl, now, exporter, &stats);
        }
        self.deferred.retain(|_, queue| !queue.is_empty());
    }

    /// A datagram too short to carry its source/domain id cannot be keyed
    /// precisely; its truncation is attributed to domain 0 of the peer.
    fn peek_domain_counted(
        &mut self,
        data: &[u8],
        offset: usize,
        peer: SocketAddr,
    ) -> Result<u32, DecodeError> {
        peek_domain(data, offset).map_err(|e| {
            let stats = self.stats.get_or_create(ExporterKey::new(peer, 0));
            Self::count_error(&stats, e)
        })
    }

    fn decode_v9(
        &mut self,
        data: &[u8],
        exporter: ExporterKey,
        received_at: SystemTime,
    ) -> Result<Option<ExportPacket>, DecodeError> {
        let stats = self.stats.get_or_create(exporter);
        let out = v9::parse(data, exporter, &mut self.registry)
            .map_err(|e| Self::count_error(&stats, e))?;

        use std::sync::atomic::Ordering::Relaxed;
        if out.malformed_flowsets > 0 {
            stats.malformed.fetch_add(u64::from(out.malformed_flowsets), Relaxed);
            tracing::warn!(%exporter, flowsets = out.malformed_flowsets, "skipped malformed v9 flowsets");
        }
        stats.unknown_fields.fetch_add(out.unknown_fields, Relaxed);
        if out.missing_templates.is_empty() && out.records_seen != out.header.count as usize {
            stats.count_mismatch.fetch_add(1, Relaxed);
            tracing::debug!(
                %exporter,
                header_count = out.header.count,
                records = out.records_seen,
                "v9 header count disagrees with records present"
            );
        }

        self.track_restart(exporter, out.header.sequence, out.template_replaced, &stats);

        if !out.missing_templates.is_empty() {
            self.defer(exporter, data, received_at, out.missing_templates, &stats);
            return Ok(None);
        }

        if !out.templates.is_empty() {
            self.resolve_deferred(exporter);
        }

        Self::count_success(&stats, out.flows.len());
        Ok(Some(ExportPacket::V9(PacketV9 {
            header: out.header,
            flows: out.flows,
            templates: out.templates,
        })))
    }

    fn decode_ipfix(
        &mut self,
        data: &[u8],
        exporter: ExporterKey,
        received_at: SystemTime,
    ) -> Result<Option<ExportPacket>, DecodeError> {
        let stats = self.stats.get_or_create(exporter);
        let out = ipfix::parse(data, exporter, &mut self.registry)
            .map_err(|e| Self::count_error(&stats, e))?;

        use std::sync::atomic::Ordering::Relaxed;
        stats.unknown_fields.fetch_add(out.unknown_fields, Relaxed);
        if !out.withdrawn.is_empty() {
            tracing::debug!(%exporter, templates = ?out.withdrawn, "ipfix templates withdrawn");
        }

        self.track_restart(exporter, out.header.sequence, out.template_replaced, &stats);

        if !out.missing_templates.is_empty() {
            self.defer(exporter, data, received_at, out.missing_templates, &stats);
            return Ok(None);
        }

        if !out.templates.is_empty() {
            self.resolve_deferred(exporter);
        }

        Self::count_success(&stats, out.flows.len());
        Ok(Some(ExportPacket::Ipfix(PacketIpfix {
            header: out.header,
            flows: out.flows,
            templates: out.templates,
        })))
    }

    /// Advisory exporter-restart detection: a sequence reset together with
    /// a template redefined to a new shape. Surfaced via counter and log;
    /// the deferred queue for the exporter is invalidated because its
    /// entries reference pre-restart template shapes.
    fn track_restart(
        &mut self,
        exporter: ExporterKey,
        sequence: u32,
        template_replaced: bool,
        stats: &Arc<ExporterStats>,
    ) {
        let prev = self.last_sequence.insert(exporter, sequence);
        let Some(prev) = prev else { return };
        if sequence >= prev || !template_replaced {
            return;
        }

        use std::sync::atomic::Ordering::Relaxed;
        stats.restarts.fetch_add(1, Relaxed);
        if let Some(queue) = self.deferred.remove(&exporter) {
            stats.template_timeout.fetch_add(queue.len() as u64, Relaxed);
        }
        tracing::info!(
            %exporter,
            prev_sequence = prev,
            sequence,
            "exporter restart detected, invalidating deferred datagrams"
        );
    }

    fn defer(
        &mut self,
        exporter: ExporterKey,
        data: &[u8],
        received_at: SystemTime,
        missing: BTreeSet<u16>,
        stats: &Arc<ExporterStats>,
    ) {
        use std::sync::atomic::Ordering::Relaxed;
        tracing::debug!(%exporter, templates = ?missing, "deferring datagram until templates arrive");
        stats.deferred.fetch_add(1, Relaxed);

        let queue = self.deferred.entry(exporter).or_default();
        expire_queue(queue, self.config.deferred_ttl, received_at, &exporter, stats);
        while queue.len() >= self.config.max_deferred_per_exporter {
            queue.pop_front();
            stats.template_timeout.fetch_add(1, Relaxed);
            tracing::warn!(%exporter, "deferred queue full, dropping oldest datagram");
        }
        queue.push_back(DeferredDatagram {
            data: data.to_vec(),
            received_at,
            missing,
        });
    }

    /// Re-decode every deferred datagram of this exporter whose missing
    /// templates are now known. Queue order is receipt order, so resolved
    /// packets are emitted in receipt order.
    fn resolve_deferred(&mut self, exporter: ExporterKey) {
        let Self {
            registry,
            deferred,
            resolved,
            stats,
            ..
        } = self;
        let Some(queue) = deferred.get_mut(&exporter) else {
            return;
        };
        let stats = stats.get_or_create(exporter);

        let mut pending = VecDeque::new();
        while let Some(mut entry) = queue.pop_front() {
            entry
                .missing
                .retain(|&id| registry.get(&exporter, id).is_none());
            if !entry.missing.is_empty() {
                pending.push_back(entry);
                continue;
            }

            match redecode(&entry.data, exporter, registry) {
                Ok(Some(packet)) => {
                    use std::sync::atomic::Ordering::Relaxed;
                    stats.packets.fetch_add(1, Relaxed);
                    stats.flows.fetch_add(packet.flows().len() as u64, Relaxed);
                    resolved.push_back(ResolvedPacket {
                        received_at: entry.received_at,
                        exporter,
                        packet,
                    });
                }
                Ok(None) => {
                    // A template this entry needs was withdrawn or
                    // replaced between deferral and now; keep waiting.
                    pending.push_back(entry);
                }
                Err(e) => {
                    use std::sync::atomic::Ordering::Relaxed;
                    stats.malformed.fetch_add(1, Relaxed);
                    tracing::warn!(%exporter, error = %e, "deferred datagram failed to re-decode");
                }
            }
        }
        *queue = pending;
        if queue.is_empty() {
            deferred.remove(&exporter);
        }
    }

    fn count_error(stats: &Arc<ExporterStats>, e: DecodeError) -> DecodeError {
        use std::sync::atomic::Ordering::Relaxed;
        match &e {
            DecodeError::Truncated { .. } => stats.truncated.fetch_add(1, Relaxed),
            DecodeError::Malformed(_) => stats.malformed.fetch_add(1, Relaxed),
            DecodeError::UnsupportedVersion(_) => stats.unsupported.fetch_add(1, Relaxed),
        };
        e
    }

    fn count_success(stats: &Arc<ExporterStats>, flows: usize) {
        use std::sync::atomic::Ordering::Relaxed;
        stats.packets.fetch_add(1, Relaxed);
        stats.flows.fetch_add(flows as u64, Relaxed);
    }
}

/// Decode a previously deferred datagram again, now that its templates are
/// in the registry.
fn redecode(
    data: &[u8],
    exporter: ExporterKey,
    registry: &mut TemplateRegistry,
) -> Result<Option<ExportPacket>, DecodeError> {
    let tag = u16::from_be_bytes([data[0], data[1]]);
    match WireVersion::from_u16(tag) {
        Some(WireVersion::V9) => {
            let out = v9::parse(data, exporter, registry)?;
            if !out.missing_templates.is_empty() {
                return Ok(None);
            }
            Ok(Some(ExportPacket::V9(PacketV9 {
                header: out.header,
                flows: out.flows,
                templates: out.templates,
            })))
        }
        Some(WireVersion::Ipfix) => {
            let out = ipfix::parse(data, exporter, registry)?;
            if !out.missing_templates.is_empty() {
                return Ok(None);
            }
            Ok(Some(ExportPacket::Ipfix(PacketIpfix {
                header: out.header,
                flows: out.flows,
                templates: out.templates,
            })))
        }
        // Only v9/IPFIX datagrams are ever deferred.
        _ => Err(DecodeError::UnsupportedVersion(tag)),
    }
}

fn expire_queue(
    queue: &mut VecDeque<DeferredDatagram>,
    ttl: Duration,
    now: SystemTime,
    exporter: &ExporterKey,
    stats: &Arc<ExporterStats>,
) {
    use std::sync::atomic::Ordering::Relaxed;
    while let Some(front) = queue.front() {
        let expired = now
            .duration_since(front.received_at)
            .map(|age| age > ttl)
            .unwrap_or(false);
        if !expired {
            break;
        }
        queue.pop_front();
        stats.template_timeout.fetch_add(1, Relaxed);
        tracing::warn!(%exporter, "dropping deferred datagram, template never arrived");
    }
}

/// Peek the source id (v9) / observation domain id (IPFIX) out of the
/// datagram header to complete the exporter key.
fn peek_domain(data: &[u8], offset: usize) -> Result<u32, DecodeError> {
    if data.len() < offset + 4 {
        return Err(DecodeError::Truncated {
            offset: data.len(),
            needed: offset + 4 - data.len(),
            remaining: 0,
        });
    }
    Ok(u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]))
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Shared test fixtures: hex vectors captured from softflowd plus
    //! byte-level packet builders for the cases no capture covers.

    /// Two templates (1024: IPv4, 2048: IPv6) followed by eight IPv4 flows.
    pub(crate) const PACKET_V9_TEMPLATE: &str =
        "0009000a000000035c9f55980000000100000000000000400400000e00080004000c000400150004\
         001600040001000400020004000a0004000e000400070002000b00020004000100060001003c0001\
         00050001000000400800000e001b0010001c001000150004001600040001000400020004000a0004\
         000e000400070002000b00020004000100060001003c000100050001040001447f0000017f000001\
         fb3c1aaafb3c18fd000190100000004b00000000000000000050942c061b04007f0000017f000001\
         fb3c1aaafb3c18fd00000f94000000360000000000000000942c0050061f04007f0000017f000001\
         fb3c1cfcfb3c1a9b0000d3fc0000002a000000000000000000509434061b04007f0000017f000001\
         fb3c1cfcfb3c1a9b00000a490000001e000000000000000094340050061f04007f0000017f000001\
         fb3bb82cfb3ba48b000002960000000300000000000000000050942a061904007f0000017f000001\
         fb3bb82cfb3ba48b00000068000000020000000000000000942a0050061104007f0000017f000001\
         fb3c1900fb3c18fe0000004c0000000100000000000000000035b3c9110004007f0000017f000001\
         fb3c1900fb3c18fe0000003c000000010000000000000000b3c9003511000400";

    /// The same content with the data flowset *before* the two template
    /// flowsets, exercising in-datagram template resolution.
    pub(crate) const PACKET_V9_TEMPLATE_MIXED: &str =
        "0009000a000000035c9f55980000000100000000\
         040001447f0000017f000001fb3c1aaafb3c18fd000190100000004b00000000000000000050942c\
         061b04007f0000017f000001fb3c1aaafb3c18fd00000f94000000360000000000000000942c0050\
         061f04007f0000017f000001fb3c1cfcfb3c1a9b0000d3fc0000002a000000000000000000509434\
         061b04007f0000017f000001fb3c1cfcfb3c1a9b00000a490000001e000000000000000094340050\
         061f04007f0000017f000001fb3bb82cfb3ba48b000002960000000300000000000000000050942a\
         061904007f0000017f000001fb3bb82cfb3ba48b00000068000000020000000000000000942a0050\
         061104007f0000017f000001fb3c1900fb3c18fe0000004c0000000100000000000000000035b3c9\
         110004007f0000017f000001fb3c1900fb3c18fe0000003c000000010000000000000000b3c90035\
         11000400\
         000000400400000e00080004000c000400150004001600040001000400020004\
         000a0004000e000400070002000b00020004000100060001003c000100050001\
         000000400800000e001b0010001c001000150004001600040001000400020004\
         000a0004000e000400070002000b00020004000100060001003c000100050001";

    /// Data-only packets (12 flows each) referencing template 1024.
    pub(crate) const PACKETS_V9_DATA: [&str; 3] = [
        "0009000c000000035c9f55980000000200000000040001e47f0000017f000001fb3c1a17fb3c19fd\
         000001480000000200000000000000000035ea82110004007f0000017f000001fb3c1a17fb3c19fd\
         0000007a000000020000000000000000ea820035110004007f0000017f000001fb3c1a17fb3c19fd\
         000000f80000000200000000000000000035c6e2110004007f0000017f000001fb3c1a17fb3c19fd\
         0000007a000000020000000000000000c6e20035110004007f0000017f000001fb3c1a9efb3c1a9c\
         0000004c0000000100000000000000000035adc1110004007f0000017f000001fb3c1a9efb3c1a9c\
         0000003c000000010000000000000000adc10035110004007f0000017f000001fb3c1b74fb3c1b72\
         0000004c0000000100000000000000000035d0b3110004007f0000017f000001fb3c1b74fb3c1b72\
         0000003c000000010000000000000000d0b30035110004007f0000017f000001fb3c2f59fb3c1b71\
         00001a350000000a000000000000000000509436061b04007f0000017f000001fb3c2f59fb3c1b71\
         0000038a0000000a000000000000000094360050061b04007f0000017f000001fb3c913bfb3c9138\
         0000004c0000000100000000000000000035e262110004007f0000017f000001fb3c913bfb3c9138\
         0000003c000000010000000000000000e262003511000400",
        "0009000c000000035c9f55980000000300000000040001e47f0000017f000001fb3ca523fb3c913b\
         0000030700000005000000000000000000509438061b04007f0000017f000001fb3ca523fb3c913b\
         000002a200000005000000000000000094380050061b04007f0000017f000001fb3f7fe1fb3dbc97\
         0002d52800000097000000000000000001bb8730061b04007f0000017f000001fb3f7fe1fb3dbc97\
         0000146c000000520000000000000000873001bb061f04007f0000017f000001fb3d066ffb3d066c\
         0000004c0000000100000000000000000035e5bd110004007f0000017f000001fb3d066ffb3d066c\
         0000003c000000010000000000000000e5bd0035110004007f0000017f000001fb3d1a61fb3d066b\
         000003060000000500000000000000000050943a061b04007f0000017f000001fb3d1a61fb3d066b\
         000002a2000000050000000000000000943a0050061b04007f0000017f000001fb3fed00fb3f002c\
         0000344000000016000000000000000001bbae50061f04007f0000017f000001fb3fed00fb3f002c\
         00000a47000000120000000000000000ae5001bb061b04007f0000017f000001fb402f17fb402a75\
         0003524c000000a5000000000000000001bbc48c061b04007f0000017f000001fb402f17fb402a75\
         000020a60000007e0000000000000000c48c01bb061f0400",
        "0009000c000000035c9f55980000000400000000040001e47f0000017f000001fb3d7ba2fb3d7ba0\
         0000004c0000000100000000000000000035a399110004007f0000017f000001fb3d7ba2fb3d7ba0\
         0000003c000000010000000000000000a3990035110004007f0000017f000001fb3d8f85fb3d7b9f\
         000003070000000500000000000000000050943c061b04007f0000017f000001fb3d8f85fb3d7b9f\
         000002a2000000050000000000000000943c0050061b04007f0000017f000001fb3d9165fb3d7f6d\
         0000c97b0000002a000000000000000001bbae48061b04007f0000017f000001fb3d9165fb3d7f6d\
         000007f40000001a0000000000000000ae4801bb061b04007f0000017f000001fb3dbc96fb3dbc7e\
         0000011e0000000200000000000000000035bd4f110004007f0000017f000001fb3dbc96fb3dbc7e\
         0000008e000000020000000000000000bd4f0035110004007f0000017f000001fb3ddbb3fb3c1a18\
         0000bfee0000002f00000000000000000050ae56061b04007f0000017f000001fb3ddbb3fb3c1a18\
         00000982000000270000000000000000ae560050061b04007f0000017f000001fb3ddbb3fb3c1a18\
         0000130e0000001200000000000000000050e820061b04007f0000017f000001fb3ddbb3fb3c1a18\
         0000059c000000140000000000000000e8200050061b0400",
    ];

    pub(crate) fn from_hex(hex: &str) -> Vec<u8> {
        let cleaned: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
        assert!(cleaned.len() % 2 == 0, "odd hex string length");
        (0..cleaned.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&cleaned[i..i + 2], 16).unwrap())
            .collect()
    }

    /// Assemble an IPFIX message around pre-built sets.
    pub(crate) fn ipfix_message(domain: u32, sets: &[Vec<u8>]) -> Vec<u8> {
        ipfix_message_with_seq(domain, 0, sets)
    }

    pub(crate) fn ipfix_message_with_seq(domain: u32, sequence: u32, sets: &[Vec<u8>]) -> Vec<u8> {
        let total = 16 + sets.iter().map(Vec::len).sum::<usize>();
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&10u16.to_be_bytes());
        buf.extend_from_slice(&(total as u16).to_be_bytes());
        buf.extend_from_slice(&1_700_000_000u32.to_be_bytes());
        buf.extend_from_slice(&sequence.to_be_bytes());
        buf.extend_from_slice(&domain.to_be_bytes());
        for set in sets {
            buf.extend_from_slice(set);
        }
        buf
    }

    /// One set: header plus body, length filled in.
    pub(crate) fn ipfix_set(set_id: u16, body: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + body.len());
        buf.extend_from_slice(&set_id.to_be_bytes());
        buf.extend_from_slice(&((4 + body.len()) as u16).to_be_bytes());
        buf.extend_from_slice(body);
        buf
    }

    /// A template set holding one template of plain (id, length) fields.
    pub(crate) fn ipfix_template_set(template_id: u16, fields: &[(u16, u16)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&template_id.to_be_bytes());
        body.extend_from_slice(&(fields.len() as u16).to_be_bytes());
        for &(id, length) in fields {
            body.extend_from_slice(&id.to_be_bytes());
            body.extend_from_slice(&length.to_be_bytes());
        }
        ipfix_set(2, &body)
    }
}
