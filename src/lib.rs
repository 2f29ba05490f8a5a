//! NetFlow v1/v5/v9 and IPFIX (RFC 7011) collector library.
//!
//! The core is a stateful, single-threaded [`decode::Decoder`]: feed it
//! raw UDP payloads and it hands back decoded [`decode::ExportPacket`]s,
//! managing per-exporter templates and holding back datagrams whose
//! templates have not arrived yet. [`collector::Collector`] is the
//! reference embedder, persisting decoded packets as gzipped JSON lines.

pub mod collector;
pub mod config;
pub mod decode;
pub mod stats;
pub mod template;

pub use collector::Collector;
pub use config::Config;
pub use decode::{
    DecodeError, Decoder, DecoderConfig, ExportPacket, FieldValue, FlowRecord, ResolvedPacket,
    SnapshotError,
};
pub use stats::{ExporterStats, ExporterStatsSnapshot, StatsRegistry};
pub use template::{
    ExporterKey, Template, TemplateChange, TemplateField, TemplateKind, TemplateRegistry,
};
