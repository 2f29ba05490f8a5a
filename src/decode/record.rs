use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use deku::prelude::*;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::template::Template;

/// One decoded field value.
///
/// Unsigned widths mirror the declared field length (reduced-size encoding
/// rounds up to the next power-of-two class). Anything the catalog cannot
/// type, including enterprise-specific fields, is preserved as raw octets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Mac([u8; 6]),
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// The value as an unsigned integer, if it is one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U8(v) => Some(u64::from(*v)),
            Self::U16(v) => Some(u64::from(*v)),
            Self::U32(v) => Some(u64::from(*v)),
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::U8(v) => serializer.serialize_u8(*v),
            Self::U16(v) => serializer.serialize_u16(*v),
            Self::U32(v) => serializer.serialize_u32(*v),
            Self::U64(v) => serializer.serialize_u64(*v),
            Self::Ipv4(addr) => serializer.collect_str(addr),
            Self::Ipv6(addr) => serializer.collect_str(addr),
            Self::Mac(mac) => serializer.collect_str(&format_args!(
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            )),
            Self::Bytes(bytes) => match std::str::from_utf8(bytes) {
                // IPFIX string elements come through here; keep readable
                // payloads readable and hex-dump the rest.
                Ok(text) if !text.is_empty() && text.chars().all(|c| !c.is_control()) => {
                    serializer.serialize_str(text)
                }
                _ => {
                    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
                    serializer.serialize_str(&hex)
                }
            },
        }
    }
}

/// One decoded flow: canonical field name (or `_<id>` / `_<pen>_<id>` for
/// unknown and enterprise fields) to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowRecord(BTreeMap<String, FieldValue>);

impl FlowRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// NetFlow v1 packet header (16 bytes).
#[derive(Debug, Clone, PartialEq, Eq, DekuRead, DekuWrite, Serialize)]
#[deku(endian = "big")]
pub struct HeaderV1 {
    pub version: u16,
    pub count: u16,
    #[serde(rename = "uptime")]
    pub sys_uptime: u32,
    #[serde(rename = "timestamp")]
    pub unix_secs: u32,
    #[serde(rename = "timestamp_nano")]
    pub unix_nsecs: u32,
}

/// NetFlow v5 packet header (24 bytes).
#[derive(Debug, Clone, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct HeaderV5 {
    pub version: u16,
    pub count: u16,
    pub sys_uptime: u32,
    pub unix_secs: u32,
    pub unix_nsecs: u32,
    pub flow_sequence: u32,
    pub engine_type: u8,
    pub engine_id: u8,
    pub sampling_interval: u16,
}

impl HeaderV5 {
    /// Sampling mode, the top two bits of the sampling field.
    pub fn sampling_mode(&self) -> u8 {
        (self.sampling_interval >> 14) as u8
    }

    /// Sampling rate, the low 14 bits of the sampling field.
    pub fn sampling_rate(&self) -> u16 {
        self.sampling_interval & 0x3fff
    }
}

impl Serialize for HeaderV5 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("HeaderV5", 10)?;
        s.serialize_field("version", &self.version)?;
        s.serialize_field("count", &self.count)?;
        s.serialize_field("uptime", &self.sys_uptime)?;
        s.serialize_field("timestamp", &self.unix_secs)?;
        s.serialize_field("timestamp_nano", &self.unix_nsecs)?;
        s.serialize_field("sequence", &self.flow_sequence)?;
        s.serialize_field("engine_type", &self.engine_type)?;
        s.serialize_field("engine_id", &self.engine_id)?;
        s.serialize_field("sampling_mode", &self.sampling_mode())?;
        s.serialize_field("sampling_interval", &self.sampling_rate())?;
        s.end()
    }
}

/// NetFlow v9 packet header (20 bytes).
///
/// `count` is the number of records (template, options-template and data),
/// not flowsets; it is advisory only and never bounds iteration.
#[derive(Debug, Clone, PartialEq, Eq, DekuRead, DekuWrite, Serialize)]
#[deku(endian = "big")]
pub struct HeaderV9 {
    pub version: u16,
    pub count: u16,
    #[serde(rename = "uptime")]
    pub sys_uptime: u32,
    #[serde(rename = "timestamp")]
    pub unix_secs: u32,
    pub sequence: u32,
    pub source_id: u32,
}

/// IPFIX message header (16 bytes, RFC 7011 section 3.1).
///
/// Unlike v9, `length` is the total message length in octets and bounds
/// iteration.
#[derive(Debug, Clone, PartialEq, Eq, DekuRead, DekuWrite, Serialize)]
#[deku(endian = "big")]
pub struct HeaderIpfix {
    pub version: u16,
    pub length: u16,
    pub export_time: u32,
    pub sequence: u32,
    pub observation_domain_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketV1 {
    pub header: HeaderV1,
    pub flows: Vec<FlowRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketV5 {
    pub header: HeaderV5,
    pub flows: Vec<FlowRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketV9 {
    pub header: HeaderV9,
    pub flows: Vec<FlowRecord>,
    /// Templates newly installed or replaced by this datagram.
    #[serde(skip)]
    pub templates: Vec<Template>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketIpfix {
    pub header: HeaderIpfix,
    pub flows: Vec<FlowRecord>,
    #[serde(skip)]
    pub templates: Vec<Template>,
}

/// One successfully decoded export datagram, tagged by wire version.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExportPacket {
    V1(PacketV1),
    V5(PacketV5),
    V9(PacketV9),
    Ipfix(PacketIpfix),
}

impl ExportPacket {
    pub fn version(&self) -> u16 {
        match self {
            Self::V1(_) => 1,
            Self::V5(_) => 5,
            Self::V9(_) => 9,
            Self::Ipfix(_) => 10,
        }
    }

    pub fn flows(&self) -> &[FlowRecord] {
        match self {
            Self::V1(p) => &p.flows,
            Self::V5(p) => &p.flows,
            Self::V9(p) => &p.flows,
            Self::Ipfix(p) => &p.flows,
        }
    }

    /// Templates first seen (or redefined) in this datagram. Always empty
    /// for v1/v5.
    pub fn new_templates(&self) -> &[Template] {
        match self {
            Self::V9(p) => &p.templates,
            Self::Ipfix(p) => &p.templates,
            _ => &[],
        }
    }
}
