//! NetFlow v5: fixed 24-byte header, `count` 48-byte records, no templates.

use deku::prelude::*;

use super::cursor::Cursor;
use super::error::DecodeError;
use super::record::{FieldValue, FlowRecord, HeaderV5, PacketV5};

pub const HEADER_LEN: usize = 24;
pub const RECORD_LEN: usize = 48;

/// NetFlow v5 flow record (48 bytes on the wire).
#[derive(Debug, Clone, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct RecordV5 {
    pub src_addr: u32,
    pub dst_addr: u32,
    pub next_hop: u32,
    pub input: u16,
    pub output: u16,
    pub d_pkts: u32,
    pub d_octets: u32,
    pub first: u32,
    pub last: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub pad1: u8,
    pub tcp_flags: u8,
    pub prot: u8,
    pub tos: u8,
    pub src_as: u16,
    pub dst_as: u16,
    pub src_mask: u8,
    pub dst_mask: u8,
    pub pad2: u16,
}

impl RecordV5 {
    fn into_flow(self) -> FlowRecord {
        let mut flow = FlowRecord::new();
        flow.insert("IPV4_SRC_ADDR", FieldValue::Ipv4(self.src_addr.into()));
        flow.insert("IPV4_DST_ADDR", FieldValue::Ipv4(self.dst_addr.into()));
        flow.insert("NEXT_HOP", FieldValue::Ipv4(self.next_hop.into()));
        flow.insert("INPUT", FieldValue::U16(self.input));
        flow.insert("OUTPUT", FieldValue::U16(self.output));
        flow.insert("IN_PACKETS", FieldValue::U32(self.d_pkts));
        flow.insert("IN_OCTETS", FieldValue::U32(self.d_octets));
        flow.insert("FIRST_SWITCHED", FieldValue::U32(self.first));
        flow.insert("LAST_SWITCHED", FieldValue::U32(self.last));
        flow.insert("SRC_PORT", FieldValue::U16(self.src_port));
        flow.insert("DST_PORT", FieldValue::U16(self.dst_port));
        flow.insert("TCP_FLAGS", FieldValue::U8(self.tcp_flags));
        flow.insert("PROTO", FieldValue::U8(self.prot));
        flow.insert("TOS", FieldValue::U8(self.tos));
        flow.insert("SRC_AS", FieldValue::U16(self.src_as));
        flow.insert("DST_AS", FieldValue::U16(self.dst_as));
        flow.insert("SRC_MASK", FieldValue::U8(self.src_mask));
        flow.insert("DST_MASK", FieldValue::U8(self.dst_mask));
        flow
    }
}

pub(crate) fn parse(data: &[u8]) -> Result<PacketV5, DecodeError> {
    let mut cur = Cursor::new(data);
    let header_bytes = cur.read_bytes(HEADER_LEN)?;
    let (_, header) = HeaderV5::from_bytes((header_bytes, 0))
        .map_err(|e| DecodeError::malformed(format!("v5 header: {e}")))?;

    let mut flows = Vec::with_capacity(header.count as usize);
    for _ in 0..header.count {
        let chunk = cur.read_bytes(RECORD_LEN)?;
        let (_, record) = RecordV5::from_bytes((chunk, 0))
            .map_err(|e| DecodeError::malformed(format!("v5 record: {e}")))?;
        flows.push(record.into_flow());
    }

    Ok(PacketV5 { header, flows })
}
