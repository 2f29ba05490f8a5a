//! NetFlow v1: fixed 16-byte header, `count` 48-byte records, no templates.

use deku::prelude::*;

use super::cursor::Cursor;
use super::error::DecodeError;
use super::record::{FieldValue, FlowRecord, HeaderV1, PacketV1};

pub const HEADER_LEN: usize = 16;
pub const RECORD_LEN: usize = 48;

/// NetFlow v1 flow record (48 bytes on the wire).
#[derive(Debug, Clone, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct RecordV1 {
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
    pub pad1: u16,
    pub prot: u8,
    pub tos: u8,
    pub tcp_flags: u8,
    pub pad2: [u8; 7],
}

impl RecordV1 {
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
        flow.insert("PROTO", FieldValue::U8(self.prot));
        flow.insert("TOS", FieldValue::U8(self.tos));
        flow.insert("TCP_FLAGS", FieldValue::U8(self.tcp_flags));
        flow
    }
}

pub(crate) fn parse(data: &[u8]) -> Result<PacketV1, DecodeError> {
    let mut cur = Cursor::new(data);
    let header_bytes = cur.read_bytes(HEADER_LEN)?;
    let (_, header) = HeaderV1::from_bytes((header_bytes, 0))
        .map_err(|e| DecodeError::malformed(format!("v1 header: {e}")))?;

    let mut flows = Vec::with_capacity(header.count as usize);
    for _ in 0..header.count {
        let chunk = cur.read_bytes(RECORD_LEN)?;
        let (_, record) = RecordV1::from_bytes((chunk, 0))
            .map_err(|e| DecodeError::malformed(format!("v1 record: {e}")))?;
        flows.push(record.into_flow());
    }

    Ok(PacketV1 { header, flows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::testutil::from_hex;

    // Two flows from one ICMP ping request/reply session, captured from
    // softflowd.
    const PACKET_V1: &str = "000100020001189b5e80c32c2fd41848ac110002ac11000100000000000000000000000a00000348\
                             000027c700004af100000800000001000000000000000000ac110001ac1100020000000000000000\
                             0000000a00000348000027c700004af100000000000001000000000000000000";

    #[test]
    fn test_parse_v1_packet() {
        let data = from_hex(PACKET_V1);
        let packet = parse(&data).unwrap();

        assert_eq!(packet.header.version, 1);
        assert_eq!(packet.header.count, 2);
        assert_eq!(packet.flows.len(), 2);

        let flow = &packet.flows[0];
        assert_eq!(
            flow.get("IPV4_SRC_ADDR").unwrap(),
            &FieldValue::Ipv4("172.17.0.2".parse().unwrap())
        );
        assert_eq!(
            flow.get("IPV4_DST_ADDR").unwrap(),
            &FieldValue::Ipv4("172.17.0.1".parse().unwrap())
        );
        assert_eq!(flow.get("PROTO").unwrap(), &FieldValue::U8(1));
        assert_eq!(flow.get("IN_PACKETS").unwrap(), &FieldValue::U32(10));
        assert_eq!(flow.get("IN_OCTETS").unwrap(), &FieldValue::U32(0x348));
    }

    #[test]
    fn test_truncated_record_fails() {
        let data = from_hex(PACKET_V1);
        let err = parse(&data[..data.len() - 10]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn test_header_only_with_zero_count() {
        let mut data = from_hex(PACKET_V1)[..HEADER_LEN].to_vec();
        data[3] = 0; // count = 0
        let packet = parse(&data).unwrap();
        assert!(packet.flows.is_empty());
    }
}
