//! Shared NetFlow v9 / IPFIX information-element catalog.
//!
//! NetFlow v9 field types and IPFIX information elements share numbering
//! below the enterprise bit (RFC 3954 section 8, RFC 7011, IANA "IPFIX
//! Information Elements" registry). One catalog therefore serves both
//! parsers: it maps the numeric id to a canonical uppercase identifier and
//! a semantic kind. Field ids missing from the catalog decode as opaque
//! bytes keyed by their numeric id, so no information is lost.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

use super::record::FieldValue;

/// How the value octets of a field are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Unsigned integer of the width declared by the template. Widths that
    /// are not a power of two are left-zero-padded (reduced-size encoding).
    Unsigned,
    /// 4-byte IPv4 address.
    Ipv4,
    /// 16-byte IPv6 address.
    Ipv6,
    /// 6-byte MAC address.
    Mac,
    /// Raw octets: octetArray, string and every other IANA type outside
    /// the decoder's sum type.
    Bytes,
}

use FieldKind::{Bytes, Ipv4, Ipv6, Mac, Unsigned};

/// Canonical field catalog, ordered by id.
///
/// Names follow the Cisco v9 field-type table; ids defined only for IPFIX
/// keep the same naming style. Cisco ASA (`NF_F_*`) and PAN-OS (`PANOS_*`)
/// extensions are included because they show up in real exports.
static CATALOG: &[(u16, &str, FieldKind)] = &[
    (1, "IN_BYTES", Unsigned),
    (2, "IN_PKTS", Unsigned),
    (3, "FLOWS", Unsigned),
    (4, "PROTOCOL", Unsigned),
    (5, "SRC_TOS", Unsigned),
    (6, "TCP_FLAGS", Unsigned),
    (7, "L4_SRC_PORT", Unsigned),
    (8, "IPV4_SRC_ADDR", Ipv4),
    (9, "SRC_MASK", Unsigned),
    (10, "INPUT_SNMP", Unsigned),
    (11, "L4_DST_PORT", Unsigned),
    (12, "IPV4_DST_ADDR", Ipv4),
    (13, "DST_MASK", Unsigned),
    (14, "OUTPUT_SNMP", Unsigned),
    (15, "IPV4_NEXT_HOP", Ipv4),
    (16, "SRC_AS", Unsigned),
    (17, "DST_AS", Unsigned),
    (18, "BGP_IPV4_NEXT_HOP", Ipv4),
    (19, "MUL_DST_PKTS", Unsigned),
    (20, "MUL_DST_BYTES", Unsigned),
    (21, "LAST_SWITCHED", Unsigned),
    (22, "FIRST_SWITCHED", Unsigned),
    (23, "OUT_BYTES", Unsigned),
    (24, "OUT_PKTS", Unsigned),
    (25, "MIN_PKT_LNGTH", Unsigned),
    (26, "MAX_PKT_LNGTH", Unsigned),
    (27, "IPV6_SRC_ADDR", Ipv6),
    (28, "IPV6_DST_ADDR", Ipv6),
    (29, "IPV6_SRC_MASK", Unsigned),
    (30, "IPV6_DST_MASK", Unsigned),
    (31, "IPV6_FLOW_LABEL", Unsigned),
    (32, "ICMP_TYPE", Unsigned),
    (33, "MUL_IGMP_TYPE", Unsigned),
    (34, "SAMPLING_INTERVAL", Unsigned),
    (35, "SAMPLING_ALGORITHM", Unsigned),
    (36, "FLOW_ACTIVE_TIMEOUT", Unsigned),
    (37, "FLOW_INACTIVE_TIMEOUT", Unsigned),
    (38, "ENGINE_TYPE", Unsigned),
    (39, "ENGINE_ID", Unsigned),
    (40, "TOTAL_BYTES_EXP", Unsigned),
    (41, "TOTAL_PKTS_EXP", Unsigned),
    (42, "TOTAL_FLOWS_EXP", Unsigned),
    // 43 vendor proprietary
    (44, "IPV4_SRC_PREFIX", Ipv4),
    (45, "IPV4_DST_PREFIX", Ipv4),
    (46, "MPLS_TOP_LABEL_TYPE", Unsigned),
    (47, "MPLS_TOP_LABEL_IP_ADDR", Ipv4),
    (48, "FLOW_SAMPLER_ID", Unsigned),
    (49, "FLOW_SAMPLER_MODE", Unsigned),
    (50, "FLOW_SAMPLER_RANDOM_INTERVAL", Unsigned),
    // 51 vendor proprietary
    (52, "MIN_TTL", Unsigned),
    (53, "MAX_TTL", Unsigned),
    (54, "IPV4_IDENT", Unsigned),
    (55, "DST_TOS", Unsigned),
    (56, "IN_SRC_MAC", Mac),
    (57, "OUT_DST_MAC", Mac),
    (58, "SRC_VLAN", Unsigned),
    (59, "DST_VLAN", Unsigned),
    (60, "IP_PROTOCOL_VERSION", Unsigned),
    (61, "DIRECTION", Unsigned),
    (62, "IPV6_NEXT_HOP", Ipv6),
    (63, "BGP_IPV6_NEXT_HOP", Ipv6),
    (64, "IPV6_OPTION_HEADERS", Unsigned),
    // 65-69 vendor proprietary
    (70, "MPLS_LABEL_1", Bytes),
    (71, "MPLS_LABEL_2", Bytes),
    (72, "MPLS_LABEL_3", Bytes),
    (73, "MPLS_LABEL_4", Bytes),
    (74, "MPLS_LABEL_5", Bytes),
    (75, "MPLS_LABEL_6", Bytes),
    (76, "MPLS_LABEL_7", Bytes),
    (77, "MPLS_LABEL_8", Bytes),
    (78, "MPLS_LABEL_9", Bytes),
    (79, "MPLS_LABEL_10", Bytes),
    (80, "IN_DST_MAC", Mac),
    (81, "OUT_SRC_MAC", Mac),
    (82, "IF_NAME", Bytes),
    (83, "IF_DESC", Bytes),
    (84, "SAMPLER_NAME", Bytes),
    (85, "IN_PERMANENT_BYTES", Unsigned),
    (86, "IN_PERMANENT_PKTS", Unsigned),
    // 87 vendor proprietary
    (88, "FRAGMENT_OFFSET", Unsigned),
    (89, "FORWARDING_STATUS", Unsigned),
    (90, "MPLS_PAL_RD", Bytes),
    (91, "MPLS_PREFIX_LEN", Unsigned),
    (92, "SRC_TRAFFIC_INDEX", Unsigned),
    (93, "DST_TRAFFIC_INDEX", Unsigned),
    (94, "APPLICATION_DESCRIPTION", Bytes),
    (95, "APPLICATION_TAG", Bytes),
    (96, "APPLICATION_NAME", Bytes),
    (98, "POST_IP_DSCP", Unsigned),
    (99, "REPLICATION_FACTOR", Unsigned),
    (102, "LAYER2_PACKET_SECTION_OFFSET", Unsigned),
    (103, "LAYER2_PACKET_SECTION_SIZE", Unsigned),
    (104, "LAYER2_PACKET_SECTION_DATA", Bytes),
    // IPFIX ids past the v9 compatibility range (IANA registry).
    (128, "BGP_NEXT_ADJACENT_AS", Unsigned),
    (129, "BGP_PREV_ADJACENT_AS", Unsigned),
    (130, "EXPORTER_IPV4_ADDRESS", Ipv4),
    (131, "EXPORTER_IPV6_ADDRESS", Ipv6),
    (132, "DROPPED_IN_BYTES", Unsigned),
    (133, "DROPPED_IN_PKTS", Unsigned),
    (134, "DROPPED_TOTAL_BYTES", Unsigned),
    (135, "DROPPED_TOTAL_PKTS", Unsigned),
    (136, "FLOW_END_REASON", Unsigned),
    (138, "OBSERVATION_POINT_ID", Unsigned),
    (139, "ICMP_TYPE_CODE_IPV6", Unsigned),
    (140, "MPLS_TOP_LABEL_IPV6_ADDR", Ipv6),
    (145, "TEMPLATE_ID", Unsigned),
    (148, "NF_F_CONN_ID", Unsigned),
    (149, "OBSERVATION_DOMAIN_ID", Unsigned),
    (150, "FLOW_START_SECONDS", Unsigned),
    (151, "FLOW_END_SECONDS", Unsigned),
    (152, "NF_F_FLOW_CREATE_TIME_MSEC", Unsigned),
    (153, "FLOW_END_MILLISECONDS", Unsigned),
    (154, "FLOW_START_MICROSECONDS", Bytes),
    (155, "FLOW_END_MICROSECONDS", Bytes),
    (160, "SYSTEM_INIT_TIME_MSEC", Unsigned),
    (161, "FLOW_DURATION_MSEC", Unsigned),
    // Cisco ASA extensions.
    (176, "NF_F_ICMP_TYPE", Unsigned),
    (177, "NF_F_ICMP_CODE", Unsigned),
    (178, "NF_F_ICMP_TYPE_IPV6", Unsigned),
    (179, "NF_F_ICMP_CODE_IPV6", Unsigned),
    (225, "NF_F_XLATE_SRC_ADDR_IPV4", Ipv4),
    (226, "NF_F_XLATE_DST_ADDR_IPV4", Ipv4),
    (227, "NF_F_XLATE_SRC_PORT", Unsigned),
    (228, "NF_F_XLATE_DST_PORT", Unsigned),
    (231, "NF_F_FWD_FLOW_DELTA_BYTES", Unsigned),
    (232, "NF_F_REV_FLOW_DELTA_BYTES", Unsigned),
    (233, "NF_F_FW_EVENT", Unsigned),
    (281, "NF_F_XLATE_SRC_ADDR_IPV6", Ipv6),
    (282, "NF_F_XLATE_DST_ADDR_IPV6", Ipv6),
    (323, "NF_F_EVENT_TIME_MSEC", Unsigned),
    (33000, "NF_F_INGRESS_ACL_ID", Bytes),
    (33001, "NF_F_EGRESS_ACL_ID", Bytes),
    (33002, "NF_F_FW_EXT_EVENT", Unsigned),
    (40000, "NF_F_USERNAME", Bytes),
    // PaloAlto PAN-OS.
    (346, "PANOS_PRIVATE_ENTERPRISE_NUMBER", Unsigned),
    (56701, "PANOS_APPID", Bytes),
    (56702, "PANOS_USERID", Bytes),
];

fn catalog() -> &'static HashMap<u16, (&'static str, FieldKind)> {
    static MAP: OnceLock<HashMap<u16, (&'static str, FieldKind)>> = OnceLock::new();
    MAP.get_or_init(|| {
        CATALOG
            .iter()
            .map(|&(id, name, kind)| (id, (name, kind)))
            .collect()
    })
}

/// Look up a field id in the shared catalog.
pub fn lookup(id: u16) -> Option<(&'static str, FieldKind)> {
    catalog().get(&id).copied()
}

/// JSON key for an unknown or enterprise-specific field.
pub fn fallback_name(id: u16, enterprise: Option<u32>) -> String {
    match enterprise {
        Some(pen) => format!("_{pen}_{id}"),
        None => format!("_{id}"),
    }
}

/// NetFlow v9 options-template scope field types (RFC 3954 section 6.1).
pub fn scope_name(scope_type: u16) -> String {
    match scope_type {
        1 => "SCOPE_SYSTEM".to_string(),
        2 => "SCOPE_INTERFACE".to_string(),
        3 => "SCOPE_LINECARD".to_string(),
        4 => "SCOPE_CACHE".to_string(),
        5 => "SCOPE_TEMPLATE".to_string(),
        other => format!("_scope_{other}"),
    }
}

/// Decode an unsigned field of any declared width, left-zero-padding into
/// the next power-of-two width class. Widths above 8 octets fall back to
/// opaque bytes.
pub fn decode_unsigned(data: &[u8]) -> FieldValue {
    match data.len() {
        1 => FieldValue::U8(data[0]),
        2 => FieldValue::U16(u16::from_be_bytes([data[0], data[1]])),
        3 | 4 => {
            let mut buf = [0u8; 4];
            buf[4 - data.len()..].copy_from_slice(data);
            FieldValue::U32(u32::from_be_bytes(buf))
        }
        5..=8 => {
            let mut buf = [0u8; 8];
            buf[8 - data.len()..].copy_from_slice(data);
            FieldValue::U64(u64::from_be_bytes(buf))
        }
        _ => FieldValue::Bytes(data.to_vec()),
    }
}

/// Decode value octets according to the catalog kind.
///
/// The template-declared length always wins over the catalog: an
/// address-kind field exported with an unexpected width is preserved as
/// opaque bytes rather than rejected.
pub fn decode_value(kind: FieldKind, data: &[u8]) -> FieldValue {
    match kind {
        FieldKind::Unsigned => decode_unsigned(data),
        FieldKind::Ipv4 if data.len() == 4 => {
            FieldValue::Ipv4(Ipv4Addr::new(data[0], data[1], data[2], data[3]))
        }
        FieldKind::Ipv6 if data.len() == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(data);
            FieldValue::Ipv6(Ipv6Addr::from(octets))
        }
        FieldKind::Mac if data.len() == 6 => {
            let mut mac = [0u8; 6];
            mac.copy_from_slice(data);
            FieldValue::Mac(mac)
        }
        _ => FieldValue::Bytes(data.to_vec()),
    }
}
