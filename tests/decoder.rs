//! End-to-end decoder scenarios over the public API, driven by hex dumps
//! of real softflowd exports plus hand-assembled IPFIX messages.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use netflowd::{DecodeError, Decoder, DecoderConfig, ExportPacket, FieldValue, TemplateRegistry};

const PACKET_V5: &str =
    "00050003000379a35e80c58622a55ab00000000000000000ac110002ac1100010000000000000000\
     0000000a0000034800002f4c0000527600000800000001000000000000000000ac110001ac110002\
     00000000000000000000000a0000034800002f4c0000527600000000000001000000000000000000\
     ac110001e00000fb000000000000000000000001000000a90000e01c0000e01c14e914e900001100\
     0000000000000000";

const PACKET_V9_TEMPLATE: &str =
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

const PACKET_V9_DATA: &str =
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
     0000003c000000010000000000000000e262003511000400";

fn from_hex(hex: &str) -> Vec<u8> {
    let cleaned: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    (0..cleaned.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&cleaned[i..i + 2], 16).unwrap())
        .collect()
}

fn peer() -> SocketAddr {
    "127.0.0.1:41234".parse().unwrap()
}

fn t0() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

fn ipfix_set(set_id: u16, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&set_id.to_be_bytes());
    buf.extend_from_slice(&((4 + body.len()) as u16).to_be_bytes());
    buf.extend_from_slice(body);
    buf
}

fn ipfix_message(domain: u32, sets: &[Vec<u8>]) -> Vec<u8> {
    let total = 16 + sets.iter().map(Vec::len).sum::<usize>();
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&10u16.to_be_bytes());
    buf.extend_from_slice(&(total as u16).to_be_bytes());
    buf.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(&domain.to_be_bytes());
    for set in sets {
        buf.extend_from_slice(set);
    }
    buf
}

#[test]
fn v5_canonical_packet() {
    let mut decoder = Decoder::new(DecoderConfig::default());
    let packet = decoder
        .decode(&from_hex(PACKET_V5), peer(), t0())
        .unwrap()
        .unwrap();

    assert_eq!(packet.version(), 5);
    assert_eq!(packet.flows().len(), 3);

    let flow = &packet.flows()[0];
    assert_eq!(flow.get("PROTO").unwrap(), &FieldValue::U8(1));
    assert_eq!(
        flow.get("IPV4_SRC_ADDR").unwrap(),
        &FieldValue::Ipv4("172.17.0.2".parse().unwrap())
    );
}

#[test]
fn v9_template_then_data_in_separate_packets() {
    let mut decoder = Decoder::new(DecoderConfig::default());

    let first = decoder
        .decode(&from_hex(PACKET_V9_TEMPLATE), peer(), t0())
        .unwrap()
        .unwrap();
    assert_eq!(first.new_templates().len(), 2);

    let second = decoder
        .decode(&from_hex(PACKET_V9_DATA), peer(), t0())
        .unwrap()
        .unwrap();
    assert_eq!(second.flows().len(), 12);
    assert!(second.new_templates().is_empty());

    let flow = &second.flows()[0];
    assert_eq!(flow.get("PROTOCOL").unwrap(), &FieldValue::U8(17));
    assert_eq!(flow.get("L4_SRC_PORT").unwrap(), &FieldValue::U16(53));
    assert_eq!(
        flow.get("IPV4_DST_ADDR").unwrap(),
        &FieldValue::Ipv4("127.0.0.1".parse().unwrap())
    );
}

#[test]
fn v9_data_before_template_resolves_with_original_time() {
    let mut decoder = Decoder::new(DecoderConfig::default());

    let data_time = t0();
    let deferred = decoder
        .decode(&from_hex(PACKET_V9_DATA), peer(), data_time)
        .unwrap();
    assert!(deferred.is_none());

    let template_time = data_time + Duration::from_secs(30);
    decoder
        .decode(&from_hex(PACKET_V9_TEMPLATE), peer(), template_time)
        .unwrap()
        .unwrap();

    let resolved: Vec<_> = decoder.drain_resolved().collect();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].received_at, data_time);
    assert_eq!(resolved[0].packet.flows().len(), 12);
    assert_eq!(resolved[0].exporter.peer, peer());
}

#[test]
fn ipfix_variable_length_string() {
    let mut decoder = Decoder::new(DecoderConfig::default());

    // Template 300: one variable-length field (SAMPLER_NAME).
    let mut template_body = Vec::new();
    template_body.extend_from_slice(&300u16.to_be_bytes());
    template_body.extend_from_slice(&1u16.to_be_bytes());
    template_body.extend_from_slice(&84u16.to_be_bytes());
    template_body.extend_from_slice(&65535u16.to_be_bytes());
    let message = ipfix_message(1, &[ipfix_set(2, &template_body)]);
    decoder.decode(&message, peer(), t0()).unwrap().unwrap();

    let mut record = vec![5u8];
    record.extend_from_slice(b"hello");
    let message = ipfix_message(1, &[ipfix_set(300, &record)]);
    let packet = decoder.decode(&message, peer(), t0()).unwrap().unwrap();

    assert_eq!(packet.version(), 10);
    assert_eq!(
        packet.flows()[0].get("SAMPLER_NAME").unwrap(),
        &FieldValue::Bytes(b"hello".to_vec())
    );
}

#[test]
fn exporter_restart_redefines_template() {
    let mut decoder = Decoder::new(DecoderConfig::default());
    decoder
        .decode(&from_hex(PACKET_V9_TEMPLATE), peer(), t0())
        .unwrap();

    // Shape X: 14 fields. Redefine 1024 to shape Y: IN_BYTES + IN_PKTS.
    let mut redefine = Vec::new();
    redefine.extend_from_slice(&9u16.to_be_bytes());
    redefine.extend_from_slice(&1u16.to_be_bytes());
    redefine.extend_from_slice(&[0u8; 8]); // uptime + secs
    redefine.extend_from_slice(&2u32.to_be_bytes()); // sequence
    redefine.extend_from_slice(&0u32.to_be_bytes()); // source id
    redefine.extend_from_slice(&0u16.to_be_bytes());
    redefine.extend_from_slice(&16u16.to_be_bytes());
    redefine.extend_from_slice(&1024u16.to_be_bytes());
    redefine.extend_from_slice(&2u16.to_be_bytes());
    redefine.extend_from_slice(&1u16.to_be_bytes());
    redefine.extend_from_slice(&4u16.to_be_bytes());
    redefine.extend_from_slice(&2u16.to_be_bytes());
    redefine.extend_from_slice(&4u16.to_be_bytes());
    let packet = decoder.decode(&redefine, peer(), t0()).unwrap().unwrap();
    assert_eq!(packet.new_templates().len(), 1);

    // The next data packet for 1024 decodes with shape Y.
    let mut data = Vec::new();
    data.extend_from_slice(&9u16.to_be_bytes());
    data.extend_from_slice(&2u16.to_be_bytes());
    data.extend_from_slice(&[0u8; 8]);
    data.extend_from_slice(&3u32.to_be_bytes());
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(&1024u16.to_be_bytes());
    data.extend_from_slice(&12u16.to_be_bytes());
    data.extend_from_slice(&1111u32.to_be_bytes());
    data.extend_from_slice(&7u32.to_be_bytes());
    let packet = decoder.decode(&data, peer(), t0()).unwrap().unwrap();

    let flow = &packet.flows()[0];
    assert_eq!(flow.len(), 2);
    assert_eq!(flow.get("IN_BYTES").unwrap(), &FieldValue::U32(1111));
    assert_eq!(flow.get("IN_PKTS").unwrap(), &FieldValue::U32(7));
    assert!(flow.get("IPV4_SRC_ADDR").is_none());
}

#[test]
fn malformed_flowset_does_not_kill_the_rest() {
    let mut decoder = Decoder::new(DecoderConfig::default());

    // Template packet with a bogus data flowset appended: declared length
    // 8, but only the 4-byte prefix is present.
    let mut data = from_hex(PACKET_V9_TEMPLATE);
    data.extend_from_slice(&1024u16.to_be_bytes());
    data.extend_from_slice(&8u16.to_be_bytes());
    let packet = decoder.decode(&data, peer(), t0()).unwrap().unwrap();

    // The intact flowsets still decoded.
    assert_eq!(packet.flows().len(), 8);
    assert_eq!(packet.new_templates().len(), 2);

    let stats = decoder.stats().all();
    assert_eq!(stats["127.0.0.1:41234/0"].malformed, 1);
}

#[test]
fn random_bytes_fail_without_registry_mutation() {
    let mut decoder = Decoder::new(DecoderConfig::default());

    // A deterministic junk datagram that cannot begin with 1/5/9/10.
    let mut junk = vec![0u8; 4096];
    let mut state = 0x2545f491u32;
    for byte in junk.iter_mut() {
        state = state.wrapping_mul(1664525).wrapping_add(1013904223);
        *byte = (state >> 24) as u8;
    }
    junk[0] = 0xde;
    junk[1] = 0xad;

    let err = decoder.decode(&junk, peer(), t0()).unwrap_err();
    assert_eq!(err, DecodeError::UnsupportedVersion(0xdead));
    assert!(decoder.registry().is_empty());
    assert_eq!(decoder.deferred_count(), 0);
}

#[test]
fn snapshot_survives_decoder_restart() {
    let mut decoder = Decoder::new(DecoderConfig::default());
    decoder
        .decode(&from_hex(PACKET_V9_TEMPLATE), peer(), t0())
        .unwrap();
    assert_eq!(decoder.registry().template_count(), 2);

    let snapshot = decoder.registry().snapshot();
    let restored = TemplateRegistry::restore(&snapshot).unwrap();
    let mut fresh = Decoder::with_registry(DecoderConfig::default(), restored);

    // Data decodes immediately after restart, no deferral.
    let packet = fresh
        .decode(&from_hex(PACKET_V9_DATA), peer(), t0())
        .unwrap()
        .unwrap();
    assert_eq!(packet.flows().len(), 12);
    assert_eq!(fresh.deferred_count(), 0);
}

#[test]
fn interleaved_exporters_keep_independent_state() {
    let mut decoder = Decoder::new(DecoderConfig::default());
    let a: SocketAddr = "10.0.0.1:2055".parse().unwrap();
    let b: SocketAddr = "10.0.0.2:2055".parse().unwrap();

    decoder
        .decode(&from_hex(PACKET_V9_TEMPLATE), a, t0())
        .unwrap();

    // Exporter B never sent templates: its data defers while A's decodes.
    assert!(decoder
        .decode(&from_hex(PACKET_V9_DATA), b, t0())
        .unwrap()
        .is_none());
    let packet = decoder
        .decode(&from_hex(PACKET_V9_DATA), a, t0())
        .unwrap()
        .unwrap();
    assert_eq!(packet.flows().len(), 12);

    // B's template arrives; only B's datagram resolves.
    decoder
        .decode(&from_hex(PACKET_V9_TEMPLATE), b, t0())
        .unwrap();
    let resolved: Vec<_> = decoder.drain_resolved().collect();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].exporter.peer, b);
}

#[test]
fn every_packet_emitted_exactly_once_under_reordering() {
    // Template last: all data packets defer, then all resolve, each once.
    let mut decoder = Decoder::new(DecoderConfig::default());
    let data = from_hex(PACKET_V9_DATA);

    for i in 0..5 {
        let at = t0() + Duration::from_secs(i);
        assert!(decoder.decode(&data, peer(), at).unwrap().is_none());
    }
    let template_packet = decoder
        .decode(&from_hex(PACKET_V9_TEMPLATE), peer(), t0() + Duration::from_secs(9))
        .unwrap()
        .unwrap();
    assert_eq!(template_packet.flows().len(), 8);

    let resolved: Vec<_> = decoder.drain_resolved().collect();
    assert_eq!(resolved.len(), 5);
    for (i, entry) in resolved.iter().enumerate() {
        assert_eq!(entry.received_at, t0() + Duration::from_secs(i as u64));
        assert_eq!(entry.packet.flows().len(), 12);
    }
    assert_eq!(decoder.drain_resolved().count(), 0);
    assert_eq!(decoder.deferred_count(), 0);
}

#[test]
fn export_packet_serializes_to_output_schema() {
    let mut decoder = Decoder::new(DecoderConfig::default());
    let packet = decoder
        .decode(&from_hex(PACKET_V5), peer(), t0())
        .unwrap()
        .unwrap();

    let value = serde_json::to_value(&packet).unwrap();
    assert_eq!(value["header"]["version"], 5);
    assert_eq!(value["header"]["count"], 3);
    assert_eq!(value["flows"].as_array().unwrap().len(), 3);
    assert_eq!(value["flows"][0]["IPV4_SRC_ADDR"], "172.17.0.2");

    match packet {
        ExportPacket::V5(p) => assert_eq!(p.header.count, 3),
        other => panic!("expected v5, got v{}", other.version()),
    }
}
