//! Binary snapshot of a template registry.
//!
//! A long-running collector persists its accumulated templates so that a
//! restart does not leave data-only exporters undecodable until their next
//! template refresh. The format is a 4-byte magic, a 2-byte version and a
//! length-prefixed run of template entries, all big-endian.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use super::{ExporterKey, Template, TemplateField, TemplateKind, TemplateRegistry};
use crate::decode::{Cursor, SnapshotError};

pub const SNAPSHOT_MAGIC: [u8; 4] = *b"NFTR";
const SNAPSHOT_VERSION: u16 = 1;

const ADDR_V4: u8 = 4;
const ADDR_V6: u8 = 6;

const KIND_DATA: u8 = 0;
const KIND_OPTIONS: u8 = 1;

const FIELD_FLAG_ENTERPRISE: u8 = 0x01;

pub(super) fn encode(registry: &TemplateRegistry) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&SNAPSHOT_MAGIC);
    buf.extend_from_slice(&SNAPSHOT_VERSION.to_be_bytes());
    buf.extend_from_slice(&(registry.template_count() as u32).to_be_bytes());

    for (exporter, template) in registry.iter() {
        encode_exporter(&mut buf, exporter);
        buf.extend_from_slice(&template.id.to_be_bytes());
        match template.kind {
            TemplateKind::Data => {
                buf.push(KIND_DATA);
                buf.extend_from_slice(&0u16.to_be_bytes());
            }
            TemplateKind::Options { scope_field_count } => {
                buf.push(KIND_OPTIONS);
                buf.extend_from_slice(&scope_field_count.to_be_bytes());
            }
        }
        buf.extend_from_slice(&(template.fields.len() as u16).to_be_bytes());
        for field in &template.fields {
            let mut flags = 0u8;
            if field.enterprise_id.is_some() {
                flags |= FIELD_FLAG_ENTERPRISE;
            }
            buf.push(flags);
            buf.extend_from_slice(&field.id.to_be_bytes());
            buf.extend_from_slice(&field.length.to_be_bytes());
            if let Some(pen) = field.enterprise_id {
                buf.extend_from_slice(&pen.to_be_bytes());
            }
        }
    }

    buf
}

fn encode_exporter(buf: &mut Vec<u8>, exporter: &ExporterKey) {
    match exporter.peer.ip() {
        IpAddr::V4(addr) => {
            buf.push(ADDR_V4);
            buf.extend_from_slice(&addr.octets());
        }
        IpAddr::V6(addr) => {
            buf.push(ADDR_V6);
            buf.extend_from_slice(&addr.octets());
        }
    }
    buf.extend_from_slice(&exporter.peer.port().to_be_bytes());
    buf.extend_from_slice(&exporter.domain.to_be_bytes());
}

pub(super) fn decode(data: &[u8]) -> Result<TemplateRegistry, SnapshotError> {
    let mut cur = Cursor::new(data);

    let magic = read_bytes(&mut cur, 4)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = read_u16(&mut cur)?;
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }

    let count = read_u32(&mut cur)?;
    let mut registry = TemplateRegistry::new();
    for _ in 0..count {
        let exporter = decode_exporter(&mut cur)?;
        let template_id = read_u16(&mut cur)?;

        let kind_tag = read_u8(&mut cur)?;
        let scope_field_count = read_u16(&mut cur)?;
        let kind = match kind_tag {
            KIND_DATA => TemplateKind::Data,
            KIND_OPTIONS => TemplateKind::Options { scope_field_count },
            other => {
                return Err(SnapshotError::Malformed(format!(
                    "unknown template kind tag {other}"
                )))
            }
        };

        let field_count = read_u16(&mut cur)?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let flags = read_u8(&mut cur)?;
            let id = read_u16(&mut cur)?;
            let length = read_u16(&mut cur)?;
            let enterprise_id = if flags & FIELD_FLAG_ENTERPRISE != 0 {
                Some(read_u32(&mut cur)?)
            } else {
                None
            };
            fields.push(TemplateField {
                id,
                length,
                enterprise_id,
            });
        }

        registry.put(
            exporter,
            Template {
                id: template_id,
                kind,
                fields,
            },
        );
    }

    if cur.remaining() != 0 {
        return Err(SnapshotError::Malformed(format!(
            "{} trailing bytes after last entry",
            cur.remaining()
        )));
    }

    Ok(registry)
}

fn decode_exporter(cur: &mut Cursor<'_>) -> Result<ExporterKey, SnapshotError> {
    let ip = match read_u8(cur)? {
        ADDR_V4 => {
            let b = read_bytes(cur, 4)?;
            IpAddr::V4(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
        }
        ADDR_V6 => {
            let b = read_bytes(cur, 16)?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(b);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        other => {
            return Err(SnapshotError::Malformed(format!(
                "unknown address kind {other}"
            )))
        }
    };
    let port = read_u16(cur)?;
    let domain = read_u32(cur)?;
    Ok(ExporterKey::new(SocketAddr::new(ip, port), domain))
}

fn read_u8(cur: &mut Cursor<'_>) -> Result<u8, SnapshotError> {
    cur.read_u8().map_err(|_| SnapshotError::Truncated)
}

fn read_u16(cur: &mut Cursor<'_>) -> Result<u16, SnapshotError> {
    cur.read_u16().map_err(|_| SnapshotError::Truncated)
}

fn read_u32(cur: &mut Cursor<'_>) -> Result<u32, SnapshotError> {
    cur.read_u32().map_err(|_| SnapshotError::Truncated)
}

fn read_bytes<'a>(cur: &mut Cursor<'a>, n: usize) -> Result<&'a [u8], SnapshotError> {
    cur.read_bytes(n).map_err(|_| SnapshotError::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::VARIABLE_LENGTH;

    fn sample_registry() -> TemplateRegistry {
        let mut registry = TemplateRegistry::new();

        let v4_exporter = ExporterKey::new("192.0.2.1:2055".parse().unwrap(), 1);
        registry.put(
            v4_exporter,
            Template::new(
                1024,
                vec![
                    TemplateField::new(8, 4),
                    TemplateField::new(12, 4),
                    TemplateField::new(1, 4),
                ],
            ),
        );
        registry.put(
            v4_exporter,
            Template::new_options(
                2048,
                1,
                vec![TemplateField::new(1, 2), TemplateField::new(34, 4)],
            ),
        );

        let v6_exporter = ExporterKey::new("[2001:db8::1]:9995".parse().unwrap(), 77);
        registry.put(
            v6_exporter,
            Template::new(
                300,
                vec![
                    TemplateField {
                        id: 12,
                        length: 8,
                        enterprise_id: Some(29305),
                    },
                    TemplateField::new(84, VARIABLE_LENGTH),
                ],
            ),
        );

        registry
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let registry = sample_registry();
        let bytes = registry.snapshot();
        assert_eq!(&bytes[..4], &SNAPSHOT_MAGIC);

        let restored = TemplateRegistry::restore(&bytes).unwrap();
        assert_eq!(restored.template_count(), registry.template_count());

        for (exporter, template) in registry.iter() {
            assert_eq!(restored.get(exporter, template.id), Some(template));
        }
    }

    #[test]
    fn test_empty_registry_roundtrip() {
        let registry = TemplateRegistry::new();
        let restored = TemplateRegistry::restore(&registry.snapshot()).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = sample_registry().snapshot();
        bytes[0] = b'X';
        assert_eq!(
            TemplateRegistry::restore(&bytes).unwrap_err(),
            SnapshotError::BadMagic
        );
    }

    #[test]
    fn test_truncated_snapshot_rejected() {
        let bytes = sample_registry().snapshot();
        let cut = &bytes[..bytes.len() - 3];
        assert_eq!(
            TemplateRegistry::restore(cut).unwrap_err(),
            SnapshotError::Truncated
        );
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bytes = TemplateRegistry::new().snapshot();
        bytes[5] = 9;
        assert_eq!(
            TemplateRegistry::restore(&bytes).unwrap_err(),
            SnapshotError::UnsupportedVersion(9)
        );
    }
}
