//! IPFIX parser (RFC 7011).
//!
//! IPFIX shares the flowset model with NetFlow v9 but differs where it
//! matters: the message header carries an authoritative total length,
//! template sets use ids 2 (templates) and 3 (options templates), field
//! specifiers may carry an enterprise number when the high bit of the
//! element id is set, a field length of 65535 marks per-record
//! variable-length encoding, and a template record with zero fields
//! withdraws the template. Framing violations abort the whole message; the
//! header length is trusted over everything else.

use std::collections::BTreeSet;

use deku::prelude::*;

use super::cursor::Cursor;
use super::error::DecodeError;
use super::fields;
use super::record::{FieldValue, FlowRecord, HeaderIpfix};
use crate::template::{
    ExporterKey, Template, TemplateChange, TemplateField, TemplateRegistry,
    FIRST_DATA_TEMPLATE_ID,
};

pub const HEADER_LEN: usize = 16;
const SET_HEADER_LEN: usize = 4;

const TEMPLATE_SET_ID: u16 = 2;
const OPTIONS_TEMPLATE_SET_ID: u16 = 3;

const ENTERPRISE_BIT: u16 = 0x8000;

/// Outcome of parsing one IPFIX message against a registry.
#[derive(Debug)]
pub(crate) struct IpfixOutcome {
    pub header: HeaderIpfix,
    pub flows: Vec<FlowRecord>,
    pub templates: Vec<Template>,
    pub withdrawn: Vec<u16>,
    pub missing_templates: BTreeSet<u16>,
    pub unknown_fields: u64,
    pub template_replaced: bool,
}

struct DataSet {
    template_id: u16,
    start: usize,
    end: usize,
}

pub(crate) fn parse(
    data: &[u8],
    exporter: ExporterKey,
    registry: &mut TemplateRegistry,
) -> Result<IpfixOutcome, DecodeError> {
    let mut cur = Cursor::new(data);
    let header_bytes = cur.read_bytes(HEADER_LEN)?;
    let (_, header) = HeaderIpfix::from_bytes((header_bytes, 0))
        .map_err(|e| DecodeError::malformed(format!("ipfix header: {e}")))?;

    let total = header.length as usize;
    if total < HEADER_LEN {
        return Err(DecodeError::malformed(format!(
            "ipfix header declares length {total}"
        )));
    }
    if total > data.len() {
        return Err(DecodeError::Truncated {
            offset: data.len(),
            needed: total - data.len(),
            remaining: 0,
        });
    }

    let mut out = IpfixOutcome {
        header,
        flows: Vec::new(),
        templates: Vec::new(),
        withdrawn: Vec::new(),
        missing_templates: BTreeSet::new(),
        unknown_fields: 0,
        template_replaced: false,
    };

    // Pass 1: install templates, index data sets.
    let mut data_sets = Vec::new();
    let mut offset = HEADER_LEN;
    while offset < total {
        if total - offset < SET_HEADER_LEN {
            return Err(DecodeError::malformed(format!(
                "{} trailing bytes cannot form a set",
                total - offset
            )));
        }
        let set_id = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let length = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        if length < SET_HEADER_LEN {
            return Err(DecodeError::malformed(format!(
                "ipfix set {set_id} declares length {length}"
            )));
        }
        let end = offset + length;
        if end > total {
            return Err(DecodeError::malformed(format!(
                "ipfix set {set_id} extends past message length"
            )));
        }

        let body = &data[offset + SET_HEADER_LEN..end];
        match set_id {
            TEMPLATE_SET_ID => parse_template_set(body, exporter, registry, &mut out)?,
            OPTIONS_TEMPLATE_SET_ID => {
                parse_options_template_set(body, exporter, registry, &mut out)?
            }
            id if id >= FIRST_DATA_TEMPLATE_ID => data_sets.push(DataSet {
                template_id: id,
                start: offset + SET_HEADER_LEN,
                end,
            }),
            // 0, 1 and 4..255 are reserved (RFC 7011 section 3.3.2).
            id => {
                return Err(DecodeError::malformed(format!(
                    "ipfix set has reserved id {id}"
                )))
            }
        }

        offset = end;
    }

    // Pass 2: decode data sets against the now-current registry.
    for set in &data_sets {
        match registry.get(&exporter, set.template_id) {
            Some(template) => {
                let template = template.clone();
                let body = &data[set.start..set.end];
                decode_data_set(body, &template, &mut out)?;
            }
            None => {
                out.missing_templates.insert(set.template_id);
            }
        }
    }

    Ok(out)
}

fn install(
    exporter: ExporterKey,
    template: Template,
    registry: &mut TemplateRegistry,
    out: &mut IpfixOutcome,
) {
    match registry.put(exporter, template.clone()) {
        TemplateChange::New => out.templates.push(template),
        TemplateChange::Replaced => {
            out.template_replaced = true;
            out.templates.push(template);
        }
        TemplateChange::Unchanged => {}
    }
}

/// Field specifiers: element id with optional trailing enterprise number
/// when the high bit is set (RFC 7011 section 3.2).
fn parse_field_specs(cur: &mut Cursor<'_>, count: u16) -> Result<Vec<TemplateField>, DecodeError> {
    let mut specs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let raw_id = cur.read_u16()?;
        let length = cur.read_u16()?;
        let enterprise_id = if raw_id & ENTERPRISE_BIT != 0 {
            Some(cur.read_u32()?)
        } else {
            None
        };
        specs.push(TemplateField {
            id: raw_id & !ENTERPRISE_BIT,
            length,
            enterprise_id,
        });
    }
    Ok(specs)
}

fn parse_template_set(
    body: &[u8],
    exporter: ExporterKey,
    registry: &mut TemplateRegistry,
    out: &mut IpfixOutcome,
) -> Result<(), DecodeError> {
    let mut cur = Cursor::new(body);
    while cur.remaining() >= 4 {
        let template_id = cur.read_u16()?;
        let field_count = cur.read_u16()?;
        if template_id == 0 && field_count == 0 {
            break; // zero padding
        }
        if template_id < FIRST_DATA_TEMPLATE_ID {
            return Err(DecodeError::malformed(format!(
                "ipfix template record id {template_id} is reserved"
            )));
        }
        if field_count == 0 {
            // Template withdrawal.
            if registry.remove(&exporter, template_id) {
                out.withdrawn.push(template_id);
            }
            continue;
        }

        let specs = parse_field_specs(&mut cur, field_count)?;
        install(exporter, Template::new(template_id, specs), registry, out);
    }
    Ok(())
}

fn parse_options_template_set(
    body: &[u8],
    exporter: ExporterKey,
    registry: &mut TemplateRegistry,
    out: &mut IpfixOutcome,
) -> Result<(), DecodeError> {
    let mut cur = Cursor::new(body);
    while cur.remaining() >= 6 {
        let template_id = cur.read_u16()?;
        if template_id == 0 {
            break; // zero padding
        }
        let field_count = cur.read_u16()?;
        if template_id < FIRST_DATA_TEMPLATE_ID {
            return Err(DecodeError::malformed(format!(
                "ipfix options template record id {template_id} is reserved"
            )));
        }
        if field_count == 0 {
            if registry.remove(&exporter, template_id) {
                out.withdrawn.push(template_id);
            }
            // Withdrawal records have no scope count field.
            continue;
        }

        let scope_field_count = cur.read_u16()?;
        // "The Scope Field Count MUST NOT be zero" (RFC 7011 section 3.4.2.2).
        if scope_field_count == 0 || scope_field_count > field_count {
            return Err(DecodeError::malformed(format!(
                "ipfix options template {template_id}: {scope_field_count} scope of {field_count} fields"
            )));
        }

        let specs = parse_field_specs(&mut cur, field_count)?;
        install(
            exporter,
            Template::new_options(template_id, scope_field_count, specs),
            registry,
            out,
        );
    }
    Ok(())
}

fn decode_data_set(
    body: &[u8],
    template: &Template,
    out: &mut IpfixOutcome,
) -> Result<(), DecodeError> {
    if template.is_variable_length() {
        return decode_variable_records(body, template, out);
    }

    let stride = template.record_length();
    if stride == 0 {
        return Err(DecodeError::malformed(format!(
            "ipfix template {} has zero record length",
            template.id
        )));
    }

    let mut offset = 0;
    while body.len() - offset >= stride {
        let mut cur = Cursor::new(&body[offset..offset + stride]);
        out.flows.push(decode_record(&mut cur, template, &mut out.unknown_fields)?);
        offset += stride;
    }

    // Whatever remains must be a zero-padding run shorter than one record.
    if body[offset..].iter().any(|&b| b != 0) {
        return Err(DecodeError::malformed(format!(
            "ipfix data set for template {} has {} trailing non-padding bytes",
            template.id,
            body.len() - offset
        )));
    }
    Ok(())
}

fn decode_variable_records(
    body: &[u8],
    template: &Template,
    out: &mut IpfixOutcome,
) -> Result<(), DecodeError> {
    let min_len = template.min_record_length();
    let mut cur = Cursor::new(body);
    loop {
        let remaining = cur.remaining();
        if remaining < min_len {
            // Padding tail; must be zeros.
            if body[body.len() - remaining..].iter().any(|&b| b != 0) {
                return Err(DecodeError::malformed(format!(
                    "ipfix data set for template {} has {remaining} trailing non-padding bytes",
                    template.id
                )));
            }
            return Ok(());
        }
        let flow = decode_record(&mut cur, template, &mut out.unknown_fields).map_err(|e| {
            match e {
                // A record whose declared length runs past the set
                // boundary is a framing error, not a short datagram.
                DecodeError::Truncated { .. } => DecodeError::malformed(format!(
                    "ipfix variable-length record overruns set of template {}",
                    template.id
                )),
                other => other,
            }
        })?;
        out.flows.push(flow);
    }
}

fn decode_record(
    cur: &mut Cursor<'_>,
    template: &Template,
    unknown_fields: &mut u64,
) -> Result<FlowRecord, DecodeError> {
    let mut flow = FlowRecord::new();
    for field in &template.fields {
        let raw = if field.is_variable_length() {
            cur.read_varlen()?
        } else {
            cur.read_bytes(field.length as usize)?
        };

        if let Some(pen) = field.enterprise_id {
            // Enterprise semantics are opaque here; preserve the octets
            // keyed by (pen, element id).
            flow.insert(
                fields::fallback_name(field.id, Some(pen)),
                FieldValue::Bytes(raw.to_vec()),
            );
        } else {
            match fields::lookup(field.id) {
                Some((name, kind)) => flow.insert(name, fields::decode_value(kind, raw)),
                None => {
                    *unknown_fields += 1;
                    flow.insert(
                        fields::fallback_name(field.id, None),
                        FieldValue::Bytes(raw.to_vec()),
                    );
                }
            }
        }
    }
    Ok(flow)
}
