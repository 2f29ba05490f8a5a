//! NetFlow v9 parser (RFC 3954).
//!
//! A v9 datagram is a 20-byte header followed by flowsets: template
//! flowsets (id 0), options-template flowsets (id 1) and data flowsets
//! (id >= 256, referencing the template of the same id). The header
//! `count` field counts records, not flowsets, and is unreliable in the
//! wild; iteration is driven purely by the declared flowset lengths.
//!
//! Parsing is two-pass so that a template arriving *after* its data in the
//! same datagram still resolves it: pass 1 installs every template and only
//! indexes data flowsets, pass 2 decodes them against the then-current
//! registry.

use std::collections::BTreeSet;

use deku::prelude::*;

use super::cursor::Cursor;
use super::error::DecodeError;
use super::fields;
use super::record::{FieldValue, FlowRecord, HeaderV9};
use crate::template::{
    ExporterKey, Template, TemplateChange, TemplateField, TemplateRegistry,
    FIRST_DATA_TEMPLATE_ID,
};

pub const HEADER_LEN: usize = 20;
const FLOWSET_HEADER_LEN: usize = 4;

const TEMPLATE_FLOWSET_ID: u16 = 0;
const OPTIONS_FLOWSET_ID: u16 = 1;

/// Outcome of parsing one v9 datagram against a registry.
///
/// When `missing_templates` is non-empty the datagram must be deferred;
/// `flows` is meaningless in that case and the caller re-parses once the
/// templates arrive. Templates installed in pass 1 stay installed either
/// way.
#[derive(Debug)]
pub(crate) struct V9Outcome {
    pub header: HeaderV9,
    pub flows: Vec<FlowRecord>,
    pub templates: Vec<Template>,
    pub missing_templates: BTreeSet<u16>,
    pub malformed_flowsets: u32,
    pub unknown_fields: u64,
    pub records_seen: usize,
    pub template_replaced: bool,
}

struct DataFlowset {
    template_id: u16,
    start: usize,
    end: usize,
}

pub(crate) fn parse(
    data: &[u8],
    exporter: ExporterKey,
    registry: &mut TemplateRegistry,
) -> Result<V9Outcome, DecodeError> {
    let mut cur = Cursor::new(data);
    let header_bytes = cur.read_bytes(HEADER_LEN)?;
    let (_, header) = HeaderV9::from_bytes((header_bytes, 0))
        .map_err(|e| DecodeError::malformed(format!("v9 header: {e}")))?;

    let mut out = V9Outcome {
        header,
        flows: Vec::new(),
        templates: Vec::new(),
        missing_templates: BTreeSet::new(),
        malformed_flowsets: 0,
        unknown_fields: 0,
        records_seen: 0,
        template_replaced: false,
    };

    // Pass 1: install templates, index data flowsets.
    let mut data_flowsets = Vec::new();
    let mut offset = HEADER_LEN;
    while offset < data.len() {
        if data.len() - offset < FLOWSET_HEADER_LEN {
            tracing::debug!("v9: {} trailing bytes after last flowset", data.len() - offset);
            out.malformed_flowsets += 1;
            break;
        }
        let flowset_id = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let length = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        if length < FLOWSET_HEADER_LEN {
            // A length that cannot even cover its own prefix breaks the
            // framing for everything that follows.
            return Err(DecodeError::malformed(format!(
                "v9 flowset {flowset_id} declares length {length}"
            )));
        }
        let end = offset + length;
        if end > data.len() {
            tracing::debug!(
                flowset_id,
                length,
                remaining = data.len() - offset,
                "v9: flowset body extends past datagram end"
            );
            out.malformed_flowsets += 1;
            break;
        }

        let body = &data[offset + FLOWSET_HEADER_LEN..end];
        match flowset_id {
            TEMPLATE_FLOWSET_ID => {
                if parse_template_flowset(body, exporter, registry, &mut out).is_err() {
                    out.malformed_flowsets += 1;
                }
            }
            OPTIONS_FLOWSET_ID => {
                if parse_options_flowset(body, exporter, registry, &mut out).is_err() {
                    out.malformed_flowsets += 1;
                }
            }
            2..=255 => {
                // Reserved ids; treating them as data would defer the
                // datagram forever against a template that cannot exist.
                tracing::debug!(flowset_id, "v9: skipping reserved flowset id");
            }
            _ => data_flowsets.push(DataFlowset {
                template_id: flowset_id,
                start: offset + FLOWSET_HEADER_LEN,
                end,
            }),
        }

        offset = end;
    }

    // Pass 2: decode data flowsets against the now-current registry.
    for flowset in &data_flowsets {
        match registry.get(&exporter, flowset.template_id) {
            Some(template) => {
                let template = template.clone();
                let body = &data[flowset.start..flowset.end];
                if decode_data_flowset(body, &template, &mut out).is_err() {
                    out.malformed_flowsets += 1;
                }
            }
            None => {
                out.missing_templates.insert(flowset.template_id);
            }
        }
    }

    Ok(out)
}

fn install(
    exporter: ExporterKey,
    template: Template,
    registry: &mut TemplateRegistry,
    out: &mut V9Outcome,
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

/// Template flowset (id 0): a run of (template_id, field_count, fields...)
/// records, possibly followed by zero padding.
fn parse_template_flowset(
    body: &[u8],
    exporter: ExporterKey,
    registry: &mut TemplateRegistry,
    out: &mut V9Outcome,
) -> Result<(), DecodeError> {
    let mut cur = Cursor::new(body);
    while cur.remaining() >= 4 {
        let template_id = cur.read_u16()?;
        let field_count = cur.read_u16()?;
        if template_id == 0 && field_count == 0 {
            break; // zero padding
        }
        if template_id < FIRST_DATA_TEMPLATE_ID || field_count == 0 {
            return Err(DecodeError::malformed(format!(
                "v9 template record id {template_id} with {field_count} fields"
            )));
        }

        let mut template_fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let field_type = cur.read_u16()?;
            let field_length = cur.read_u16()?;
            template_fields.push(TemplateField::new(field_type, field_length));
        }

        out.records_seen += 1;
        install(
            exporter,
            Template::new(template_id, template_fields),
            registry,
            out,
        );
    }
    Ok(())
}

/// Options-template flowset (id 1): records carry the scope and option
/// lengths in *bytes* (RFC 3954 section 6.1), each field spec being four.
fn parse_options_flowset(
    body: &[u8],
    exporter: ExporterKey,
    registry: &mut TemplateRegistry,
    out: &mut V9Outcome,
) -> Result<(), DecodeError> {
    let mut cur = Cursor::new(body);
    while cur.remaining() >= 6 {
        let template_id = cur.read_u16()?;
        if template_id == 0 {
            break; // zero padding
        }
        let scope_length = cur.read_u16()? as usize;
        let option_length = cur.read_u16()? as usize;
        if template_id < FIRST_DATA_TEMPLATE_ID
            || scope_length == 0
            || scope_length % 4 != 0
            || option_length % 4 != 0
        {
            return Err(DecodeError::malformed(format!(
                "v9 options template {template_id}: scope {scope_length}B, options {option_length}B"
            )));
        }

        let scope_count = (scope_length / 4) as u16;
        let total = scope_count as usize + option_length / 4;
        let mut template_fields = Vec::with_capacity(total);
        for _ in 0..total {
            let field_type = cur.read_u16()?;
            let field_length = cur.read_u16()?;
            template_fields.push(TemplateField::new(field_type, field_length));
        }

        out.records_seen += 1;
        install(
            exporter,
            Template::new_options(template_id, scope_count, template_fields),
            registry,
            out,
        );
    }
    Ok(())
}

/// Slice a data flowset body into fixed-stride records; trailing bytes
/// shorter than one stride are padding.
fn decode_data_flowset(
    body: &[u8],
    template: &Template,
    out: &mut V9Outcome,
) -> Result<(), DecodeError> {
    let stride = template.record_length();
    if stride == 0 {
        return Err(DecodeError::malformed(format!(
            "v9 template {} has zero record length",
            template.id
        )));
    }

    let mut offset = 0;
    while body.len() - offset >= stride {
        let mut cur = Cursor::new(&body[offset..offset + stride]);
        let flow = decode_record(&mut cur, template, &mut out.unknown_fields)?;
        out.flows.push(flow);
        out.records_seen += 1;
        offset += stride;
    }
    Ok(())
}

fn decode_record(
    cur: &mut Cursor<'_>,
    template: &Template,
    unknown_fields: &mut u64,
) -> Result<FlowRecord, DecodeError> {
    let scope_count = template.scope_field_count() as usize;
    let mut flow = FlowRecord::new();
    for (idx, field) in template.fields.iter().enumerate() {
        let raw = cur.read_bytes(field.length as usize)?;
        if template.is_options() && idx < scope_count {
            flow.insert(fields::scope_name(field.id), fields::decode_unsigned(raw));
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
