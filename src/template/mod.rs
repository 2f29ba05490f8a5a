//! Per-exporter template storage for NetFlow v9 and IPFIX decoding.

mod snapshot;

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

pub use snapshot::SNAPSHOT_MAGIC;

use crate::decode::SnapshotError;

/// Identifies one template namespace: the exporter's transport address plus
/// its source id (v9) or observation domain id (IPFIX). Two exporters
/// behind the same NAT with different source ids stay disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExporterKey {
    pub peer: SocketAddr,
    pub domain: u32,
}

impl ExporterKey {
    pub fn new(peer: SocketAddr, domain: u32) -> Self {
        Self { peer, domain }
    }
}

impl fmt::Display for ExporterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.peer, self.domain)
    }
}

/// One field of a template: information-element id, declared length in
/// octets (65535 marks an IPFIX variable-length field) and the enterprise
/// number when the enterprise bit was set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateField {
    pub id: u16,
    pub length: u16,
    pub enterprise_id: Option<u32>,
}

impl TemplateField {
    pub fn new(id: u16, length: u16) -> Self {
        Self {
            id,
            length,
            enterprise_id: None,
        }
    }

    pub fn is_variable_length(&self) -> bool {
        self.length == VARIABLE_LENGTH
    }
}

/// IPFIX sentinel length for variable-length fields (RFC 7011 section 7).
pub const VARIABLE_LENGTH: u16 = 65535;

/// Lowest valid data template id; everything below is reserved for
/// template and options-template sets.
pub const FIRST_DATA_TEMPLATE_ID: u16 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Data,
    /// Options template; the first `scope_field_count` fields are scope
    /// fields.
    Options { scope_field_count: u16 },
}

/// A data or options template as received from an exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: u16,
    pub kind: TemplateKind,
    pub fields: Vec<TemplateField>,
}

impl Template {
    pub fn new(id: u16, fields: Vec<TemplateField>) -> Self {
        Self {
            id,
            kind: TemplateKind::Data,
            fields,
        }
    }

    pub fn new_options(id: u16, scope_field_count: u16, fields: Vec<TemplateField>) -> Self {
        Self {
            id,
            kind: TemplateKind::Options { scope_field_count },
            fields,
        }
    }

    pub fn is_options(&self) -> bool {
        matches!(self.kind, TemplateKind::Options { .. })
    }

    pub fn scope_field_count(&self) -> u16 {
        match self.kind {
            TemplateKind::Data => 0,
            TemplateKind::Options { scope_field_count } => scope_field_count,
        }
    }

    /// True if any field uses the variable-length sentinel, making the
    /// record stride dynamic.
    pub fn is_variable_length(&self) -> bool {
        self.fields.iter().any(TemplateField::is_variable_length)
    }

    /// Fixed byte stride of one data record. Meaningless for
    /// variable-length templates; see [`Template::min_record_length`].
    pub fn record_length(&self) -> usize {
        self.fields.iter().map(|f| f.length as usize).sum()
    }

    /// Smallest possible encoding of one record: fixed lengths plus one
    /// length octet per variable-length field.
    pub fn min_record_length(&self) -> usize {
        self.fields
            .iter()
            .map(|f| if f.is_variable_length() { 1 } else { f.length as usize })
            .sum()
    }
}

/// Result of installing a template definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateChange {
    /// First definition for this (exporter, template id).
    New,
    /// An existing definition was replaced with a different shape.
    Replaced,
    /// Identical re-announcement; nothing changed.
    Unchanged,
}

impl TemplateChange {
    pub fn changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Per-exporter cache of data and options templates.
///
/// Each exporter owns an independent id namespace; installing a definition
/// for an already-known id replaces the previous one wholesale. There is no
/// internal eviction; the embedder may drop idle exporters.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    exporters: HashMap<ExporterKey, HashMap<u16, Template>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, exporter: &ExporterKey, template_id: u16) -> Option<&Template> {
        self.exporters.get(exporter)?.get(&template_id)
    }

    /// Install a template, replacing any previous definition with the same
    /// id. The returned change signal drives deferred-datagram resolution.
    pub fn put(&mut self, exporter: ExporterKey, template: Template) -> TemplateChange {
        let bucket = self.exporters.entry(exporter).or_default();
        match bucket.get(&template.id) {
            Some(existing) if *existing == template => TemplateChange::Unchanged,
            Some(_) => {
                bucket.insert(template.id, template);
                TemplateChange::Replaced
            }
            None => {
                bucket.insert(template.id, template);
                TemplateChange::New
            }
        }
    }

    /// Withdraw a single template (IPFIX template withdrawal).
    pub fn remove(&mut self, exporter: &ExporterKey, template_id: u16) -> bool {
        self.exporters
            .get_mut(exporter)
            .map(|bucket| bucket.remove(&template_id).is_some())
            .unwrap_or(false)
    }

    /// Forget everything known about an exporter.
    pub fn drop_exporter(&mut self, exporter: &ExporterKey) {
        self.exporters.remove(exporter);
    }

    pub fn exporter_count(&self) -> usize {
        self.exporters.len()
    }

    pub fn template_count(&self) -> usize {
        self.exporters.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.template_count() == 0
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&ExporterKey, &Template)> {
        self.exporters
            .iter()
            .flat_map(|(key, bucket)| bucket.values().map(move |t| (key, t)))
    }

    /// Serialize the whole registry for persistence across restarts.
    pub fn snapshot(&self) -> Vec<u8> {
        snapshot::encode(self)
    }

    /// Rehydrate a registry from a snapshot produced by
    /// [`TemplateRegistry::snapshot`].
    pub fn restore(data: &[u8]) -> Result<Self, SnapshotError> {
        snapshot::decode(data)
    }
}
