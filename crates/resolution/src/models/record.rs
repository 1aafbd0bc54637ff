//! Provider payloads and provenance-tagged resolved records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{sources, SourceId};
use crate::registry::FetchDiagnostics;

/// Raw data produced by one provider for one request.
///
/// `fields` carries scalar attributes of a single record (unlock status,
/// price, description). `items` carries list entries for list domains
/// (activities, calendar events). `null` field values count as absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payload {
    pub fields: Map<String, Value>,
    pub items: Vec<Value>,
    /// The provider answered only part of the request.
    pub partial: bool,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_items(mut self, items: Vec<Value>) -> Self {
        self.items = items;
        self
    }

    pub fn mark_partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Number of non-null fields plus list items.
    pub fn populated(&self) -> usize {
        self.fields.values().filter(|v| !v.is_null()).count() + self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.populated() == 0
    }
}

/// One provider's answer plus its metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProviderResult {
    pub source_id: SourceId,
    pub fetched_at: DateTime<Utc>,
    pub payload: Payload,
}

impl ProviderResult {
    /// Wrap a payload fetched just now.
    pub fn new(source_id: impl Into<SourceId>, payload: Payload) -> Self {
        Self::at(source_id, payload, Utc::now())
    }

    pub fn at(source_id: impl Into<SourceId>, payload: Payload, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source_id: source_id.into(),
            fetched_at,
            payload,
        }
    }

    pub fn partial(&self) -> bool {
        self.payload.partial
    }

    /// A success with nothing populated is treated like `Empty`.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A single field of a resolved record with its provenance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedField {
    pub value: Value,
    pub source_id: SourceId,
    pub fetched_at: DateTime<Utc>,
}

/// A list entry of a resolved record with its identity and provenance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedItem {
    pub identity: String,
    pub value: Value,
    pub source_id: SourceId,
    pub fetched_at: DateTime<Utc>,
}

/// The unit returned by the engine.
///
/// Every field and every item carries exactly one provenance. The only way
/// to add data is [`fill_field`](Self::fill_field) and
/// [`push_item`](Self::push_item), neither of which replaces what is already
/// there, so data from a higher-priority provider can never be overwritten.
#[derive(Clone, Debug, Serialize)]
pub struct ResolvedRecord {
    key: String,
    fields: BTreeMap<String, ResolvedField>,
    items: Vec<ResolvedItem>,
    sources: Vec<SourceId>,
    resolved_at: DateTime<Utc>,
    diagnostics: FetchDiagnostics,
}

impl ResolvedRecord {
    /// A record with no data, attributed to [`sources::NONE`].
    pub fn empty(key: impl Into<String>, resolved_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
            items: Vec::new(),
            sources: Vec::new(),
            resolved_at,
            diagnostics: FetchDiagnostics::new(),
        }
    }

    /// Cache key of the descriptor this record answers.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fields(&self) -> &BTreeMap<String, ResolvedField> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.fields.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).map(|f| &f.value)
    }

    /// Which provider supplied `name`.
    pub fn source_of(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|f| f.source_id.as_ref())
    }

    pub fn items(&self) -> &[ResolvedItem] {
        &self.items
    }

    pub fn has_item(&self, identity: &str) -> bool {
        self.items.iter().any(|i| i.identity == identity)
    }

    /// Providers that contributed, in the order they were visited.
    pub fn sources(&self) -> &[SourceId] {
        &self.sources
    }

    /// The highest-priority contributing provider, or `none` for an empty record.
    pub fn source_id(&self) -> &str {
        self.sources
            .first()
            .map(|s| s.as_ref())
            .unwrap_or(sources::NONE)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.items.is_empty()
    }

    /// Number of populated fields plus items.
    pub fn populated(&self) -> usize {
        self.fields.len() + self.items.len()
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    /// The provider walk that produced this record.
    pub fn diagnostics(&self) -> &FetchDiagnostics {
        &self.diagnostics
    }

    /// Set `name` if it is not populated yet. Null values are ignored.
    ///
    /// Returns whether the field was written.
    pub fn fill_field(
        &mut self,
        name: &str,
        value: &Value,
        source_id: &SourceId,
        fetched_at: DateTime<Utc>,
    ) -> bool {
        if value.is_null() || self.fields.contains_key(name) {
            return false;
        }
        self.fields.insert(
            name.to_string(),
            ResolvedField {
                value: value.clone(),
                source_id: source_id.clone(),
                fetched_at,
            },
        );
        self.note_source(source_id);
        true
    }

    /// Append a list item unless one with the same identity is present.
    ///
    /// Returns whether the item was appended.
    pub fn push_item(
        &mut self,
        identity: String,
        value: Value,
        source_id: &SourceId,
        fetched_at: DateTime<Utc>,
    ) -> bool {
        if self.has_item(&identity) {
            return false;
        }
        self.items.push(ResolvedItem {
            identity,
            value,
            source_id: source_id.clone(),
            fetched_at,
        });
        self.note_source(source_id);
        true
    }

    pub(crate) fn set_diagnostics(&mut self, diagnostics: FetchDiagnostics) {
        self.diagnostics = diagnostics;
    }

    fn note_source(&mut self, source_id: &SourceId) {
        if !self.sources.contains(source_id) {
            self.sources.push(source_id.clone());
        }
    }
}

/// Identity of a list item: the value of `field` when it is a string or
/// number, otherwise the item's canonical JSON text.
pub fn identity_of(item: &Value, field: &str) -> String {
    match item.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => item.to_string(),
    }
}
