//! Wire types for the document API.
//!
//! Documents carry a `fields` map whose values are tagged by kind, e.g.
//! `{"link": {"stringValue": "https://example.com/"}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    /// UTF-8 string.
    StringValue(String),
    /// RFC 3339 timestamp.
    TimestampValue(DateTime<Utc>),
    /// Boolean.
    BooleanValue(bool),
    /// 64-bit integer, encoded as a decimal string on the wire.
    IntegerValue(String),
    /// Double-precision float.
    DoubleValue(f64),
    /// Explicit null.
    NullValue(()),
    /// Any value kind this crate does not model (maps, arrays, geo points).
    /// Kept verbatim so reads never fail on unrelated fields.
    #[serde(untagged)]
    Other(serde_json::Value),
}

impl FieldValue {
    /// Shorthand for a string value.
    pub fn string(value: impl Into<String>) -> Self {
        Self::StringValue(value.into())
    }

    /// Shorthand for a timestamp value.
    pub fn timestamp(value: DateTime<Utc>) -> Self {
        Self::TimestampValue(value)
    }

    /// Shorthand for a boolean value.
    pub fn boolean(value: bool) -> Self {
        Self::BooleanValue(value)
    }

    /// Returns the string content when this is a [`FieldValue::StringValue`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::StringValue(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the flag when this is a [`FieldValue::BooleanValue`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::BooleanValue(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the timestamp when this is a [`FieldValue::TimestampValue`].
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::TimestampValue(ts) => Some(*ts),
            _ => None,
        }
    }
}

/// Field map of a document, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    /// Empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a string field.
    pub fn with_string(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, FieldValue::string(value));
        self
    }

    /// Builder-style insert of a timestamp field.
    pub fn with_timestamp(mut self, name: impl Into<String>, value: DateTime<Utc>) -> Self {
        self.insert(name, FieldValue::timestamp(value));
        self
    }

    /// Builder-style insert of a boolean field.
    pub fn with_bool(mut self, name: impl Into<String>, value: bool) -> Self {
        self.insert(name, FieldValue::boolean(value));
        self
    }

    /// Insert or replace a field, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.0.insert(name.into(), value)
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    /// String content of `name`, or `None` when absent or not a string.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    /// Boolean content of `name`.
    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(FieldValue::as_bool)
    }

    /// Timestamp content of `name`.
    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.get(name).and_then(FieldValue::as_timestamp)
    }

    /// Field names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate `(name, value)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no fields are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A document as returned by read, patch and create calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name (`projects/.../documents/<collection>/<id>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Field values. Absent on the wire for a document with no fields.
    #[serde(default)]
    pub fields: Fields,
    /// Server-side creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    /// Server-side last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Document {
    /// Document id: the last segment of [`Document::name`].
    pub fn id(&self) -> Option<&str> {
        self.name
            .as_deref()
            .and_then(|name| name.rsplit('/').next())
            .filter(|id| !id.is_empty())
    }
}

/// One page of a collection listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListPage {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Request body for patch and create.
#[derive(Debug, Serialize)]
pub(crate) struct WriteBody<'a> {
    pub fields: &'a Fields,
}
