use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::error::{Result, SearchError};

/// Tenant identifier. Every user-issued query is pinned to one household.
pub type HouseholdId = u64;

/// Field carrying the owning household on every indexed document.
pub const HOUSEHOLD_FIELD: &str = "belongsToHousehold";

/// Structured document fields, keyed by field name.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Identifier of an indexed document.
///
/// IDs are opaque strings everywhere in the search layer. Entities keyed by
/// integers use their base-10 rendering, see [`DocId::as_u64`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        DocId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Parse the ID back into the integer it was created from.
    pub fn as_u64(&self) -> Result<u64> {
        self.0
            .parse::<u64>()
            .map_err(|_| SearchError::Decode(format!("document id {:?} is not an integer", self.0)))
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for DocId {
    fn from(id: u64) -> Self {
        DocId(id.to_string())
    }
}

impl From<&str> for DocId {
    fn from(id: &str) -> Self {
        DocId(id.to_string())
    }
}

impl From<String> for DocId {
    fn from(id: String) -> Self {
        DocId(id)
    }
}

impl AsRef<str> for DocId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Name of a document schema. The set of names with a built-in field mapping
/// is fixed; see [`crate::index::mapping::FieldMapping::for_index`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexName(Cow<'static, str>);

impl IndexName {
    pub const VALID_INGREDIENTS: IndexName = IndexName(Cow::Borrowed("valid_ingredients"));
    pub const VALID_PREPARATIONS: IndexName = IndexName(Cow::Borrowed("valid_preparations"));
    pub const VALID_INSTRUMENTS: IndexName = IndexName(Cow::Borrowed("valid_instruments"));
    pub const RECIPES: IndexName = IndexName(Cow::Borrowed("recipes"));
    /// Only used by tests; gets the catch-all mapping.
    pub const EXAMPLE: IndexName = IndexName(Cow::Borrowed("example_index_name"));

    pub fn new(name: impl Into<String>) -> Self {
        IndexName(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A searchable projection of one domain record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<DocId>) -> Self {
        Document {
            id: id.into(),
            fields: Fields::new(),
        }
    }

    /// Builder-style field setter. `null` values are dropped.
    pub fn with(mut self, field: &str, value: impl Into<serde_json::Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.fields.insert(field.to_string(), value);
        }
        self
    }

    pub fn household(&self) -> Option<HouseholdId> {
        self.fields.get(HOUSEHOLD_FIELD).and_then(|v| v.as_u64())
    }
}

/// One hit returned by an index: the document ID plus whatever fields the
/// backend stored alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: DocId,
    pub fields: Fields,
}
