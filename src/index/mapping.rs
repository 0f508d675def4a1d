//! Static field mappings for the embedded text index.
//!
//! Each known [`IndexName`] binds to a fixed set of English-analysed text
//! fields plus the numeric household field. The mapping is turned into a
//! tantivy schema on index creation and recovered from the stored schema when
//! an existing index is reopened.

use serde_json::Value;
use tantivy::schema::{
    FieldType as TantivyFieldType, IndexRecordOption, NumericOptions, Schema, TextFieldIndexing,
    TextOptions, STORED, STRING,
};

use crate::error::{Result, SearchError};
use crate::types::{Document, IndexName, HOUSEHOLD_FIELD};

/// Stored string form of the document ID.
pub const ID_FIELD: &str = "_id";
/// Stored JSON copy of the document fields, used to rebuild search subsets.
pub const SOURCE_FIELD: &str = "_source";
/// Catch-all text field used by the default mapping.
pub const CATCH_ALL_FIELD: &str = "_all";
/// Name of the English stemming analyzer registered on every index.
pub const EN_STEM: &str = "en_stem";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    text_fields: Vec<String>,
    catch_all: bool,
}

impl FieldMapping {
    /// The mapping bound to `name`, or `InvalidIndexName` for names without one.
    pub fn for_index(name: &IndexName) -> Result<Self> {
        let fields: &[&str] = match name.as_str() {
            "valid_ingredients" => &["name", "variant", "description", "warning", "iconPath"],
            "valid_preparations" => &["name", "description", "iconPath"],
            "valid_instruments" => &["name", "variant", "description", "iconPath"],
            "recipes" => &["name", "slug", "description", "source"],
            "example_index_name" => return Ok(Self::catch_all()),
            other => return Err(SearchError::InvalidIndexName(other.to_string())),
        };
        Ok(FieldMapping {
            text_fields: fields.iter().map(|f| f.to_string()).collect(),
            catch_all: false,
        })
    }

    fn catch_all() -> Self {
        FieldMapping {
            text_fields: vec![CATCH_ALL_FIELD.to_string()],
            catch_all: true,
        }
    }

    /// Recover the mapping from the schema of an existing index.
    pub fn from_schema(schema: &Schema) -> Result<Self> {
        for required in [ID_FIELD, SOURCE_FIELD, HOUSEHOLD_FIELD] {
            if schema.get_field(required).is_err() {
                return Err(SearchError::Tantivy(format!(
                    "existing index schema has no {required} field"
                )));
            }
        }
        let text_fields: Vec<String> = schema
            .fields()
            .filter(|(_, entry)| matches!(entry.field_type(), TantivyFieldType::Str(_)))
            .map(|(_, entry)| entry.name().to_string())
            .filter(|name| name != ID_FIELD && name != SOURCE_FIELD)
            .collect();
        let catch_all = text_fields.iter().any(|f| f == CATCH_ALL_FIELD);
        Ok(FieldMapping {
            text_fields,
            catch_all,
        })
    }

    pub fn text_fields(&self) -> &[String] {
        &self.text_fields
    }

    pub fn is_catch_all(&self) -> bool {
        self.catch_all
    }

    pub fn is_text_field(&self, name: &str) -> bool {
        self.text_fields.iter().any(|f| f == name)
    }

    pub fn to_schema(&self) -> Schema {
        let mut builder = Schema::builder();
        builder.add_text_field(ID_FIELD, STRING | STORED);
        builder.add_text_field(SOURCE_FIELD, STORED);
        builder.add_u64_field(
            HOUSEHOLD_FIELD,
            NumericOptions::default()
                .set_indexed()
                .set_stored()
                .set_fast(),
        );

        let analysed = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(EN_STEM)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );
        for field in &self.text_fields {
            builder.add_text_field(field, analysed.clone());
        }
        builder.build()
    }

    /// Reject documents that carry a mapped field with a value of the wrong
    /// type. Unmapped fields are ignored.
    pub fn check(&self, doc: &Document) -> Result<()> {
        if doc.id.as_str().is_empty() {
            return Err(SearchError::InvalidDocument("document id is empty".into()));
        }
        if let Some(value) = doc.fields.get(HOUSEHOLD_FIELD) {
            if value.as_u64().is_none() {
                return Err(SearchError::TypeMismatch {
                    field: HOUSEHOLD_FIELD.to_string(),
                    expected: "unsigned integer",
                    actual: json_kind(value),
                });
            }
        }
        if self.catch_all {
            return Ok(());
        }
        for field in &self.text_fields {
            match doc.fields.get(field) {
                None | Some(Value::String(_)) => {}
                Some(other) => {
                    return Err(SearchError::TypeMismatch {
                        field: field.clone(),
                        expected: "string",
                        actual: json_kind(other),
                    })
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_u64() => "unsigned integer",
        Value::Number(n) if n.is_i64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Every string reachable from `value`, depth first.
pub(crate) fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}
