//! Query model: a structured field mapping or an opaque value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Reserved field naming the target relation.
pub const TABLE_FIELD: &str = "table";
/// Reserved projection field.
pub const COLUMNS_FIELD: &str = "columns";
/// Alias of [`COLUMNS_FIELD`], consulted only when `columns` is absent.
pub const SELECT_FIELD: &str = "select";

/// Returns true for `table`, `columns` and `select`.
pub fn is_reserved_field(name: &str) -> bool {
    name == TABLE_FIELD || name == COLUMNS_FIELD || name == SELECT_FIELD
}

/// A query as supplied by the caller.
///
/// `Structured` queries encode into canonical, reversible keys. `Opaque`
/// queries take the degraded `OBJ|...` path and cannot be reconstructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Query {
    Structured(BTreeMap<String, Value>),
    Opaque(String),
}

impl Query {
    /// Start a structured query for `table`.
    pub fn table(table: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(table)
    }

    pub fn opaque(text: impl Into<String>) -> Self {
        Query::Opaque(text.into())
    }

    /// Objects become `Structured`; every other JSON value becomes `Opaque`
    /// using its display form (strings without quotes).
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Query::Structured(map.into_iter().collect()),
            Value::String(s) => Query::Opaque(s),
            other => Query::Opaque(other.to_string()),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Query::Structured(_))
    }

    /// Look up a field of a structured query.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Query::Structured(fields) => fields.get(name),
            Query::Opaque(_) => None,
        }
    }

    /// The `table` field rendered as text, if present.
    pub fn table_name(&self) -> Option<String> {
        self.field(TABLE_FIELD).and_then(scalar_text)
    }

    /// Non-reserved fields of a structured query, sorted by name.
    pub fn filters(&self) -> Vec<(&str, &Value)> {
        match self {
            Query::Structured(fields) => fields
                .iter()
                .filter(|(k, _)| !is_reserved_field(k))
                .map(|(k, v)| (k.as_str(), v))
                .collect(),
            Query::Opaque(_) => Vec::new(),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Structured(fields) => {
                let body = serde_json::to_string(fields).map_err(|_| fmt::Error)?;
                f.write_str(&body)
            }
            Query::Opaque(text) => f.write_str(text),
        }
    }
}

impl From<BTreeMap<String, Value>> for Query {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Query::Structured(fields)
    }
}

impl From<Value> for Query {
    fn from(value: Value) -> Self {
        Query::from_json(value)
    }
}

/// Render a scalar JSON value as key text.
///
/// Null, arrays and objects have no canonical string form and yield `None`.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Fluent builder for structured queries.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    fields: BTreeMap<String, Value>,
}

impl QueryBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(TABLE_FIELD.to_string(), Value::String(table.into()));
        Self { fields }
    }

    pub fn filter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn columns(mut self, projection: impl Into<String>) -> Self {
        self.fields
            .insert(COLUMNS_FIELD.to_string(), Value::String(projection.into()));
        self
    }

    pub fn select(mut self, projection: impl Into<String>) -> Self {
        self.fields
            .insert(SELECT_FIELD.to_string(), Value::String(projection.into()));
        self
    }

    pub fn build(self) -> Query {
        Query::Structured(self.fields)
    }
}

impl From<QueryBuilder> for Query {
    fn from(builder: QueryBuilder) -> Self {
        builder.build()
    }
}
