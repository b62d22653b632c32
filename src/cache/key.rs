//! Cache key generation.
//!
//! Structured queries are encoded positionally as
//! `TABLE|FILTER1=VAL1;FILTER2=VAL2|PROJECTION`, with filters sorted by name
//! so that field insertion order never changes the key. The projection
//! segment is omitted when it is the default (`*` or `ALL`). Opaque queries
//! fall back to `OBJ|<text>` and cannot be reversed.

use crate::query::{scalar_text, Query, COLUMNS_FIELD, SELECT_FIELD, TABLE_FIELD};
use crate::telemetry::{CacheEvent, CacheObserver, TracingObserver};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Separates the table, filter and projection segments.
pub const SEGMENT_DELIMITER: char = '|';
/// Separates filter pairs inside the filter segment.
pub const PAIR_DELIMITER: char = ';';
/// Separates a filter name from its value.
pub const KV_DELIMITER: char = '=';
/// Table segment used when a structured query has no `table` field.
pub const UNKNOWN_TABLE: &str = "UNKNOWN";
/// Prefix of keys produced from opaque queries.
pub const OPAQUE_PREFIX: &str = "OBJ";
/// Projections that mean "every column" and are left out of the key.
pub const DEFAULT_PROJECTIONS: [&str; 2] = ["*", "ALL"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// First 8 bytes of the key's SHA-256, hex encoded. Used to correlate log
    /// lines without exposing filter values.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hasher
            .finalize()
            .iter()
            .take(8)
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// True for keys produced by the opaque (`OBJ|`) fallback.
    pub fn is_opaque(&self) -> bool {
        is_opaque_key(&self.0)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

fn is_opaque_key(key: &str) -> bool {
    key.strip_prefix(OPAQUE_PREFIX)
        .map_or(false, |rest| rest.starts_with(SEGMENT_DELIMITER))
}

/// Strategy for turning queries into cache keys.
pub trait KeyCodec<Q>: Send + Sync {
    /// Deterministic key for `query`.
    fn generate_key(&self, query: &Q) -> Result<CacheKey>;

    /// Rebuild a query from a key, where the encoding allows it.
    fn reconstruct_query(&self, key: &str) -> Result<Q> {
        Err(Error::reconstruction_unsupported(key))
    }
}

/// How delimiter characters inside key components are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscapeMode {
    /// Components are written verbatim. Values containing `|`, `;` or `=`
    /// produce ambiguous keys that do not round-trip.
    #[default]
    None,
    /// `%`, `|`, `;` and `=` are percent-encoded in every component.
    Percent,
}

/// What reconstruction does with a filter pair that has no `=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPairPolicy {
    /// Drop the pair and report it to the observer.
    #[default]
    Skip,
    /// Fail with [`Error::MalformedKey`].
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyCodecConfig {
    pub escaping: EscapeMode,
    pub malformed_pairs: MalformedPairPolicy,
}

impl KeyCodecConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_escaping(mut self, escaping: EscapeMode) -> Self {
        self.escaping = escaping;
        self
    }

    pub fn with_malformed_pairs(mut self, policy: MalformedPairPolicy) -> Self {
        self.malformed_pairs = policy;
        self
    }
}

/// The positional `TABLE|FILTERS|PROJECTION` codec for [`Query`].
pub struct PositionalKeyCodec {
    config: KeyCodecConfig,
    observer: Arc<dyn CacheObserver>,
}

impl PositionalKeyCodec {
    pub fn new() -> Self {
        Self::with_config(KeyCodecConfig::default())
    }

    pub fn with_config(config: KeyCodecConfig) -> Self {
        Self {
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &KeyCodecConfig {
        &self.config
    }

    fn encode_structured(&self, fields: &BTreeMap<String, Value>) -> Result<String> {
        let table = match fields.get(TABLE_FIELD) {
            Some(v) => component_text(TABLE_FIELD, v)?,
            None => UNKNOWN_TABLE.to_string(),
        };

        let projection = match fields.get(COLUMNS_FIELD) {
            Some(v) => Some(component_text(COLUMNS_FIELD, v)?),
            None => match fields.get(SELECT_FIELD) {
                Some(v) => Some(component_text(SELECT_FIELD, v)?),
                None => None,
            },
        };

        // BTreeMap iteration is already sorted by field name.
        let mut pairs: Vec<String> = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            if crate::query::is_reserved_field(name) {
                continue;
            }
            let text = component_text(name, value)?;
            pairs.push(format!(
                "{}{}{}",
                self.escape(name),
                KV_DELIMITER,
                self.escape(&text)
            ));
        }

        let mut key = String::new();
        key.push_str(&self.escape(&table));
        key.push(SEGMENT_DELIMITER);
        for (i, pair) in pairs.iter().enumerate() {
            if i > 0 {
                key.push(PAIR_DELIMITER);
            }
            key.push_str(pair);
        }

        if let Some(p) = projection {
            if !DEFAULT_PROJECTIONS.contains(&p.as_str()) {
                key.push(SEGMENT_DELIMITER);
                key.push_str(&self.escape(&p));
            }
        }
        Ok(key)
    }

    fn escape(&self, raw: &str) -> String {
        match self.config.escaping {
            EscapeMode::None => raw.to_string(),
            EscapeMode::Percent => percent_encode(raw),
        }
    }

    fn unescape(&self, raw: &str, segment: &str) -> Result<String> {
        match self.config.escaping {
            EscapeMode::None => Ok(raw.to_string()),
            EscapeMode::Percent => percent_decode(raw).ok_or_else(|| {
                Error::malformed_key_with_context(
                    "invalid percent escape",
                    ErrorContext::new()
                        .with_field_path(segment)
                        .with_details(raw)
                        .with_source("key_codec"),
                )
            }),
        }
    }

    fn malformed_pair(&self, pair: &str) -> Result<()> {
        match self.config.malformed_pairs {
            MalformedPairPolicy::Skip => {
                self.observer.observe(&CacheEvent::MalformedPairSkipped {
                    pair: pair.to_string(),
                });
                Ok(())
            }
            MalformedPairPolicy::Reject => Err(Error::malformed_key_with_context(
                format!("filter pair '{}' has no '{}'", pair, KV_DELIMITER),
                ErrorContext::new()
                    .with_field_path("filters")
                    .with_source("key_codec"),
            )),
        }
    }
}

impl Default for PositionalKeyCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyCodec<Query> for PositionalKeyCodec {
    fn generate_key(&self, query: &Query) -> Result<CacheKey> {
        let key = match query {
            Query::Structured(fields) => self.encode_structured(fields)?,
            Query::Opaque(text) => format!(
                "{}{}{}",
                OPAQUE_PREFIX,
                SEGMENT_DELIMITER,
                text.replace(SEGMENT_DELIMITER, "/")
            ),
        };
        Ok(CacheKey::new(key))
    }

    fn reconstruct_query(&self, key: &str) -> Result<Query> {
        if is_opaque_key(key) {
            return Err(Error::reconstruction_unsupported(key));
        }
        if key.is_empty() && self.config.malformed_pairs == MalformedPairPolicy::Reject {
            return Err(Error::malformed_key_with_context(
                "empty key",
                ErrorContext::new().with_source("key_codec"),
            ));
        }

        let mut segments = key.splitn(3, SEGMENT_DELIMITER);
        let mut fields = BTreeMap::new();

        let table = segments.next().unwrap_or_default();
        fields.insert(
            TABLE_FIELD.to_string(),
            Value::String(self.unescape(table, "table")?),
        );

        if let Some(filters) = segments.next().filter(|s| !s.is_empty()) {
            for pair in filters.split(PAIR_DELIMITER) {
                match pair.split_once(KV_DELIMITER) {
                    Some((name, value)) => {
                        fields.insert(
                            self.unescape(name, "filters")?,
                            Value::String(self.unescape(value, "filters")?),
                        );
                    }
                    None => self.malformed_pair(pair)?,
                }
            }
        }

        if let Some(projection) = segments.next() {
            fields.insert(
                COLUMNS_FIELD.to_string(),
                Value::String(self.unescape(projection, "columns")?),
            );
        }

        Ok(Query::Structured(fields))
    }
}

fn component_text(field: &str, value: &Value) -> Result<String> {
    scalar_text(value).ok_or_else(|| {
        Error::key_encoding_with_context(
            "value is not string-representable",
            ErrorContext::new()
                .with_field_path(field)
                .with_details(format!("got {}", value))
                .with_source("key_codec"),
        )
    })
}

/// Escapes emitted by `percent_encode`. Decoding accepts exactly these.
const PERCENT_ESCAPES: [(char, &str); 4] = [('%', "%25"), ('|', "%7C"), (';', "%3B"), ('=', "%3D")];

fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match PERCENT_ESCAPES.iter().find(|(reserved, _)| *reserved == c) {
            Some((_, escape)) => out.push_str(escape),
            None => out.push(c),
        }
    }
    out
}

/// Inverse of `percent_encode`. Any other escape, including valid hex for a
/// byte the encoder never escapes, is rejected so each key has one decoding.
fn percent_decode(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let escape = rest.get(pos..pos + 3)?;
        if !escape.bytes().skip(1).all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let (reserved, _) = PERCENT_ESCAPES.iter().find(|(_, e)| *e == escape)?;
        out.push(*reserved);
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}
