// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Property values carried by entities.
//!
//! `Value` is a closed sum over every scalar and composite kind an entity
//! property can hold. Coercion between kinds (`Value::convert_to`) backs the
//! factory's requirement checking: adapters deliver everything as strings
//! and the schema decides what each property really is.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::{Entity, EntityError};

/// Shared handle to an immutable entity node.
pub type EntityPtr = Arc<Entity>;

/// Timestamp type used across the agent: UTC with sub-second precision.
pub type Timestamp = DateTime<Utc>;

/// Format a timestamp the way MTConnect documents expect it.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Parse an ISO-8601 timestamp, accepting date-only forms and a trailing Z.
pub fn parse_timestamp(s: &str) -> Option<Timestamp> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if s.contains('T') {
        let trimmed = s.trim_end_matches('Z');
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(naive.and_utc());
        }
    } else if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Scalar cell of a data set or table.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSetValue {
    String(String),
    Integer(i64),
    Double(f64),
    /// Table rows hold a nested set of cells.
    DataSet(DataSet),
}

impl fmt::Display for DataSetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSetValue::String(s) => write!(f, "{}", s),
            DataSetValue::Integer(i) => write!(f, "{}", i),
            DataSetValue::Double(d) => write!(f, "{}", format_double(*d)),
            DataSetValue::DataSet(ds) => write!(f, "{}", ds),
        }
    }
}

/// One entry of a data set: key, value, and a removal marker.
///
/// A bare key in the SHDR representation (`key=` or just `key`) marks the
/// entry removed; removed entries erase the key when merged into a
/// checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSetEntry {
    pub key: String,
    pub value: DataSetValue,
    pub removed: bool,
}

impl DataSetEntry {
    pub fn new(key: impl Into<String>, value: DataSetValue) -> Self {
        Self {
            key: key.into(),
            value,
            removed: false,
        }
    }

    pub fn removed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: DataSetValue::String(String::new()),
            removed: true,
        }
    }

    /// Entry equality used by the duplicate filter: key, value and removal.
    pub fn same(&self, other: &DataSetEntry) -> bool {
        self.key == other.key && self.removed == other.removed && self.value == other.value
    }
}

/// Ordered key→value set. Keys are unique; insertion replaces in place so
/// the original ordering survives merges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    entries: Vec<DataSetEntry>,
}

impl DataSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataSetEntry> {
        self.entries.iter()
    }

    pub fn get(&self, key: &str) -> Option<&DataSetEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Insert or replace by key, keeping the original position on replace.
    pub fn insert(&mut self, entry: DataSetEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.key == entry.key) {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.key != key);
        before != self.entries.len()
    }

    /// Merge `update` over this set: removed keys drop out, others replace
    /// or append. Used by the latest checkpoint for data-set events.
    pub fn merge(&mut self, update: &DataSet) {
        for entry in update.iter() {
            if entry.removed {
                self.remove(&entry.key);
            } else {
                self.insert(entry.clone());
            }
        }
    }

    /// Parse the SHDR data-set representation: space separated
    /// `key=value` pairs, single or double quoted values, `{...}` braces for
    /// table rows (when `table` is set), `\`-escapes inside quotes, and bare
    /// keys marking removal.
    pub fn parse(text: &str, table: bool) -> Result<DataSet, EntityError> {
        let mut set = DataSet::new();
        let mut chars = text.chars().peekable();

        loop {
            while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
                chars.next();
            }
            if chars.peek().is_none() {
                break;
            }

            let mut key = String::new();
            while let Some(&c) = chars.peek() {
                if c == '=' || c.is_whitespace() {
                    break;
                }
                key.push(c);
                chars.next();
            }
            if key.is_empty() {
                return Err(EntityError::Property(format!(
                    "cannot parse data set '{}': empty key",
                    text
                )));
            }

            if chars.peek() != Some(&'=') {
                set.insert(DataSetEntry::removed(key));
                continue;
            }
            chars.next(); // consume '='

            let value = match chars.peek().copied() {
                None | Some(' ') => {
                    set.insert(DataSetEntry::removed(key));
                    continue;
                }
                Some(q @ ('\'' | '"')) => {
                    chars.next();
                    let mut v = String::new();
                    let mut escaped = false;
                    loop {
                        match chars.next() {
                            None => {
                                return Err(EntityError::Property(format!(
                                    "cannot parse data set '{}': unterminated quote",
                                    text
                                )))
                            }
                            Some(c) if escaped => {
                                v.push(c);
                                escaped = false;
                            }
                            Some('\\') => escaped = true,
                            Some(c) if c == q => break,
                            Some(c) => v.push(c),
                        }
                    }
                    v
                }
                Some('{') => {
                    chars.next();
                    let mut v = String::new();
                    let mut depth = 1usize;
                    loop {
                        match chars.next() {
                            None => {
                                return Err(EntityError::Property(format!(
                                    "cannot parse data set '{}': unterminated brace",
                                    text
                                )))
                            }
                            Some('{') => {
                                depth += 1;
                                v.push('{');
                            }
                            Some('}') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                                v.push('}');
                            }
                            Some(c) => v.push(c),
                        }
                    }
                    if table {
                        let row = DataSet::parse(&v, false)?;
                        set.insert(DataSetEntry::new(key, DataSetValue::DataSet(row)));
                        continue;
                    }
                    v
                }
                Some(_) => {
                    let mut v = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_whitespace() {
                            break;
                        }
                        v.push(c);
                        chars.next();
                    }
                    v
                }
            };

            set.insert(DataSetEntry::new(key, typed_cell(&value)));
        }

        Ok(set)
    }
}

impl fmt::Display for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for e in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            if e.removed {
                write!(f, "{}", e.key)?;
            } else if let DataSetValue::DataSet(row) = &e.value {
                write!(f, "{}={{{}}}", e.key, row)?;
            } else {
                write!(f, "{}={}", e.key, e.value)?;
            }
        }
        Ok(())
    }
}

/// Pick the narrowest scalar type for a parsed cell value.
fn typed_cell(raw: &str) -> DataSetValue {
    if let Ok(i) = raw.parse::<i64>() {
        return DataSetValue::Integer(i);
    }
    if let Ok(d) = raw.parse::<f64>() {
        return DataSetValue::Double(d);
    }
    DataSetValue::String(raw.to_string())
}

/// Format a double without trailing zero noise, matching document output.
pub fn format_double(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// A property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(Timestamp),
    Vector(Vec<f64>),
    DataSet(DataSet),
    Table(DataSet),
    Entity(EntityPtr),
    EntityList(Vec<EntityPtr>),
}

impl Value {
    /// String rendering used for XML attributes and text content.
    pub fn to_text(&self) -> String {
        match self {
            Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Double(d) => format_double(*d),
            Value::String(s) => s.clone(),
            Value::Timestamp(ts) => format_timestamp(ts),
            Value::Vector(v) => v
                .iter()
                .map(|d| format_double(*d))
                .collect::<Vec<_>>()
                .join(" "),
            Value::DataSet(ds) | Value::Table(ds) => ds.to_string(),
            Value::Entity(_) | Value::EntityList(_) => String::new(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Double(d) => Some(*d as i64),
            _ => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Value::Entity(_) | Value::EntityList(_))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Target kinds a requirement can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    /// Upper-cased string (controlled vocabulary carrier).
    UString,
    /// Upper-cased after a `:` prefix when one is present, else fully.
    QString,
    Integer,
    Double,
    Bool,
    Timestamp,
    Vector,
    DataSet,
    Table,
    Entity,
    EntityList,
}

impl ValueKind {
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ValueKind::String | ValueKind::UString | ValueKind::QString, Value::String(_))
                | (ValueKind::Integer, Value::Integer(_))
                | (ValueKind::Double, Value::Double(_))
                | (ValueKind::Bool, Value::Bool(_))
                | (ValueKind::Timestamp, Value::Timestamp(_))
                | (ValueKind::Vector, Value::Vector(_))
                | (ValueKind::DataSet, Value::DataSet(_))
                | (ValueKind::Table, Value::Table(_))
                | (ValueKind::Entity, Value::Entity(_))
                | (ValueKind::EntityList, Value::EntityList(_))
        )
    }
}

/// Convert a value in place to the requested kind.
///
/// Returns `Ok(true)` when a conversion happened, `Ok(false)` when the value
/// already had the right kind.
pub fn convert_value(value: &mut Value, kind: ValueKind) -> Result<bool, EntityError> {
    if kind.matches(value) {
        // Upper-casing still applies to strings already of string kind.
        if let (ValueKind::UString | ValueKind::QString, Value::String(s)) = (kind, &mut *value) {
            upcase_for(kind, s);
        }
        return Ok(false);
    }

    let converted = match (&*value, kind) {
        // ------------ from string
        (Value::String(s), ValueKind::Integer) => Value::Integer(
            s.trim()
                .parse::<i64>()
                .map_err(|_| conv_err(s, "integer"))?,
        ),
        (Value::String(s), ValueKind::Double) => {
            Value::Double(s.trim().parse::<f64>().map_err(|_| conv_err(s, "double"))?)
        }
        (Value::String(s), ValueKind::Bool) => Value::Bool(s == "true"),
        (Value::String(s), ValueKind::Timestamp) => {
            Value::Timestamp(parse_timestamp(s).ok_or_else(|| conv_err(s, "timestamp"))?)
        }
        (Value::String(s), ValueKind::Vector) => {
            let mut v = Vec::new();
            for tok in s.split_whitespace() {
                v.push(tok.parse::<f64>().map_err(|_| conv_err(s, "vector"))?);
            }
            if v.is_empty() {
                return Err(conv_err(s, "vector"));
            }
            Value::Vector(v)
        }
        (Value::String(s), ValueKind::DataSet) => Value::DataSet(DataSet::parse(s, false)?),
        (Value::String(s), ValueKind::Table) => Value::Table(DataSet::parse(s, true)?),
        (Value::String(s), ValueKind::UString | ValueKind::QString) => {
            let mut out = s.clone();
            upcase_for(kind, &mut out);
            Value::String(out)
        }

        // ------------ from numbers
        (Value::Double(d), ValueKind::String) => Value::String(format_double(*d)),
        (Value::Double(d), ValueKind::Integer) => Value::Integer(*d as i64),
        (Value::Double(d), ValueKind::Bool) => Value::Bool(*d != 0.0),
        (Value::Double(d), ValueKind::Vector) => Value::Vector(vec![*d]),
        (Value::Integer(i), ValueKind::String) => Value::String(i.to_string()),
        (Value::Integer(i), ValueKind::Double) => Value::Double(*i as f64),
        (Value::Integer(i), ValueKind::Bool) => Value::Bool(*i != 0),
        (Value::Integer(i), ValueKind::Vector) => Value::Vector(vec![*i as f64]),

        // ------------ from bool
        (Value::Bool(b), ValueKind::String) => {
            Value::String(if *b { "true" } else { "false" }.to_string())
        }
        (Value::Bool(b), ValueKind::Integer) => Value::Integer(*b as i64),

        // ------------ from timestamp / vector
        (Value::Timestamp(ts), ValueKind::String) => Value::String(format_timestamp(ts)),
        (Value::Vector(v), ValueKind::String) => Value::String(
            v.iter()
                .map(|d| format_double(*d))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        // A data set already satisfies a table requirement once parsed.
        (Value::DataSet(ds), ValueKind::Table) => Value::Table(ds.clone()),

        (other, kind) => {
            return Err(EntityError::Property(format!(
                "cannot convert {:?} to {:?}",
                other, kind
            )))
        }
    };

    *value = converted;
    Ok(true)
}

fn upcase_for(kind: ValueKind, s: &mut String) {
    match kind {
        ValueKind::UString => *s = s.to_uppercase(),
        ValueKind::QString => {
            if let Some(pos) = s.find(':') {
                let upper = s[pos..].to_uppercase();
                s.replace_range(pos.., &upper);
            } else {
                *s = s.to_uppercase();
            }
        }
        _ => {}
    }
}

fn conv_err(raw: &str, target: &str) -> EntityError {
    EntityError::Property(format!("cannot convert string '{}' to {}", raw, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_data_set() {
        let set = DataSet::parse("a=1 b=2.5 c=text", false).expect("data set should parse");
        assert_eq!(set.len(), 3);
        assert_eq!(set.get("a").map(|e| &e.value), Some(&DataSetValue::Integer(1)));
        assert_eq!(
            set.get("b").map(|e| &e.value),
            Some(&DataSetValue::Double(2.5))
        );
        assert_eq!(
            set.get("c").map(|e| &e.value),
            Some(&DataSetValue::String("text".into()))
        );
    }

    #[test]
    fn test_parse_quoted_and_removed() {
        let set = DataSet::parse("msg='hello world' gone x=\"a=b\"", false)
            .expect("data set should parse");
        assert_eq!(
            set.get("msg").map(|e| &e.value),
            Some(&DataSetValue::String("hello world".into()))
        );
        assert!(set.get("gone").expect("entry").removed);
        assert_eq!(
            set.get("x").map(|e| &e.value),
            Some(&DataSetValue::String("a=b".into()))
        );
    }

    #[test]
    fn test_parse_table_rows() {
        let set =
            DataSet::parse("r1={a=1 b=2} r2={c=3}", true).expect("table should parse");
        let DataSetValue::DataSet(row) = &set.get("r1").expect("row").value else {
            panic!("expected nested data set");
        };
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("b").map(|e| &e.value), Some(&DataSetValue::Integer(2)));
    }

    #[test]
    fn test_merge_removes_keys() {
        let mut base = DataSet::parse("a=1 b=2", false).expect("parse");
        let update = DataSet::parse("b c=3", false).expect("parse");
        base.merge(&update);
        assert!(base.get("b").is_none());
        assert_eq!(base.len(), 2);
        assert_eq!(base.get("c").map(|e| &e.value), Some(&DataSetValue::Integer(3)));
    }

    #[test]
    fn test_convert_string_to_vector() {
        let mut v = Value::String("1.5 2 3.25".into());
        convert_value(&mut v, ValueKind::Vector).expect("conversion should succeed");
        assert_eq!(v, Value::Vector(vec![1.5, 2.0, 3.25]));
    }

    #[test]
    fn test_convert_rejects_bad_integer() {
        let mut v = Value::String("twelve".into());
        assert!(convert_value(&mut v, ValueKind::Integer).is_err());
    }

    #[test]
    fn test_qstring_upcases_after_prefix() {
        let mut v = Value::String("x:floatEvent".into());
        convert_value(&mut v, ValueKind::QString).expect("conversion should succeed");
        assert_eq!(v, Value::String("x:FLOATEVENT".into()));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let ts = parse_timestamp("2026-01-01T12:00:00Z").expect("timestamp should parse");
        assert_eq!(format_timestamp(&ts), "2026-01-01T12:00:00.000000Z");
        assert!(parse_timestamp("2026-01-01").is_some());
        assert!(parse_timestamp("not a time").is_none());
    }
}
