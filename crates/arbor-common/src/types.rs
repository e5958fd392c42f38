//! Typed column values, composite keys, and records.
//!
//! Columns carry an explicit type tag so comparisons are well-defined
//! instead of relying on dynamic coercion. Composite keys order by arity
//! first: keys with different column counts are never equal, even when a
//! shared prefix matches.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{ArborError, Result};

/// Identifier for the supported column types.
///
/// The discriminant doubles as the wire tag in the binary codec, and
/// the declaration order defines the ordering used when columns of
/// different types are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ColumnType {
    Int = 0,
    String = 1,
    Float = 2,
    Bool = 3,
}

impl TryFrom<u8> for ColumnType {
    type Error = ArborError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ColumnType::Int),
            1 => Ok(ColumnType::String),
            2 => Ok(ColumnType::Float),
            3 => Ok(ColumnType::Bool),
            _ => Err(ArborError::Codec(format!("unknown column type: {value}"))),
        }
    }
}

/// A single typed column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Column {
    Int(i64),
    String(String),
    Float(f64),
    Bool(bool),
}

impl Column {
    /// Returns the type tag of this column.
    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Int(_) => ColumnType::Int,
            Column::String(_) => ColumnType::String,
            Column::Float(_) => ColumnType::Float,
            Column::Bool(_) => ColumnType::Bool,
        }
    }

    /// Compares two columns.
    ///
    /// Same-typed columns compare by value (floats via total ordering,
    /// `false < true` for bools). Columns of different types order by
    /// their type tag.
    pub fn compare(&self, other: &Column) -> Ordering {
        match (self, other) {
            (Column::Int(a), Column::Int(b)) => a.cmp(b),
            (Column::String(a), Column::String(b)) => a.cmp(b),
            (Column::Float(a), Column::Float(b)) => a.total_cmp(b),
            (Column::Bool(a), Column::Bool(b)) => a.cmp(b),
            _ => self.column_type().cmp(&other.column_type()),
        }
    }

    /// Returns the number of bytes this column occupies in the binary codec.
    pub fn encoded_size(&self) -> usize {
        1 + match self {
            Column::Int(_) | Column::Float(_) => 8,
            Column::String(s) => 4 + s.len(),
            Column::Bool(_) => 1,
        }
    }

    /// Appends the binary encoding of this column (big-endian, type tag first).
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.column_type() as u8);
        match self {
            Column::Int(v) => buf.put_i64(*v),
            Column::String(s) => {
                buf.put_u32(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
            Column::Float(v) => buf.put_f64(*v),
            Column::Bool(v) => buf.put_u8(u8::from(*v)),
        }
    }

    /// Decodes a column from the front of `buf`.
    pub fn decode(buf: &mut impl Buf) -> Result<Column> {
        let tag = take(buf, 1, "column type")?.get_u8();
        match ColumnType::try_from(tag)? {
            ColumnType::Int => Ok(Column::Int(take(buf, 8, "int value")?.get_i64())),
            ColumnType::Float => Ok(Column::Float(take(buf, 8, "float value")?.get_f64())),
            ColumnType::Bool => Ok(Column::Bool(take(buf, 1, "bool value")?.get_u8() == 1)),
            ColumnType::String => {
                let len = take(buf, 4, "string length")?.get_u32() as usize;
                let mut raw = vec![0u8; len];
                take(buf, len, "string bytes")?.copy_to_slice(&mut raw);
                let s = String::from_utf8(raw)
                    .map_err(|e| ArborError::Codec(format!("invalid utf-8 string: {e}")))?;
                Ok(Column::String(s))
            }
        }
    }
}

/// Checks that `buf` holds at least `need` bytes before a fixed-size read.
fn take<'a, B: Buf>(buf: &'a mut B, need: usize, what: &str) -> Result<&'a mut B> {
    if buf.remaining() < need {
        return Err(ArborError::Codec(format!(
            "truncated input: need {need} bytes for {what}, have {}",
            buf.remaining()
        )));
    }
    Ok(buf)
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Column::Int(v) => write!(f, "{v}"),
            Column::String(v) => write!(f, "{v}"),
            Column::Float(v) => write!(f, "{v}"),
            Column::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// An index key consisting of one or more column values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeKey {
    pub values: Vec<Column>,
}

impl CompositeKey {
    /// Creates a new composite key from column values.
    pub fn new(values: Vec<Column>) -> Self {
        Self { values }
    }

    /// Creates a single-column key.
    pub fn single(value: Column) -> Self {
        Self {
            values: vec![value],
        }
    }

    /// Compares two composite keys.
    ///
    /// Arity decides first: keys with different column counts are never
    /// equal, regardless of any shared prefix. Equal-arity keys compare
    /// lexicographically column-by-column.
    pub fn compare(&self, other: &CompositeKey) -> Ordering {
        match self.values.len().cmp(&other.values.len()) {
            Ordering::Equal => {}
            ord => return ord,
        }
        for (a, b) in self.values.iter().zip(&other.values) {
            match a.compare(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    /// Returns the number of bytes this key occupies in the binary codec.
    pub fn encoded_size(&self) -> usize {
        4 + self.values.iter().map(Column::encoded_size).sum::<usize>()
    }

    /// Appends the binary encoding of this key.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.values.len() as u32);
        for col in &self.values {
            col.encode(buf);
        }
    }

    /// Decodes a key from the front of `buf`.
    pub fn decode(buf: &mut impl Buf) -> Result<CompositeKey> {
        let count = take(buf, 4, "key column count")?.get_u32() as usize;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(Column::decode(buf)?);
        }
        Ok(CompositeKey { values })
    }
}

impl std::fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, col) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{col}")?;
        }
        write!(f, ")")
    }
}

/// Compares optional keys, sorting absent keys before present ones.
pub fn compare_optional(a: Option<&CompositeKey>, b: Option<&CompositeKey>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.compare(b),
    }
}

/// A stored row with one or more column values. Carried only by leaf nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    pub columns: Vec<Column>,
}

impl Record {
    /// Creates a new record from column values.
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Returns the number of bytes this record occupies in the binary codec.
    pub fn encoded_size(&self) -> usize {
        4 + self.columns.iter().map(Column::encoded_size).sum::<usize>()
    }

    /// Appends the binary encoding of this record.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.columns.len() as u32);
        for col in &self.columns {
            col.encode(buf);
        }
    }

    /// Decodes a record from the front of `buf`.
    pub fn decode(buf: &mut impl Buf) -> Result<Record> {
        let count = take(buf, 4, "record column count")?.get_u32() as usize;
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            columns.push(Column::decode(buf)?);
        }
        Ok(Record { columns })
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{col}")?;
        }
        write!(f, "}}")
    }
}
