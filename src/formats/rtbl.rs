//! RTBL - structured record tables.
//!
//! A record table file holds one or more tables of fixed-size rows. Table
//! and column names are stored only as 32-bit label hashes (see
//! [`crate::hash`]). Text cells are fixed-size NUL-padded UTF-8 slots, so a
//! translation can only be written if it fits the slot of the value it
//! replaces.
//!
//! ## Layout (little endian)
//! ```text
//! [0x00] Magic "RTBL"            (4 bytes)
//! [0x04] Version (1)             (u16)
//! [0x06] TableCount              (u16)
//! [0x08] TableDirOffset          (u32, absolute)
//! [0x0C] FileSize                (u32)
//! ```
//!
//! ### Table descriptor (0x14 bytes)
//! ```text
//! [0x00] NameHash       (u32)
//! [0x04] ColumnCount    (u16)
//! [0x06] RowSize        (u16)
//! [0x08] RowCount       (u32)
//! [0x0C] ColumnsOffset  (u32, absolute)
//! [0x10] RowsOffset     (u32, absolute)
//! ```
//!
//! ### Column descriptor (0x0C bytes)
//! ```text
//! [0x00] NameHash       (u32)
//! [0x04] Offset in row  (u16)
//! [0x06] Size           (u16)
//! [0x08] Kind           (u8)
//! [0x09] Padding        (3 bytes)
//! ```

use std::collections::HashMap;
use std::fmt;

use log::{debug, trace, warn};

use crate::config::{BudgetConfig, PatchOptions};
use crate::hash::{HashResolver, label_hash};
use crate::text::prepare;
use crate::utils::{align_up, le_u16_at, le_u32_at, magic_at, put_bytes, put_u32, slice_at};
use crate::{Error, Result};

const MAGIC: &[u8; 4] = b"RTBL";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 0x10;
const TABLE_DESCRIPTOR_SIZE: usize = 0x14;
const COLUMN_DESCRIPTOR_SIZE: usize = 0x0C;

/// Type of the values stored in a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColumnKind {
    String,
    /// Text shown to the player by message id; stored like `String`.
    MessageId,
    Int,
    Float,
    Hash,
    Raw,
}

impl ColumnKind {
    fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0 => Self::String,
            1 => Self::MessageId,
            2 => Self::Int,
            3 => Self::Float,
            4 => Self::Hash,
            5 => Self::Raw,
            _ => return Err(Error::Parse("unknown RTBL column kind")),
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::String => 0,
            Self::MessageId => 1,
            Self::Int => 2,
            Self::Float => 3,
            Self::Hash => 4,
            Self::Raw => 5,
        }
    }

    /// Whether the column holds translatable text.
    pub fn is_text(self) -> bool {
        matches!(self, Self::String | Self::MessageId)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name_hash: u32,
    /// Resolved name, or the hash rendered as hex.
    pub name: String,
    /// Byte offset within a row.
    pub offset: u16,
    pub size: u16,
    pub kind: ColumnKind,
}

/// One decoded cell.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    String(String),
    MessageId(String),
    Int(i64),
    Float(f32),
    Hash(u32),
    Raw(Vec<u8>),
}

impl Value {
    /// The text of a `String` or `MessageId` cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::MessageId(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name_hash: u32,
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    /// Absolute offset of row 0.
    pub rows_offset: usize,
    pub row_size: usize,
}

impl Table {
    /// Absolute offset of a cell.
    pub fn cell_offset(&self, row: usize, column: &Column) -> usize {
        self.rows_offset + row * self.row_size + column.offset as usize
    }
}

fn decode_value(kind: ColumnKind, raw: &[u8]) -> Result<Value> {
    let text = || {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    };
    Ok(match kind {
        ColumnKind::String => Value::String(text()),
        ColumnKind::MessageId => Value::MessageId(text()),
        ColumnKind::Int => Value::Int(match *raw {
            [a] => a as i8 as i64,
            [a, b] => i16::from_le_bytes([a, b]) as i64,
            [a, b, c, d] => i32::from_le_bytes([a, b, c, d]) as i64,
            [a, b, c, d, e, f, g, h] => i64::from_le_bytes([a, b, c, d, e, f, g, h]),
            _ => return Err(Error::Parse("RTBL int column must be 1, 2, 4 or 8 bytes")),
        }),
        ColumnKind::Float => match *raw {
            [a, b, c, d] => Value::Float(f32::from_le_bytes([a, b, c, d])),
            _ => return Err(Error::Parse("RTBL float column must be 4 bytes")),
        },
        ColumnKind::Hash => match *raw {
            [a, b, c, d] => Value::Hash(u32::from_le_bytes([a, b, c, d])),
            _ => return Err(Error::Parse("RTBL hash column must be 4 bytes")),
        },
        ColumnKind::Raw => Value::Raw(raw.to_vec()),
    })
}

/// Decode every table in a record table file.
pub fn parse(data: &[u8], resolver: &dyn HashResolver) -> Result<Vec<Table>> {
    magic_at(data, 0, MAGIC)?;
    let version = le_u16_at(data, 4)?;
    if version != VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    let table_count = le_u16_at(data, 6)? as usize;
    let dir = le_u32_at(data, 8)? as usize;

    let mut tables = Vec::with_capacity(table_count);
    for t in 0..table_count {
        let desc = slice_at(data, dir + t * TABLE_DESCRIPTOR_SIZE, TABLE_DESCRIPTOR_SIZE)?;
        let name_hash = le_u32_at(desc, 0)?;
        let column_count = le_u16_at(desc, 4)? as usize;
        let row_size = le_u16_at(desc, 6)? as usize;
        let row_count = le_u32_at(desc, 8)? as usize;
        let columns_offset = le_u32_at(desc, 0x0C)? as usize;
        let rows_offset = le_u32_at(desc, 0x10)? as usize;

        let mut columns = Vec::with_capacity(column_count);
        for c in 0..column_count {
            let at = columns_offset + c * COLUMN_DESCRIPTOR_SIZE;
            let col = slice_at(data, at, COLUMN_DESCRIPTOR_SIZE)?;
            let column = Column {
                name_hash: le_u32_at(col, 0)?,
                name: resolver.label(le_u32_at(col, 0)?),
                offset: le_u16_at(col, 4)?,
                size: le_u16_at(col, 6)?,
                kind: ColumnKind::from_u8(col[8])?,
            };
            if column.offset as usize + column.size as usize > row_size {
                return Err(Error::InvalidRange);
            }
            columns.push(column);
        }

        if row_size == 0 && row_count > 0 {
            return Err(Error::Parse("RTBL table has rows of size zero"));
        }
        let region_len = row_count.checked_mul(row_size).ok_or(Error::InvalidRange)?;
        let region = slice_at(data, rows_offset, region_len)?;
        let mut rows = Vec::with_capacity(row_count);
        for r in 0..row_count {
            let row = &region[r * row_size..(r + 1) * row_size];
            let values = columns
                .iter()
                .map(|c| decode_value(c.kind, &row[c.offset as usize..][..c.size as usize]))
                .collect::<Result<Vec<_>>>()?;
            rows.push(values);
        }

        let name = resolver.label(name_hash);
        trace!("RTBL table {name}: {column_count} columns, {row_count} rows");
        tables.push(Table {
            name_hash,
            name,
            columns,
            rows,
            rows_offset,
            row_size,
        });
    }
    Ok(tables)
}

/// Stable identity of a text cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellKey {
    pub table: String,
    pub row: usize,
    pub column: String,
}

impl CellKey {
    pub fn new(table: impl Into<String>, row: usize, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            row,
            column: column.into(),
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}].{}", self.table, self.row, self.column)
    }
}

/// An extracted string with its size limits.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextUnit {
    pub file: String,
    pub key: CellKey,
    pub text: String,
    /// Soft budget derived from the column's longest value.
    pub max_bytes: usize,
    /// Hard limit: the slot size in bytes.
    pub slot_size: usize,
}

/// Every `String` and `MessageId` value of `table`, with its budget.
pub fn extract_strings(table: &Table, file_name: &str, budget: &BudgetConfig) -> Vec<TextUnit> {
    let mut units = Vec::new();
    for (c, column) in table.columns.iter().enumerate() {
        if !column.kind.is_text() {
            continue;
        }
        let longest = table
            .rows
            .iter()
            .filter_map(|row| row[c].as_text())
            .map(str::len)
            .max()
            .unwrap_or(0);
        let max_bytes = budget.max_bytes(longest);
        for (r, row) in table.rows.iter().enumerate() {
            if let Some(text) = row[c].as_text() {
                units.push(TextUnit {
                    file: file_name.to_owned(),
                    key: CellKey::new(&table.name, r, &column.name),
                    text: text.to_owned(),
                    max_bytes,
                    slot_size: column.size as usize,
                });
            }
        }
    }
    units
}

/// Translations keyed by cell.
///
/// Sequential-index keys are kept apart and only consulted when a cell has
/// no structured key, for projects exported before cell keys existed.
#[derive(Debug, Clone, Default)]
pub struct TranslationMap {
    cells: HashMap<CellKey, String>,
    legacy: HashMap<usize, String>,
}

impl TranslationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: CellKey, text: impl Into<String>) {
        self.cells.insert(key, text.into());
    }

    /// Key a translation by the position of its cell in extraction order
    /// across the whole file.
    pub fn insert_legacy(&mut self, index: usize, text: impl Into<String>) {
        self.legacy.insert(index, text.into());
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.legacy.is_empty()
    }

    fn lookup(&self, key: &CellKey, index: usize) -> Option<&str> {
        if let Some(text) = self.cells.get(key) {
            return Some(text);
        }
        let text = self.legacy.get(&index)?;
        debug!("{key}: using legacy index {index}");
        Some(text)
    }
}

impl FromIterator<(CellKey, String)> for TranslationMap {
    fn from_iter<I: IntoIterator<Item = (CellKey, String)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
            legacy: HashMap::new(),
        }
    }
}

/// A translation that did not fit its slot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OverflowError {
    pub key: CellKey,
    /// Encoded length in bytes.
    pub needed: usize,
    pub available: usize,
}

impl From<OverflowError> for Error {
    fn from(e: OverflowError) -> Self {
        Error::Overflow {
            key: e.key.to_string(),
            needed: e.needed,
            available: e.available,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableStats {
    pub name: String,
    pub strings: usize,
    pub patched: usize,
    pub overflows: usize,
}

/// Output of [`patch`].
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    /// Patched file; always the same length as the input.
    pub bytes: Vec<u8>,
    pub overflows: Vec<OverflowError>,
    /// Cells written.
    pub patched: usize,
    /// Text cells with no translation.
    pub skipped: usize,
    pub tables: Vec<TableStats>,
}

/// Write translations into a copy of `original`.
///
/// Each translated cell is prepared with [`prepare`] and written NUL-padded
/// if it fits (`len <= size`; a value filling the slot has no NUL, as the
/// parser accepts). A cell that does not fit keeps its
/// original bytes and is reported in [`PatchOutcome::overflows`], or fails
/// the call when [`PatchOptions::strict`] is set.
pub fn patch(
    original: &[u8],
    resolver: &dyn HashResolver,
    translations: &TranslationMap,
    options: &PatchOptions,
) -> Result<PatchOutcome> {
    let tables = parse(original, resolver)?;
    let mut bytes = original.to_vec();
    let mut outcome_overflows = Vec::new();
    let mut patched = 0;
    let mut skipped = 0;
    let mut stats = Vec::with_capacity(tables.len());
    let mut index = 0;

    for table in &tables {
        let mut table_stats = TableStats {
            name: table.name.clone(),
            ..TableStats::default()
        };
        for (c, column) in table.columns.iter().enumerate() {
            if !column.kind.is_text() {
                continue;
            }
            for (r, row) in table.rows.iter().enumerate() {
                let Some(source) = row[c].as_text() else { continue };
                let key = CellKey::new(&table.name, r, &column.name);
                let position = index;
                index += 1;
                table_stats.strings += 1;

                let Some(translation) = translations.lookup(&key, position) else {
                    skipped += 1;
                    continue;
                };

                let text = prepare(source, translation, options);
                let encoded = text.as_bytes();
                let available = column.size as usize;
                if encoded.len() > available {
                    let overflow = OverflowError {
                        key,
                        needed: encoded.len(),
                        available,
                    };
                    warn!(
                        "{}: {} bytes do not fit a {available}-byte slot, keeping original",
                        overflow.key, overflow.needed
                    );
                    if options.strict {
                        return Err(overflow.into());
                    }
                    table_stats.overflows += 1;
                    outcome_overflows.push(overflow);
                    continue;
                }

                let mut slot = vec![0u8; available];
                slot[..encoded.len()].copy_from_slice(encoded);
                put_bytes(&mut bytes, table.cell_offset(r, column), &slot)?;
                trace!("{key}: {} / {available} bytes", encoded.len());
                table_stats.patched += 1;
                patched += 1;
            }
        }
        stats.push(table_stats);
    }

    Ok(PatchOutcome {
        bytes,
        overflows: outcome_overflows,
        patched,
        skipped,
        tables: stats,
    })
}

/// Builds one table for [`write`].
#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
    columns: Vec<(String, ColumnKind, u16)>,
    rows: Vec<Vec<Value>>,
}

impl TableBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn column(mut self, name: &str, kind: ColumnKind, size: u16) -> Self {
        self.columns.push((name.to_owned(), kind, size));
        self
    }

    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    fn row_size(&self) -> usize {
        align_up(self.columns.iter().map(|c| c.2 as usize).sum(), 4)
    }
}

fn encode_value(value: &Value, kind: ColumnKind, size: usize, out: &mut [u8]) -> Result<()> {
    match (value, kind) {
        (Value::String(s), ColumnKind::String) | (Value::MessageId(s), ColumnKind::MessageId) => {
            if s.len() > size {
                return Err(Error::Overflow {
                    key: s.clone(),
                    needed: s.len(),
                    available: size,
                });
            }
            out[..s.len()].copy_from_slice(s.as_bytes());
        }
        (Value::Int(v), ColumnKind::Int) if matches!(size, 1 | 2 | 4 | 8) => {
            out.copy_from_slice(&v.to_le_bytes()[..size]);
        }
        (Value::Float(v), ColumnKind::Float) if size == 4 => out.copy_from_slice(&v.to_le_bytes()),
        (Value::Hash(v), ColumnKind::Hash) if size == 4 => out.copy_from_slice(&v.to_le_bytes()),
        (Value::Raw(v), ColumnKind::Raw) => {
            let n = v.len().min(size);
            out[..n].copy_from_slice(&v[..n]);
        }
        _ => return Err(Error::Parse("value does not match its column")),
    }
    Ok(())
}

/// Serialize tables into a record table file.
pub fn write(tables: &[TableBuilder]) -> Result<Vec<u8>> {
    let table_count = u16::try_from(tables.len()).map_err(|_| Error::Parse("too many tables"))?;
    let mut out = vec![0u8; HEADER_SIZE + tables.len() * TABLE_DESCRIPTOR_SIZE];
    out[..4].copy_from_slice(MAGIC);
    out[4..6].copy_from_slice(&VERSION.to_le_bytes());
    out[6..8].copy_from_slice(&table_count.to_le_bytes());
    put_u32(&mut out, 8, HEADER_SIZE as u32)?;

    for (t, table) in tables.iter().enumerate() {
        let row_size = table.row_size();
        let columns_offset = out.len();
        let mut offset = 0usize;
        let mut layout = Vec::with_capacity(table.columns.len());
        for (name, kind, size) in &table.columns {
            out.extend_from_slice(&label_hash(name).to_le_bytes());
            out.extend_from_slice(&(offset as u16).to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&[kind.to_u8(), 0, 0, 0]);
            layout.push((offset, *kind, *size as usize));
            offset += *size as usize;
        }

        out.resize(align_up(out.len(), 4), 0);
        let rows_offset = out.len();
        for values in &table.rows {
            if values.len() != layout.len() {
                return Err(Error::Parse("row width does not match the columns"));
            }
            let mut row = vec![0u8; row_size];
            for (value, &(offset, kind, size)) in values.iter().zip(&layout) {
                encode_value(value, kind, size, &mut row[offset..offset + size])?;
            }
            out.extend_from_slice(&row);
        }

        let desc = HEADER_SIZE + t * TABLE_DESCRIPTOR_SIZE;
        put_u32(&mut out, desc, label_hash(&table.name))?;
        out[desc + 4..desc + 6].copy_from_slice(&(table.columns.len() as u16).to_le_bytes());
        out[desc + 6..desc + 8].copy_from_slice(&(row_size as u16).to_le_bytes());
        put_u32(&mut out, desc + 8, table.rows.len() as u32)?;
        put_u32(&mut out, desc + 0x0C, columns_offset as u32)?;
        put_u32(&mut out, desc + 0x10, rows_offset as u32)?;
    }

    let size = out.len() as u32;
    put_u32(&mut out, 0x0C, size)?;
    Ok(out)
}
