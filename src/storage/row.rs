//! Cell and Row types for CellarDB
//!
//! This module defines how values are represented in memory and how rows
//! are encoded in table snapshot files.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::fmt;
use std::io::{self, Read, Write};

use crate::catalog::ColumnType;

/// A single typed value
#[derive(Debug, Clone)]
pub enum Cell {
    /// NULL value
    Null,
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// Double-precision float
    Double(f64),
    /// String value
    String(String),
}

impl Cell {
    /// Check if this cell is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Runtime kind of a non-null cell
    pub fn kind(&self) -> Option<ColumnType> {
        match self {
            Cell::Null => None,
            Cell::Int(_) => Some(ColumnType::Int),
            Cell::Long(_) => Some(ColumnType::Long),
            Cell::Double(_) => Some(ColumnType::Double),
            Cell::String(_) => Some(ColumnType::String),
        }
    }

    /// Get the type name of this cell
    pub fn type_name(&self) -> &'static str {
        match self {
            Cell::Null => "NULL",
            Cell::Int(_) => "INT",
            Cell::Long(_) => "LONG",
            Cell::Double(_) => "DOUBLE",
            Cell::String(_) => "STRING",
        }
    }

    /// Try to borrow as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::String(s) => Some(s),
            _ => None,
        }
    }

    // Cells of different kinds order by kind alone
    fn rank(&self) -> u8 {
        match self {
            Cell::Null => 0,
            Cell::Int(_) => 1,
            Cell::Long(_) => 2,
            Cell::Double(_) => 3,
            Cell::String(_) => 4,
        }
    }

    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Cell::Null => w.write_u8(0),
            Cell::Int(i) => {
                w.write_u8(1)?;
                w.write_i32::<LittleEndian>(*i)
            }
            Cell::Long(i) => {
                w.write_u8(2)?;
                w.write_i64::<LittleEndian>(*i)
            }
            Cell::Double(d) => {
                w.write_u8(3)?;
                w.write_f64::<LittleEndian>(*d)
            }
            Cell::String(s) => {
                w.write_u8(4)?;
                w.write_u32::<LittleEndian>(s.len() as u32)?;
                w.write_all(s.as_bytes())
            }
        }
    }

    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let tag = r.read_u8()?;
        match tag {
            0 => Ok(Cell::Null),
            1 => Ok(Cell::Int(r.read_i32::<LittleEndian>()?)),
            2 => Ok(Cell::Long(r.read_i64::<LittleEndian>()?)),
            3 => Ok(Cell::Double(r.read_f64::<LittleEndian>()?)),
            4 => {
                let len = r.read_u32::<LittleEndian>()? as usize;
                let mut buf = vec![0u8; len];
                r.read_exact(&mut buf)?;
                String::from_utf8(buf)
                    .map(Cell::String)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown cell tag {}", tag),
            )),
        }
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Cell::Null, Cell::Null) => Ordering::Equal,
            (Cell::Int(a), Cell::Int(b)) => a.cmp(b),
            (Cell::Long(a), Cell::Long(b)) => a.cmp(b),
            (Cell::Double(a), Cell::Double(b)) => a.total_cmp(b),
            (Cell::String(a), Cell::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "null"),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Long(i) => write!(f, "{}", i),
            Cell::Double(d) => write!(f, "{}", d),
            Cell::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Cell {
    fn from(v: i32) -> Self {
        Cell::Int(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Long(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Double(v)
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::String(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::String(v.to_string())
    }
}

/// An ordered sequence of cells, one per column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    cells: Vec<Cell>,
}

impl Row {
    /// Create a new row from cells
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// Get a cell by position
    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    /// Get all cells
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Get number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if row is empty
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Consume the row and return the cells
    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    /// Concatenate two rows
    pub fn concat(&self, other: &Row) -> Row {
        let mut cells = self.cells.clone();
        cells.extend(other.cells.iter().cloned());
        Row::new(cells)
    }

    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.cells.len() as u32)?;
        for cell in &self.cells {
            cell.encode(w)?;
        }
        Ok(())
    }

    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let count = r.read_u32::<LittleEndian>()? as usize;
        let mut cells = Vec::with_capacity(count.min(1 << 10));
        for _ in 0..count {
            cells.push(Cell::decode(r)?);
        }
        Ok(Row::new(cells))
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.cells.iter().map(|c| c.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}

impl FromIterator<Cell> for Row {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        Row::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Cell;
    type IntoIter = std::slice::Iter<'a, Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

const SNAPSHOT_MAGIC: &[u8; 4] = b"CDBS";

/// Write a whole-table snapshot: magic, row count, then every row.
pub fn write_snapshot<'a, W, I>(w: &mut W, rows: I) -> io::Result<()>
where
    W: Write,
    I: ExactSizeIterator<Item = &'a Row>,
{
    w.write_all(SNAPSHOT_MAGIC)?;
    w.write_u64::<LittleEndian>(rows.len() as u64)?;
    for row in rows {
        row.encode(w)?;
    }
    w.flush()
}

/// Read back a snapshot written by [`write_snapshot`]
pub fn read_snapshot<R: Read>(r: &mut R) -> io::Result<Vec<Row>> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != SNAPSHOT_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "bad snapshot header",
        ));
    }
    let count = r.read_u64::<LittleEndian>()? as usize;
    let mut rows = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        rows.push(Row::decode(r)?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_ordering() {
        assert!(Cell::Int(5) > Cell::Int(3));
        assert!(Cell::from("abc") < Cell::from("abd"));
        assert!(Cell::Double(-1.5) < Cell::Double(0.25));
        assert_eq!(Cell::Null, Cell::Null);
        assert!(Cell::Null < Cell::Int(i32::MIN));
    }

    #[test]
    fn test_cell_kind() {
        assert_eq!(Cell::Long(1).kind(), Some(ColumnType::Long));
        assert_eq!(Cell::Null.kind(), None);
    }

    #[test]
    fn test_row_operations() {
        let row = Row::new(vec![Cell::Int(1), Cell::from("hello"), Cell::Null]);
        assert_eq!(row.len(), 3);
        assert_eq!(row.get(1), Some(&Cell::from("hello")));
        assert_eq!(row.to_string(), "(1, hello, null)");

        let joined = row.concat(&Row::new(vec![Cell::Double(2.5)]));
        assert_eq!(joined.len(), 4);
        assert_eq!(joined.get(3), Some(&Cell::Double(2.5)));
    }

    #[test]
    fn test_snapshot_rejects_garbage() {
        let mut bytes: &[u8] = b"nope, not a snapshot";
        let err = read_snapshot(&mut bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_snapshot_truncated() {
        let rows = vec![
            Row::new(vec![Cell::Int(1), Cell::from("a")]),
            Row::new(vec![Cell::Int(2), Cell::Null]),
        ];
        let mut buf = Vec::new();
        write_snapshot(&mut buf, rows.iter()).unwrap();
        buf.truncate(buf.len() - 1);

        let err = read_snapshot(&mut buf.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
