use std::fmt;
use std::io::{Read, Write};

use derive_getters::Getters;
use modular_bitfield::prelude::*;

use crate::constants::MAX_COLUMN_NAME;
use crate::result::{Error, Result};
use crate::stream::{DataReader, DataWriter};
use crate::value::Cell;

/// Column data kinds; the numbering is part of the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[bits = 8]
pub enum ColumnKind {
    Ignore = 0,
    Integer = 1,
    Real = 2,
    String = 3,
    Bitfield = 4,
    Double = 5,
}

impl ColumnKind {
    pub(crate) fn from_wire(byte: u8) -> Result<Self> {
        <ColumnKind as Specifier>::from_bytes(byte)
            .map_err(|_| Error::FormatViolation("column kind byte"))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnKind::Ignore => "ignore",
            ColumnKind::Integer => "integer",
            ColumnKind::Real => "real",
            ColumnKind::String => "string",
            ColumnKind::Bitfield => "bitfield",
            ColumnKind::Double => "double",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One named sub-field of a bitfield column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitField {
    pub name: String,
    pub bits: i32,
}

impl BitField {
    pub fn new(name: impl Into<String>, bits: i32) -> Self {
        Self {
            name: name.into(),
            bits,
        }
    }
}

/// Ordered sub-fields of a bitfield column, packed least-significant first
/// into the integer slot. Widths sum to at most 32.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BitfieldDef {
    fields: Vec<BitField>,
}

impl BitfieldDef {
    pub fn new(fields: Vec<BitField>) -> Result<Self> {
        let mut total: i64 = 0;
        for field in &fields {
            if field.bits < 1 {
                return Err(Error::FormatViolation("bitfield width must be positive"));
            }
            total += i64::from(field.bits);
        }
        if total > 32 {
            return Err(Error::FormatViolation("bitfield widths exceed 32 bits"));
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[BitField] {
        &self.fields
    }

    /// Value of the named sub-field within a cell.
    pub fn extract(&self, cell: Cell, name: &str) -> Option<u32> {
        let mut shift = 0u32;
        for field in &self.fields {
            let width = field.bits as u32;
            if field.name == name {
                let mask = if width == 32 { u32::MAX } else { (1u32 << width) - 1 };
                return Some(((cell.to_i64() as u64 >> shift) as u32) & mask);
            }
            shift += width;
        }
        None
    }

    pub(crate) fn save<W: Write>(&self, out: &mut DataWriter<W>) -> Result<()> {
        out.write_i32(self.fields.len() as i32)?;
        for field in &self.fields {
            out.write_string(&field.name)?;
            out.write_i32(field.bits)?;
        }
        Ok(())
    }

    pub(crate) fn load<R: Read>(src: &mut DataReader<R>) -> Result<Self> {
        let count = src.read_i32()?;
        if count < 0 {
            return Err(Error::FormatViolation("negative bitfield count"));
        }
        let mut fields = Vec::with_capacity(count.min(32) as usize);
        for _ in 0..count {
            let name = src.read_string()?;
            let bits = src.read_i32()?;
            fields.push(BitField { name, bits });
        }
        BitfieldDef::new(fields)
    }
}

/// A column of the frame schema: name, kind, the missing-value sentinel and,
/// for bitfield columns, the packed sub-field layout.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct Column {
    name: String,
    kind: ColumnKind,
    missing_value: f64,
    bitfield: Option<BitfieldDef>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind, missing_value: f64) -> Result<Self> {
        if kind == ColumnKind::Bitfield {
            return Err(Error::FormatViolation("bitfield columns need a descriptor"));
        }
        Self::build(name.into(), kind, missing_value, None)
    }

    pub fn bitfield_column(
        name: impl Into<String>,
        missing_value: f64,
        def: BitfieldDef,
    ) -> Result<Self> {
        Self::build(name.into(), ColumnKind::Bitfield, missing_value, Some(def))
    }

    fn build(
        name: String,
        kind: ColumnKind,
        missing_value: f64,
        bitfield: Option<BitfieldDef>,
    ) -> Result<Self> {
        if name.len() > MAX_COLUMN_NAME {
            return Err(Error::FormatViolation("column name longer than 1 KiB"));
        }
        Ok(Self {
            name,
            kind,
            missing_value,
            bitfield,
        })
    }

    /// Missing comparison under the column's slot convention: integer slots
    /// compare as `i64`, real slots at `f32` precision, double slots as-is.
    /// String cells are never missing.
    pub fn is_missing(&self, cell: Cell) -> bool {
        match self.kind {
            ColumnKind::Integer | ColumnKind::Bitfield | ColumnKind::Ignore => {
                cell.to_i64() == self.missing_value as i64
            }
            ColumnKind::Real => cell.to_f32() == self.missing_value as f32,
            ColumnKind::Double => cell.to_f64() == self.missing_value,
            ColumnKind::String => false,
        }
    }

    pub(crate) fn missing_as_i64(&self) -> i64 {
        self.missing_value as i64
    }
}

/// Ordered column set of one frame. Every row carries exactly one cell per
/// column, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Cells per row.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column by name, the consumer re-binding helper.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitfield_extraction_is_lsb_first() {
        let def = BitfieldDef::new(vec![
            BitField::new("flag", 1),
            BitField::new("level", 5),
            BitField::new("source", 3),
        ])
        .unwrap();
        let cell = Cell::from_i64(0b101_10110_1);
        assert_eq!(def.extract(cell, "flag"), Some(1));
        assert_eq!(def.extract(cell, "level"), Some(0b10110));
        assert_eq!(def.extract(cell, "source"), Some(0b101));
        assert_eq!(def.extract(cell, "absent"), None);
    }

    #[test]
    fn bitfield_widths_are_bounded() {
        assert!(BitfieldDef::new(vec![BitField::new("all", 32)]).is_ok());
        assert!(BitfieldDef::new(vec![BitField::new("a", 20), BitField::new("b", 13)]).is_err());
        assert!(BitfieldDef::new(vec![BitField::new("z", 0)]).is_err());
    }

    #[test]
    fn column_construction_is_validated() {
        assert!(Column::new("x", ColumnKind::Bitfield, 0.0).is_err());
        assert!(Column::new("y".repeat(1025), ColumnKind::Integer, 0.0).is_err());

        let col = Column::new("n", ColumnKind::Integer, -1.0).unwrap();
        assert!(col.is_missing(Cell::from_i64(-1)));
        assert!(!col.is_missing(Cell::from_i64(0)));
    }

    #[test]
    fn schema_positions_columns_by_name() {
        let schema = Schema::new(vec![
            Column::new("lat", ColumnKind::Real, -1.0).unwrap(),
            Column::new("lon", ColumnKind::Real, -1.0).unwrap(),
        ]);
        assert_eq!(schema.position("lon"), Some(1));
        assert_eq!(schema.position("alt"), None);
        assert_eq!(schema.width(), 2);
    }
}
