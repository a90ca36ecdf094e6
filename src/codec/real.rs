use std::io::{Read, Write};

use crate::codec::CodecTag;
use crate::result::Result;
use crate::stream::{DataReader, DataWriter};
use crate::value::Cell;

/// Raw 8-byte cells: doubles, and integer columns too wide for the narrowed
/// family. The slot's bit pattern crosses the wire untouched apart from
/// byte order, so any cell round-trips exactly.
#[derive(Debug, Clone, Default)]
pub(crate) struct LongReal;

impl LongReal {
    pub fn encode<W: Write>(&self, cell: Cell, out: &mut DataWriter<W>) -> Result<()> {
        out.write_i64(cell.to_i64())
    }

    pub fn decode<R: Read>(&self, src: &mut DataReader<R>) -> Result<Cell> {
        Ok(Cell::from_i64(src.read_i64()?))
    }
}

/// Single-precision cells. With a sentinel in the header, a wire value whose
/// bits match it decodes to the column's missing value.
#[derive(Debug, Clone)]
pub(crate) struct ShortReal {
    missing: Option<f32>,
}

impl ShortReal {
    pub fn new(missing: Option<f32>) -> Self {
        Self { missing }
    }

    pub fn tag(&self) -> CodecTag {
        if self.missing.is_some() {
            CodecTag::ShortReal2
        } else {
            CodecTag::ShortReal
        }
    }

    pub fn save_params<W: Write>(&self, out: &mut DataWriter<W>) -> Result<()> {
        if let Some(missing) = self.missing {
            out.write_f32(missing)?;
        }
        Ok(())
    }

    pub fn load<R: Read>(src: &mut DataReader<R>, with_missing: bool) -> Result<Self> {
        let missing = if with_missing {
            Some(src.read_f32()?)
        } else {
            None
        };
        Ok(Self::new(missing))
    }

    pub fn encode<W: Write>(&self, cell: Cell, out: &mut DataWriter<W>) -> Result<()> {
        match self.missing {
            // Canonicalise on the sentinel's bits so decode can compare them.
            Some(missing) if cell.to_f32() == missing => out.write_f32(missing),
            _ => out.write_f32(cell.to_f32()),
        }
    }

    pub fn decode<R: Read>(&self, src: &mut DataReader<R>) -> Result<Cell> {
        let value = src.read_f32()?;
        if let Some(missing) = self.missing {
            if value.to_bits() == missing.to_bits() {
                return Ok(Cell::from_f32(missing));
            }
        }
        Ok(Cell::from_f32(value))
    }
}
