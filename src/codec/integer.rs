use std::io::{Read, Write};

use crate::codec::CodecTag;
use crate::result::{Error, Result};
use crate::stream::{DataReader, DataWriter};
use crate::value::Cell;

/// Frame-of-reference narrowed integers: each cell is `reference` plus an
/// unsigned delta of one, two or four bytes. When the frame saw missing
/// values, the top delta of the width is reserved and decodes to the
/// column's missing sentinel carried in the header.
#[derive(Debug, Clone)]
pub(crate) struct NarrowInt {
    width: u8,
    reference: i64,
    missing: Option<i64>,
}

impl NarrowInt {
    pub fn new(width: u8, reference: i64, missing: Option<i64>) -> Self {
        debug_assert!(matches!(width, 1 | 2 | 4));
        Self {
            width,
            reference,
            missing,
        }
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn tag(&self) -> CodecTag {
        match (self.width, self.missing.is_some()) {
            (1, false) => CodecTag::Int8,
            (2, false) => CodecTag::Int16,
            (4, false) => CodecTag::Int32,
            (1, true) => CodecTag::Int8Missing,
            (2, true) => CodecTag::Int16Missing,
            _ => CodecTag::Int32Missing,
        }
    }

    pub fn save_params<W: Write>(&self, out: &mut DataWriter<W>) -> Result<()> {
        out.write_i64(self.reference)?;
        if let Some(missing) = self.missing {
            out.write_i64(missing)?;
        }
        Ok(())
    }

    pub fn load<R: Read>(src: &mut DataReader<R>, width: u8, with_missing: bool) -> Result<Self> {
        let reference = src.read_i64()?;
        let missing = if with_missing {
            Some(src.read_i64()?)
        } else {
            None
        };
        Ok(Self::new(width, reference, missing))
    }

    fn top(&self) -> u64 {
        match self.width {
            1 => u64::from(u8::MAX),
            2 => u64::from(u16::MAX),
            _ => u64::from(u32::MAX),
        }
    }

    pub fn encode<W: Write>(&self, cell: Cell, out: &mut DataWriter<W>) -> Result<()> {
        let raw = match self.missing {
            Some(missing) if cell.to_i64() == missing => self.top(),
            _ => {
                let delta = cell
                    .to_i64()
                    .checked_sub(self.reference)
                    .ok_or(Error::CodecParamOutOfRange("value below codec reference"))?;
                let limit = self.top() - u64::from(self.missing.is_some());
                if delta < 0 || delta as u64 > limit {
                    return Err(Error::CodecParamOutOfRange("value outside narrowed range"));
                }
                delta as u64
            }
        };
        match self.width {
            1 => out.write_u8(raw as u8),
            2 => out.write_u16(raw as u16),
            _ => out.write_u32(raw as u32),
        }
    }

    pub fn decode<R: Read>(&self, src: &mut DataReader<R>) -> Result<Cell> {
        let raw = match self.width {
            1 => u64::from(src.read_u8()?),
            2 => u64::from(src.read_u16()?),
            _ => u64::from(src.read_u32()?),
        };
        if let Some(missing) = self.missing {
            if raw == self.top() {
                return Ok(Cell::from_i64(missing));
            }
        }
        let value = self
            .reference
            .checked_add(raw as i64)
            .ok_or(Error::CodecParamOutOfRange("narrowed value overflows 64 bits"))?;
        Ok(Cell::from_i64(value))
    }
}
