use std::io::{Read, Write};

use crate::codec::Codec;
use crate::column::{BitfieldDef, Column, ColumnKind};
use crate::constants::MAX_COLUMN_NAME;
use crate::result::{Error, Result};
use crate::stream::{DataReader, DataWriter};

// Column descriptors cannot be smaller than name length + kind + missing
// value + codec tag.
const MIN_COLUMN_BYTES: i64 = 14;

/// Fixed header fields following the magic and the byte-order flag, in the
/// frame's byte order.
pub(crate) struct FrameHead {
    pub header_length: i32,
    pub previous_frame_offset: i64,
    pub row_count: i32,
    pub column_count: i32,
}

impl FrameHead {
    pub fn write<W: Write>(&self, out: &mut DataWriter<W>) -> Result<()> {
        out.write_i32(self.header_length)?;
        out.write_i64(self.previous_frame_offset)?;
        out.write_i32(self.row_count)?;
        out.write_i32(self.column_count)
    }

    pub fn read<R: Read>(src: &mut DataReader<R>) -> Result<Self> {
        let header_length = src.read_i32()?;
        let previous_frame_offset = src.read_i64()?;
        let row_count = src.read_i32()?;
        let column_count = src.read_i32()?;
        if header_length < 0 {
            return Err(Error::FormatViolation("negative header length"));
        }
        if previous_frame_offset < -1 {
            return Err(Error::FormatViolation("previous frame offset"));
        }
        if row_count < 0 {
            return Err(Error::FormatViolation("negative row count"));
        }
        if column_count < 0 {
            return Err(Error::FormatViolation("negative column count"));
        }
        if i64::from(column_count) * MIN_COLUMN_BYTES > i64::from(header_length) {
            return Err(Error::FormatViolation("implausible header length"));
        }
        Ok(Self {
            header_length,
            previous_frame_offset,
            row_count,
            column_count,
        })
    }
}

/// One column descriptor: name, kind, missing value, bitfield layout for
/// bitfield columns, then the codec header.
pub(crate) fn write_column<W: Write>(
    out: &mut DataWriter<W>,
    column: &Column,
    codec: &Codec,
) -> Result<()> {
    out.write_string(column.name())?;
    out.write_u8(*column.kind() as u8)?;
    out.write_f64(*column.missing_value())?;
    if let Some(def) = column.bitfield() {
        def.save(out)?;
    }
    codec.save_header(out)
}

pub(crate) fn read_column<R: Read>(src: &mut DataReader<R>) -> Result<(Column, Codec)> {
    let name = src.read_string()?;
    if name.len() > MAX_COLUMN_NAME {
        return Err(Error::FormatViolation("column name longer than 1 KiB"));
    }
    let kind = ColumnKind::from_wire(src.read_u8()?)?;
    let missing_value = src.read_f64()?;
    let column = if kind == ColumnKind::Bitfield {
        let def = BitfieldDef::load(src)?;
        Column::bitfield_column(name, missing_value, def)?
    } else {
        Column::new(name, kind, missing_value)?
    };
    let codec = Codec::load(src, &column)?;
    Ok((column, codec))
}
