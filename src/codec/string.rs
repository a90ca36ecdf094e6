use std::io::{Read, Write};

use crate::codec::{CodecTag, NarrowInt};
use crate::hash::HashTable;
use crate::result::{Error, Result};
use crate::stream::{DataReader, DataWriter};
use crate::value::{self, Cell};

/// Inline string cells: the eight slot bytes cross the wire as text, never
/// byte-swapped.
#[derive(Debug, Clone, Default)]
pub(crate) struct Chars;

impl Chars {
    pub fn encode<W: Write>(&self, cell: Cell, out: &mut DataWriter<W>) -> Result<()> {
        out.write_bytes(&cell.inline_bytes())
    }

    pub fn decode<R: Read>(&self, src: &mut DataReader<R>) -> Result<Cell> {
        let mut bytes = [0u8; 8];
        src.read_bytes(&mut bytes)?;
        Ok(Cell::from_inline(bytes))
    }
}

/// Dictionary-coded strings. Ids ride a nested narrowed-integer codec; the
/// dictionary itself is written once per frame, after the column headers,
/// and decoding is one integer decode plus a dense-vector lookup.
#[derive(Debug, Clone)]
pub(crate) struct IntString {
    ids: NarrowInt,
    table: HashTable,
}

impl IntString {
    pub fn new(ids: NarrowInt, table: HashTable) -> Self {
        Self { ids, table }
    }

    pub fn table(&self) -> &HashTable {
        &self.table
    }

    pub fn save_params<W: Write>(&self, out: &mut DataWriter<W>) -> Result<()> {
        out.write_u8(self.ids.tag() as u8)?;
        self.ids.save_params(out)
    }

    pub fn load<R: Read>(src: &mut DataReader<R>) -> Result<Self> {
        let byte = src.read_u8()?;
        let ids = match CodecTag::from_wire(byte)? {
            CodecTag::Int8 => NarrowInt::load(src, 1, false)?,
            CodecTag::Int16 => NarrowInt::load(src, 2, false)?,
            CodecTag::Int32 => NarrowInt::load(src, 4, false)?,
            _ => {
                return Err(Error::FormatViolation(
                    "id stream must use a narrowed integer codec",
                ))
            }
        };
        Ok(Self::new(ids, HashTable::new()))
    }

    pub fn save_dictionary<W: Write>(&self, out: &mut DataWriter<W>) -> Result<()> {
        self.table.save(out)
    }

    pub fn load_dictionary<R: Read>(&mut self, src: &mut DataReader<R>) -> Result<()> {
        self.table = HashTable::load(src)?;
        Ok(())
    }

    pub fn id_width(&self) -> u8 {
        self.ids.width()
    }

    /// `text` overrides the cell's inline bytes when the full string does
    /// not fit the slot; the dictionary keys on the full text either way.
    pub fn encode<W: Write>(
        &self,
        cell: Cell,
        text: Option<&str>,
        out: &mut DataWriter<W>,
    ) -> Result<()> {
        let bytes = cell.inline_bytes();
        let resolved = match text {
            Some(text) => text,
            None => value::inline_str(&bytes)?,
        };
        let id = self
            .table
            .find_id(resolved)
            .ok_or(Error::FormatViolation("string missing from the frame dictionary"))?;
        self.ids.encode(Cell::from_i64(i64::from(id)), out)
    }

    pub fn decode<R: Read>(&self, src: &mut DataReader<R>) -> Result<Cell> {
        let id = self.ids.decode(src)?.to_i64();
        let text = self.table.get(id)?;
        Ok(value::inline_truncated(text))
    }
}
