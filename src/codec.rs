use std::io::{Read, Write};

use modular_bitfield::prelude::*;
use tracing::debug;

use crate::column::{Column, ColumnKind};
use crate::hash::HashTable;
use crate::result::{Error, Result};
use crate::stream::{DataReader, DataWriter};
use crate::value::{self, Cell};

mod constant;
mod integer;
mod real;
mod string;

pub(crate) use constant::{Constant, ConstantRle, ConstantString};
pub(crate) use integer::NarrowInt;
pub(crate) use real::{LongReal, ShortReal};
pub(crate) use string::{Chars, IntString};

/// Wire tags of the codec catalogue; the numbering is part of the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[bits = 8]
pub enum CodecTag {
    Constant = 0,
    ConstantString = 1,
    ConstantRle = 2,
    Int8 = 3,
    Int16 = 4,
    Int32 = 5,
    Int8Missing = 6,
    Int16Missing = 7,
    Int32Missing = 8,
    LongReal = 9,
    ShortReal = 10,
    ShortReal2 = 11,
    Chars = 12,
    IntString = 13,
}

impl CodecTag {
    pub(crate) fn from_wire(byte: u8) -> Result<Self> {
        <CodecTag as Specifier>::from_bytes(byte).map_err(|_| Error::UnknownCodecTag(byte))
    }

    pub fn name(&self) -> &'static str {
        match self {
            CodecTag::Constant => "const",
            CodecTag::ConstantString => "const_string",
            CodecTag::ConstantRle => "const_rle",
            CodecTag::Int8 => "i8",
            CodecTag::Int16 => "i16",
            CodecTag::Int32 => "i32",
            CodecTag::Int8Missing => "i8_missing",
            CodecTag::Int16Missing => "i16_missing",
            CodecTag::Int32Missing => "i32_missing",
            CodecTag::LongReal => "long_real",
            CodecTag::ShortReal => "short_real",
            CodecTag::ShortReal2 => "short_real2",
            CodecTag::Chars => "chars",
            CodecTag::IntString => "int_string",
        }
    }

    fn applies_to(self, kind: ColumnKind) -> bool {
        match self {
            CodecTag::Constant | CodecTag::ConstantRle => true,
            CodecTag::ConstantString | CodecTag::Chars | CodecTag::IntString => {
                kind == ColumnKind::String
            }
            CodecTag::Int8
            | CodecTag::Int16
            | CodecTag::Int32
            | CodecTag::Int8Missing
            | CodecTag::Int16Missing
            | CodecTag::Int32Missing => matches!(
                kind,
                ColumnKind::Integer | ColumnKind::Bitfield | ColumnKind::Ignore
            ),
            CodecTag::LongReal => matches!(
                kind,
                ColumnKind::Double | ColumnKind::Integer | ColumnKind::Bitfield | ColumnKind::Ignore
            ),
            CodecTag::ShortReal | CodecTag::ShortReal2 => kind == ColumnKind::Real,
        }
    }
}

/// One column's encoder/decoder for one frame. Closed set, dispatched by
/// match; state such as run counters lives inside the variant.
#[derive(Debug, Clone)]
pub(crate) enum Codec {
    Constant(Constant),
    ConstantString(ConstantString),
    ConstantRle(ConstantRle),
    NarrowInt(NarrowInt),
    LongReal(LongReal),
    ShortReal(ShortReal),
    Chars(Chars),
    IntString(IntString),
}

impl Codec {
    pub fn tag(&self) -> CodecTag {
        match self {
            Codec::Constant(_) => CodecTag::Constant,
            Codec::ConstantString(_) => CodecTag::ConstantString,
            Codec::ConstantRle(_) => CodecTag::ConstantRle,
            Codec::NarrowInt(c) => c.tag(),
            Codec::LongReal(_) => CodecTag::LongReal,
            Codec::ShortReal(c) => c.tag(),
            Codec::Chars(_) => CodecTag::Chars,
            Codec::IntString(_) => CodecTag::IntString,
        }
    }

    /// Encoded width of one cell; `None` when the body is run-length framed
    /// rather than rectangular.
    pub fn cell_width(&self) -> Option<u64> {
        match self {
            Codec::Constant(_) | Codec::ConstantString(_) => Some(0),
            Codec::ConstantRle(_) => None,
            Codec::NarrowInt(c) => Some(u64::from(c.width())),
            Codec::LongReal(_) => Some(8),
            Codec::ShortReal(_) => Some(4),
            Codec::Chars(_) => Some(8),
            Codec::IntString(c) => Some(u64::from(c.id_width())),
        }
    }

    /// Tag byte plus the parameters chosen at writer-prepare time.
    pub fn save_header<W: Write>(&self, out: &mut DataWriter<W>) -> Result<()> {
        out.write_u8(self.tag() as u8)?;
        match self {
            Codec::Constant(c) => c.save_params(out),
            Codec::ConstantString(c) => c.save_params(out),
            Codec::ConstantRle(c) => c.save_params(out),
            Codec::NarrowInt(c) => c.save_params(out),
            Codec::LongReal(_) | Codec::Chars(_) => Ok(()),
            Codec::ShortReal(c) => c.save_params(out),
            Codec::IntString(c) => c.save_params(out),
        }
    }

    pub fn load<R: Read>(src: &mut DataReader<R>, column: &Column) -> Result<Self> {
        let byte = src.read_u8()?;
        let tag = CodecTag::from_wire(byte)?;
        if !tag.applies_to(*column.kind()) {
            return Err(Error::FormatViolation("codec tag does not match column kind"));
        }
        Ok(match tag {
            CodecTag::Constant => Codec::Constant(Constant::load(src)?),
            CodecTag::ConstantString => Codec::ConstantString(ConstantString::load(src)?),
            CodecTag::ConstantRle => Codec::ConstantRle(ConstantRle::load(src)?),
            CodecTag::Int8 => Codec::NarrowInt(NarrowInt::load(src, 1, false)?),
            CodecTag::Int16 => Codec::NarrowInt(NarrowInt::load(src, 2, false)?),
            CodecTag::Int32 => Codec::NarrowInt(NarrowInt::load(src, 4, false)?),
            CodecTag::Int8Missing => Codec::NarrowInt(NarrowInt::load(src, 1, true)?),
            CodecTag::Int16Missing => Codec::NarrowInt(NarrowInt::load(src, 2, true)?),
            CodecTag::Int32Missing => Codec::NarrowInt(NarrowInt::load(src, 4, true)?),
            CodecTag::LongReal => Codec::LongReal(LongReal),
            CodecTag::ShortReal => Codec::ShortReal(ShortReal::load(src, false)?),
            CodecTag::ShortReal2 => Codec::ShortReal(ShortReal::load(src, true)?),
            CodecTag::Chars => Codec::Chars(Chars),
            CodecTag::IntString => Codec::IntString(IntString::load(src)?),
        })
    }

    /// Encodes one cell. `text` is the side channel for string columns: the
    /// cell's full text when it exceeds the eight inline bytes.
    pub fn encode<W: Write>(
        &mut self,
        cell: Cell,
        text: Option<&str>,
        out: &mut DataWriter<W>,
    ) -> Result<()> {
        match self {
            Codec::Constant(_) | Codec::ConstantString(_) => Ok(()),
            Codec::ConstantRle(c) => c.encode(cell, out),
            Codec::NarrowInt(c) => c.encode(cell, out),
            Codec::LongReal(c) => c.encode(cell, out),
            Codec::ShortReal(c) => c.encode(cell, out),
            Codec::Chars(c) => c.encode(cell, out),
            Codec::IntString(c) => c.encode(cell, text, out),
        }
    }

    /// Flushes any state the codec held back, after the frame's last row.
    pub fn finish<W: Write>(&mut self, out: &mut DataWriter<W>) -> Result<()> {
        match self {
            Codec::ConstantRle(c) => c.finish(out),
            _ => Ok(()),
        }
    }

    pub fn decode<R: Read>(&mut self, src: &mut DataReader<R>) -> Result<Cell> {
        match self {
            Codec::Constant(c) => Ok(c.decode()),
            Codec::ConstantString(c) => Ok(c.decode()),
            Codec::ConstantRle(c) => c.decode(src),
            Codec::NarrowInt(c) => c.decode(src),
            Codec::LongReal(c) => c.decode(src),
            Codec::ShortReal(c) => c.decode(src),
            Codec::Chars(c) => c.decode(src),
            Codec::IntString(c) => c.decode(src),
        }
    }

    pub fn dictionary(&self) -> Option<&HashTable> {
        match self {
            Codec::IntString(c) => Some(c.table()),
            _ => None,
        }
    }

    pub fn save_dictionary<W: Write>(&self, out: &mut DataWriter<W>) -> Result<()> {
        match self {
            Codec::IntString(c) => c.save_dictionary(out),
            _ => Ok(()),
        }
    }

    pub fn load_dictionary<R: Read>(&mut self, src: &mut DataReader<R>) -> Result<()> {
        match self {
            Codec::IntString(c) => c.load_dictionary(src),
            _ => Ok(()),
        }
    }
}

/// Per-column observation state for the writer's first pass. Gathers the
/// range, the missing flag, and the frame dictionary without touching the
/// byte sink.
pub(crate) struct ColumnStats {
    rows: u64,
    first: Option<Cell>,
    first_text: Option<String>,
    all_equal: bool,
    all_inline: bool,
    min: i64,
    max: i64,
    have_range: bool,
    missing_seen: bool,
    table: HashTable,
}

impl ColumnStats {
    pub fn new() -> Self {
        Self {
            rows: 0,
            first: None,
            first_text: None,
            all_equal: true,
            all_inline: true,
            min: 0,
            max: 0,
            have_range: false,
            missing_seen: false,
            table: HashTable::new(),
        }
    }

    /// `text` carries a string cell's full text when it exceeds the eight
    /// inline bytes. Strings compare by text, not by slot prefix, so two
    /// long texts sharing a prefix never collapse into a constant.
    pub fn observe(&mut self, column: &Column, cell: Cell, text: Option<&str>) -> Result<()> {
        self.rows += 1;
        if *column.kind() == ColumnKind::String {
            let bytes = cell.inline_bytes();
            let resolved = match text {
                Some(text) => text,
                None => value::inline_str(&bytes)?,
            };
            match &self.first_text {
                None => self.first_text = Some(resolved.to_owned()),
                Some(first) if first.as_str() != resolved => self.all_equal = false,
                _ => {}
            }
            if resolved.len() > 8 {
                self.all_inline = false;
            }
            self.table.store(resolved);
            return Ok(());
        }
        match self.first {
            None => self.first = Some(cell),
            Some(first) if first != cell => self.all_equal = false,
            _ => {}
        }
        if column.is_missing(cell) {
            self.missing_seen = true;
            return Ok(());
        }
        match column.kind() {
            ColumnKind::Integer | ColumnKind::Bitfield | ColumnKind::Ignore => {
                let v = cell.to_i64();
                if self.have_range {
                    self.min = self.min.min(v);
                    self.max = self.max.max(v);
                } else {
                    self.min = v;
                    self.max = v;
                    self.have_range = true;
                }
            }
            ColumnKind::Real | ColumnKind::Double | ColumnKind::String => {}
        }
        Ok(())
    }

    /// Per-frame selection: constants first, then dictionaries for strings,
    /// then the narrowest integer width whose range fits, the top value
    /// reserved iff missings were seen.
    pub fn select(&self, column: &Column) -> Result<Codec> {
        let codec = self.choose(column)?;
        debug!(
            column = %column.name(),
            codec = codec.tag().name(),
            rows = self.rows,
            "codec selected"
        );
        Ok(codec)
    }

    fn choose(&self, column: &Column) -> Result<Codec> {
        if self.all_equal {
            return Ok(match column.kind() {
                ColumnKind::String => {
                    Codec::ConstantString(ConstantString::new(
                        self.first_text.clone().unwrap_or_default(),
                    ))
                }
                _ => Codec::Constant(Constant::new(self.first.unwrap_or(Cell::ZERO))),
            });
        }
        Ok(match column.kind() {
            ColumnKind::String => {
                // `chars` needs every value inline; a single long text
                // forces the dictionary route.
                let distinct = self.table.len() as u64;
                if self.all_inline && distinct * 4 > self.rows * 8 {
                    Codec::Chars(Chars)
                } else {
                    let ids = narrow_for_ids(self.table.len());
                    Codec::IntString(IntString::new(ids, self.table.clone()))
                }
            }
            ColumnKind::Real => Codec::ShortReal(ShortReal::new(
                self.missing_seen.then(|| *column.missing_value() as f32),
            )),
            ColumnKind::Double => Codec::LongReal(LongReal),
            ColumnKind::Integer | ColumnKind::Bitfield | ColumnKind::Ignore => {
                // A column of nothing but missing values still needs a range.
                let (min, max) = if self.have_range {
                    (self.min, self.max)
                } else {
                    (column.missing_as_i64(), column.missing_as_i64())
                };
                let missing = self.missing_seen.then(|| column.missing_as_i64());
                match max.checked_sub(min) {
                    Some(range) if fits(range, 1, self.missing_seen) => {
                        Codec::NarrowInt(NarrowInt::new(1, min, missing))
                    }
                    Some(range) if fits(range, 2, self.missing_seen) => {
                        Codec::NarrowInt(NarrowInt::new(2, min, missing))
                    }
                    Some(range) if fits(range, 4, self.missing_seen) => {
                        Codec::NarrowInt(NarrowInt::new(4, min, missing))
                    }
                    // Too wide for the narrowed family: ship the raw slot.
                    _ => Codec::LongReal(LongReal),
                }
            }
        })
    }
}

fn fits(range: i64, width: u8, reserve: bool) -> bool {
    let top: u64 = match width {
        1 => u64::from(u8::MAX),
        2 => u64::from(u16::MAX),
        _ => u64::from(u32::MAX),
    };
    range as u64 <= top - u64::from(reserve)
}

// Ids are dense from zero, so the reference is zero and the width follows
// the dictionary size alone.
fn narrow_for_ids(distinct: i32) -> NarrowInt {
    let max = (distinct as u64).saturating_sub(1);
    let width = if max <= u64::from(u8::MAX) {
        1
    } else if max <= u64::from(u16::MAX) {
        2
    } else {
        4
    };
    NarrowInt::new(width, 0, None)
}
