use std::io::Read;

use declio::ctx::Endian;
use tracing::{debug, trace};

use crate::codec::{Codec, CodecTag};
use crate::column::Schema;
use crate::constants::{endian_for_flag, FRAME_MAGIC, HOST_ENDIAN};
use crate::frame::{read_column, FrameHead};
use crate::result::{Error, Result};
use crate::stream::DataReader;
use crate::value::Cell;

/// Forward cursor over one frame: parses the header on `open`, then
/// materialises one row at a time into a caller-owned buffer.
#[derive(Debug)]
pub struct FrameReader<R> {
    rd: DataReader<R>,
    schema: Schema,
    codecs: Vec<Codec>,
    row_count: i32,
    rows_read: i32,
    previous_frame_offset: i64,
    row_width: Option<u64>,
}

impl<R: Read> FrameReader<R> {
    /// Reads a frame header from `source`. `Ok(None)` is a clean end of
    /// stream before the magic; anything else that cuts short is an error.
    pub fn open(source: R) -> Result<Option<Self>> {
        let mut rd = DataReader::new(source, HOST_ENDIAN);
        let mut magic = [0u8; 8];
        if !rd.read_bytes_or_eof(&mut magic)? {
            return Ok(None);
        }
        if magic != FRAME_MAGIC {
            return Err(Error::BadMagic);
        }
        let endian = endian_for_flag(rd.read_u8()?)?;
        rd.set_endian(endian);

        let head = FrameHead::read(&mut rd)?;
        let mark = rd.bytes_consumed();
        let mut columns = Vec::with_capacity(head.column_count.min(4096) as usize);
        let mut codecs = Vec::with_capacity(head.column_count.min(4096) as usize);
        for _ in 0..head.column_count {
            let (column, codec) = read_column(&mut rd)?;
            columns.push(column);
            codecs.push(codec);
        }
        for (codec, column) in codecs.iter_mut().zip(&columns) {
            codec.load_dictionary(&mut rd)?;
            if let Some(table) = codec.dictionary() {
                trace!(column = %column.name(), entries = table.len(), "dictionary loaded");
            }
        }
        if rd.bytes_consumed() - mark != head.header_length as u64 {
            return Err(Error::FormatViolation("header length does not match its contents"));
        }

        let row_width = codecs
            .iter()
            .try_fold(0u64, |acc, codec| codec.cell_width().map(|w| acc + w));
        debug!(rows = head.row_count, columns = columns.len(), "frame opened");
        Ok(Some(Self {
            rd,
            schema: Schema::new(columns),
            codecs,
            row_count: head.row_count,
            rows_read: 0,
            previous_frame_offset: head.previous_frame_offset,
            row_width,
        }))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Byte order the frame was written in, from its header flag.
    pub fn byte_order(&self) -> Endian {
        self.rd.endian()
    }

    pub fn row_count(&self) -> u64 {
        self.row_count as u64
    }

    /// Back-link to the previous frame's byte offset, `-1` for the first.
    pub fn previous_frame_offset(&self) -> i64 {
        self.previous_frame_offset
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.rd.bytes_consumed()
    }

    /// Codec chosen for a column in this frame.
    pub fn codec_tag(&self, column: usize) -> Option<CodecTag> {
        self.codecs.get(column).map(Codec::tag)
    }

    /// Dense id → text dictionary of an interned string column; the side
    /// channel for texts longer than the eight inline bytes.
    pub fn dictionary(&self, column: usize) -> Option<&[String]> {
        self.codecs.get(column)?.dictionary().map(|t| t.strings())
    }

    /// Decodes the next row into `row`, one cell per column in declaration
    /// order. Returns `false` once the header's row count is exhausted.
    pub fn next_row(&mut self, row: &mut [Cell]) -> Result<bool> {
        if self.rows_read == self.row_count {
            return Ok(false);
        }
        if row.len() != self.schema.width() {
            return Err(Error::SchemaMismatch {
                expected: self.schema.width(),
                actual: row.len(),
            });
        }
        for (slot, codec) in row.iter_mut().zip(&mut self.codecs) {
            *slot = codec.decode(&mut self.rd)?;
        }
        self.rows_read += 1;
        Ok(true)
    }

    /// Advances past the remaining rows; by byte count when every codec has
    /// a fixed width, decoding otherwise.
    pub fn skip_to_end(&mut self) -> Result<()> {
        let remaining = (self.row_count - self.rows_read) as u64;
        if remaining == 0 {
            return Ok(());
        }
        match self.row_width {
            Some(width) => {
                self.rd.skip(remaining * width)?;
                self.rows_read = self.row_count;
                Ok(())
            }
            None => {
                let mut scratch = vec![Cell::ZERO; self.schema.width()];
                while self.next_row(&mut scratch)? {}
                Ok(())
            }
        }
    }

    pub(crate) fn into_source(self) -> R {
        self.rd.into_inner()
    }
}

/// Lazy, forward-only sequence of frames over a byte stream. Advancing
/// auto-skips whatever the consumer left unread and flags schema changes
/// before any row of the new frame is produced.
#[derive(Debug)]
pub struct OdbReader<R> {
    source: Option<R>,
    current: Option<FrameReader<R>>,
    last_schema: Option<Schema>,
    schema_changed: bool,
    position: u64,
}

impl<R: Read> OdbReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source: Some(source),
            current: None,
            last_schema: None,
            schema_changed: false,
            position: 0,
        }
    }

    /// Opens the next frame, returning `false` at end of stream.
    pub fn next_frame(&mut self) -> Result<bool> {
        if let Some(mut frame) = self.current.take() {
            frame.skip_to_end()?;
            self.position += frame.bytes_consumed();
            self.source = Some(frame.into_source());
        }
        let source = match self.source.take() {
            Some(source) => source,
            None => return Ok(false),
        };
        match FrameReader::open(source)? {
            None => Ok(false),
            Some(frame) => {
                self.schema_changed = self.last_schema.as_ref() != Some(frame.schema());
                self.last_schema = Some(frame.schema().clone());
                self.current = Some(frame);
                Ok(true)
            }
        }
    }

    /// Schema of the current frame.
    pub fn schema(&self) -> Option<&Schema> {
        self.current.as_ref().map(FrameReader::schema)
    }

    /// Whether the last `next_frame` brought a schema differing from the
    /// previous frame's; the consumer's re-binding point.
    pub fn schema_changed(&self) -> bool {
        self.schema_changed
    }

    pub fn next_row(&mut self, row: &mut [Cell]) -> Result<bool> {
        match &mut self.current {
            Some(frame) => frame.next_row(row),
            None => Ok(false),
        }
    }

    pub fn frame(&self) -> Option<&FrameReader<R>> {
        self.current.as_ref()
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.position + self.current.as_ref().map_or(0, FrameReader::bytes_consumed)
    }
}
