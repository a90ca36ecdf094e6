use std::io::{self, Write};

use declio::ctx::Endian;
use tracing::debug;

use crate::codec::{Codec, ColumnStats};
use crate::column::{ColumnKind, Schema};
use crate::constants::{byte_order_flag, DEFAULT_ROWS_PER_FRAME, FRAME_MAGIC, HOST_ENDIAN};
use crate::frame::{write_column, FrameHead};
use crate::result::{Error, Result};
use crate::stream::DataWriter;
use crate::value::{self, Cell};

/// Stream writer: buffers rows and seals them into self-describing frames,
/// renegotiating a codec per column from each batch. Frames never come out
/// partial; a failure while one is being emitted poisons the sink and every
/// later call reports an I/O error.
#[derive(Debug)]
pub struct OdbWriter<W: Write> {
    out: DataWriter<W>,
    schema: Option<Schema>,
    rows_per_frame: usize,
    rows: Vec<Cell>,
    texts: Vec<Option<String>>,
    buffered: usize,
    previous_frame: i64,
    poisoned: bool,
}

impl<W: Write> OdbWriter<W> {
    /// Writer in the host's byte order.
    pub fn new(sink: W) -> Self {
        Self::with_byte_order(sink, HOST_ENDIAN)
    }

    /// Writer with an explicit byte order, for tooling that re-emits frames
    /// in the reversed order.
    pub fn with_byte_order(sink: W, endian: Endian) -> Self {
        Self {
            out: DataWriter::new(sink, endian),
            schema: None,
            rows_per_frame: DEFAULT_ROWS_PER_FRAME,
            rows: Vec::new(),
            texts: Vec::new(),
            buffered: 0,
            previous_frame: -1,
            poisoned: false,
        }
    }

    /// Starts (or switches to) a schema. A schema change forces a frame
    /// boundary: buffered rows are sealed under the old schema first.
    pub fn begin(&mut self, schema: Schema, rows_per_frame: usize) -> Result<()> {
        self.check()?;
        if self.buffered > 0 {
            self.flush_frame()?;
        }
        self.schema = Some(schema);
        self.rows_per_frame = rows_per_frame.max(1);
        Ok(())
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Bytes emitted so far; frame back-links are offsets into this count.
    pub fn position(&self) -> u64 {
        self.out.position()
    }

    /// Buffers one row of cells, sealing a frame when the batch is full.
    pub fn write_row(&mut self, row: &[Cell]) -> Result<()> {
        self.write_row_with_strings(row, &[])
    }

    /// [`write_row`](Self::write_row) plus the caller-buffer side channel
    /// for string columns: a `Some` entry carries that cell's full text,
    /// which may exceed the eight inline bytes. Long texts go through the
    /// frame dictionary and the slot keeps the eight-byte prefix.
    pub fn write_row_with_strings(&mut self, row: &[Cell], texts: &[Option<&str>]) -> Result<()> {
        self.check()?;
        let schema = match &self.schema {
            Some(schema) => schema,
            None => return Err(Error::FormatViolation("row written before a schema was begun")),
        };
        if row.len() != schema.width() {
            return Err(Error::SchemaMismatch {
                expected: schema.width(),
                actual: row.len(),
            });
        }
        if !texts.is_empty() && texts.len() != row.len() {
            return Err(Error::FormatViolation("side-channel length must match the row"));
        }
        for (text, column) in texts.iter().zip(schema.columns()) {
            if text.is_some() && *column.kind() != ColumnKind::String {
                return Err(Error::FormatViolation("side-channel text on a non-string column"));
            }
        }
        for (i, &cell) in row.iter().enumerate() {
            match texts.get(i).copied().flatten() {
                Some(text) => {
                    self.rows.push(value::inline_truncated(text));
                    self.texts.push(Some(text.to_owned()));
                }
                None => {
                    self.rows.push(cell);
                    self.texts.push(None);
                }
            }
        }
        self.buffered += 1;
        if self.buffered >= self.rows_per_frame {
            self.flush_frame()?;
        }
        Ok(())
    }

    /// Seals the buffered batch as one frame. Called explicitly this also
    /// emits an empty frame, which reads back as an empty iteration.
    pub fn flush_frame(&mut self) -> Result<()> {
        self.check()?;
        let schema = match &self.schema {
            Some(schema) => schema.clone(),
            None => return Err(Error::FormatViolation("no schema to seal a frame under")),
        };
        // Pass 1 observes the batch and writes nothing.
        let (codecs, header) = self.prepare(&schema)?;
        let emitted = self.emit(&schema, codecs, &header);
        if emitted.is_err() {
            self.poisoned = true;
            return emitted;
        }
        self.rows.clear();
        self.texts.clear();
        self.buffered = 0;
        Ok(())
    }

    /// Seals any partial batch and hands the sink back.
    pub fn close(mut self) -> Result<W> {
        self.check()?;
        if self.buffered > 0 {
            self.flush_frame()?;
        }
        let mut out = self.out;
        out.flush()?;
        Ok(out.into_inner())
    }

    fn check(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::IoFailed(io::Error::new(
                io::ErrorKind::Other,
                "writer poisoned by an earlier failure",
            )));
        }
        Ok(())
    }

    /// Scans the buffered cells per column, picks the codecs and serialises
    /// the schema-plus-dictionaries section into memory.
    fn prepare(&self, schema: &Schema) -> Result<(Vec<Codec>, Vec<u8>)> {
        let columns = schema.columns();
        let width = schema.width();

        let mut stats: Vec<ColumnStats> = columns.iter().map(|_| ColumnStats::new()).collect();
        for row in 0..self.buffered {
            let cells = &self.rows[row * width..(row + 1) * width];
            let texts = &self.texts[row * width..(row + 1) * width];
            for (((column, stat), &cell), text) in
                columns.iter().zip(&mut stats).zip(cells).zip(texts)
            {
                stat.observe(column, cell, text.as_deref())?;
            }
        }
        let codecs: Vec<Codec> = columns
            .iter()
            .zip(&stats)
            .map(|(column, stat)| stat.select(column))
            .collect::<Result<_>>()?;

        let mut header = DataWriter::new(Vec::new(), self.out.endian());
        for (column, codec) in columns.iter().zip(&codecs) {
            write_column(&mut header, column, codec)?;
        }
        for codec in &codecs {
            codec.save_dictionary(&mut header)?;
        }
        Ok((codecs, header.into_inner()))
    }

    /// Pass 2: magic, byte-order flag, fixed fields, the prepared header
    /// section, then the body row by row with exactly the widths the header
    /// promises.
    fn emit(&mut self, schema: &Schema, mut codecs: Vec<Codec>, header: &[u8]) -> Result<()> {
        let width = schema.width();
        let start = self.out.position();
        let flag = byte_order_flag(self.out.endian());
        self.out.write_bytes(&FRAME_MAGIC)?;
        self.out.write_u8(flag)?;
        FrameHead {
            header_length: header.len() as i32,
            previous_frame_offset: self.previous_frame,
            row_count: self.buffered as i32,
            column_count: width as i32,
        }
        .write(&mut self.out)?;
        self.out.write_bytes(header)?;

        for row in 0..self.buffered {
            let cells = &self.rows[row * width..(row + 1) * width];
            let texts = &self.texts[row * width..(row + 1) * width];
            for ((codec, &cell), text) in codecs.iter_mut().zip(cells).zip(texts) {
                codec.encode(cell, text.as_deref(), &mut self.out)?;
            }
        }
        for codec in &mut codecs {
            codec.finish(&mut self.out)?;
        }
        debug!(
            rows = self.buffered,
            bytes = self.out.position() - start,
            "frame sealed"
        );
        self.previous_frame = start as i64;
        Ok(())
    }
}
