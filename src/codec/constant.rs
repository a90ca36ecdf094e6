use std::io::{Read, Write};

use crate::result::{Error, Result};
use crate::stream::{DataReader, DataWriter};
use crate::value::{self, Cell};

/// Every row of the frame holds one identical value; the body is empty and
/// the value lives in the header.
#[derive(Debug, Clone)]
pub(crate) struct Constant {
    value: Cell,
}

impl Constant {
    pub fn new(value: Cell) -> Self {
        Self { value }
    }

    pub fn save_params<W: Write>(&self, out: &mut DataWriter<W>) -> Result<()> {
        out.write_i64(self.value.to_i64())
    }

    pub fn load<R: Read>(src: &mut DataReader<R>) -> Result<Self> {
        Ok(Self {
            value: Cell::from_i64(src.read_i64()?),
        })
    }

    pub fn decode(&self) -> Cell {
        self.value
    }
}

/// Constant string column; the text lives in the header, cells cost nothing.
#[derive(Debug, Clone)]
pub(crate) struct ConstantString {
    value: String,
    cell: Cell,
}

impl ConstantString {
    pub fn new(value: String) -> Self {
        let cell = value::inline_truncated(&value);
        Self { value, cell }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn save_params<W: Write>(&self, out: &mut DataWriter<W>) -> Result<()> {
        out.write_string(&self.value)
    }

    pub fn load<R: Read>(src: &mut DataReader<R>) -> Result<Self> {
        Ok(Self::new(src.read_string()?))
    }

    pub fn decode(&self) -> Cell {
        self.cell
    }
}

/// Long runs of identical values, emitted as `(run length, value)` pairs.
/// The selection algorithm never reaches it; it exists for frames produced
/// by other writers. Run counters live in the codec, not the row cursor.
#[derive(Debug, Clone)]
pub(crate) struct ConstantRle {
    value: Cell,
    rows: i32,
    pending: Option<(i32, Cell)>,
    run: i32,
    current: Cell,
}

impl ConstantRle {
    pub fn new(value: Cell, rows: i32) -> Self {
        Self {
            value,
            rows,
            pending: None,
            run: 0,
            current: Cell::ZERO,
        }
    }

    pub fn save_params<W: Write>(&self, out: &mut DataWriter<W>) -> Result<()> {
        out.write_i64(self.value.to_i64())?;
        out.write_i32(self.rows)
    }

    pub fn load<R: Read>(src: &mut DataReader<R>) -> Result<Self> {
        let value = Cell::from_i64(src.read_i64()?);
        let rows = src.read_i32()?;
        if rows < 0 {
            return Err(Error::FormatViolation("negative run-length row count"));
        }
        Ok(Self::new(value, rows))
    }

    pub fn encode<W: Write>(&mut self, cell: Cell, out: &mut DataWriter<W>) -> Result<()> {
        match &mut self.pending {
            Some((count, value)) if *value == cell => {
                *count += 1;
                Ok(())
            }
            Some((count, value)) => {
                let (count, value) = (*count, *value);
                self.pending = Some((1, cell));
                put(out, count, value)
            }
            None => {
                self.pending = Some((1, cell));
                Ok(())
            }
        }
    }

    /// Flushes the open run; the frame writer calls this once per sealed
    /// frame after the last row.
    pub fn finish<W: Write>(&mut self, out: &mut DataWriter<W>) -> Result<()> {
        match self.pending.take() {
            Some((count, value)) => put(out, count, value),
            None => Ok(()),
        }
    }

    pub fn decode<R: Read>(&mut self, src: &mut DataReader<R>) -> Result<Cell> {
        if self.run == 0 {
            let run = src.read_i32()?;
            if run <= 0 {
                return Err(Error::FormatViolation("non-positive run length"));
            }
            self.run = run;
            self.current = Cell::from_i64(src.read_i64()?);
        }
        self.run -= 1;
        Ok(self.current)
    }
}

fn put<W: Write>(out: &mut DataWriter<W>, count: i32, value: Cell) -> Result<()> {
    out.write_i32(count)?;
    out.write_i64(value.to_i64())
}
