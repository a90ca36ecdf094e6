use std::io::{self, Read, Write};

use declio::ctx::Endian;
use declio::{Decode, Encode};

use crate::result::{Error, Result};

/// Byte-order-aware primitive reader over any byte source. The endianness is
/// fixed per frame; multibyte integers are interpreted through `declio` and
/// floats travel as integer bit patterns so one path handles swapping.
#[derive(Debug)]
pub(crate) struct DataReader<R> {
    inner: R,
    endian: Endian,
    consumed: u64,
}

impl<R: Read> DataReader<R> {
    pub fn new(inner: R, endian: Endian) -> Self {
        Self {
            inner,
            endian,
            consumed: 0,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        match self.inner.read_exact(&mut buf) {
            Ok(()) => {
                self.consumed += N as u64;
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::UnexpectedEndOfFrame),
            Err(e) => Err(e.into()),
        }
    }

    /// Fills `buf` entirely, or reports a clean end of stream when not even
    /// the first byte is available. Partial reads are truncation.
    pub fn read_bytes_or_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                self.consumed += filled as u64;
                return Err(Error::UnexpectedEndOfFrame);
            }
            filled += n;
        }
        self.consumed += filled as u64;
        Ok(true)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.fill::<1>()?[0])
    }

    #[allow(unused)]
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    #[allow(unused)]
    pub fn read_i16(&mut self) -> Result<i16> {
        let buf = self.fill::<2>()?;
        Ok(i16::decode(self.endian, &mut &buf[..])?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let buf = self.fill::<2>()?;
        Ok(u16::decode(self.endian, &mut &buf[..])?)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let buf = self.fill::<4>()?;
        Ok(i32::decode(self.endian, &mut &buf[..])?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let buf = self.fill::<4>()?;
        Ok(u32::decode(self.endian, &mut &buf[..])?)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let buf = self.fill::<8>()?;
        Ok(i64::decode(self.endian, &mut &buf[..])?)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let buf = self.fill::<8>()?;
        Ok(u64::decode(self.endian, &mut &buf[..])?)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.consumed += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::UnexpectedEndOfFrame),
            Err(e) => Err(e.into()),
        }
    }

    /// Length-prefixed string, the form used by column names and dictionary
    /// entries.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(Error::FormatViolation("negative string length"));
        }
        let mut buf = vec![0u8; len as usize];
        self.read_bytes(&mut buf)?;
        String::from_utf8(buf).map_err(|_| Error::FormatViolation("string is not valid UTF-8"))
    }

    pub fn skip(&mut self, count: u64) -> Result<()> {
        let copied = io::copy(&mut (&mut self.inner).take(count), &mut io::sink())?;
        self.consumed += copied;
        if copied != count {
            return Err(Error::UnexpectedEndOfFrame);
        }
        Ok(())
    }
}

/// Writing counterpart of [`DataReader`]; tracks the byte position so frame
/// back-links can be recorded without a seekable sink.
#[derive(Debug)]
pub(crate) struct DataWriter<W> {
    inner: W,
    endian: Endian,
    written: u64,
}

impl<W: Write> DataWriter<W> {
    pub fn new(inner: W, endian: Endian) -> Self {
        Self {
            inner,
            endian,
            written: 0,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn position(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        v.encode((), &mut self.inner)?;
        self.written += 1;
        Ok(())
    }

    #[allow(unused)]
    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        self.write_u8(v as u8)
    }

    #[allow(unused)]
    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        v.encode(self.endian, &mut self.inner)?;
        self.written += 2;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        v.encode(self.endian, &mut self.inner)?;
        self.written += 2;
        Ok(())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        v.encode(self.endian, &mut self.inner)?;
        self.written += 4;
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        v.encode(self.endian, &mut self.inner)?;
        self.written += 4;
        Ok(())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        v.encode(self.endian, &mut self.inner)?;
        self.written += 8;
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        v.encode(self.endian, &mut self.inner)?;
        self.written += 8;
        Ok(())
    }

    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.write_u32(v.to_bits())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.write_u64(v.to_bits())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    pub fn write_string(&mut self, text: &str) -> Result<()> {
        self.write_i32(text.len() as i32)?;
        self.write_bytes(text.as_bytes())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}
