use declio::ctx::Endian;

use crate::result::{Error, Result};

/// Magic marker opening every frame; the ODA literal of the legacy format,
/// padded to eight bytes.
pub(crate) const FRAME_MAGIC: [u8; 8] = *b"\xff\xffODA\x00\x00\x00";

/// Rows buffered per frame unless the writer is told otherwise.
pub const DEFAULT_ROWS_PER_FRAME: usize = 10000;

/// Bucket count of the per-frame intern table, the legacy prime.
pub(crate) const INTERN_BUCKETS: usize = 65537;

/// Longest accepted column name, in bytes.
pub(crate) const MAX_COLUMN_NAME: usize = 1024;

/// Default missing value for integer and bitfield columns.
pub const INTEGER_MISSING: f64 = 2147483647.0;

/// Default missing value for real and double columns.
pub const REAL_MISSING: f64 = -2147483647.0;

pub(crate) const HOST_ENDIAN: Endian = if cfg!(target_endian = "little") {
    Endian::Little
} else {
    Endian::Big
};

// Flag 0 is the format's reference order (what host-order writers emit on
// the dominant platforms), 1 its reverse.
pub(crate) fn byte_order_flag(endian: Endian) -> u8 {
    match endian {
        Endian::Little => 0,
        Endian::Big => 1,
    }
}

pub(crate) fn endian_for_flag(flag: u8) -> Result<Endian> {
    match flag {
        0 => Ok(Endian::Little),
        1 => Ok(Endian::Big),
        _ => Err(Error::FormatViolation("byte-order flag")),
    }
}
