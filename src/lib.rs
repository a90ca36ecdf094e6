pub mod builders;
mod codec;
pub mod column;
mod constants;
mod frame;
mod hash;
pub mod reader;
pub mod result;
mod stream;
pub mod value;

pub use declio::ctx::Endian;

pub use builders::OdbWriter;
pub use codec::CodecTag;
pub use column::{BitField, BitfieldDef, Column, ColumnKind, Schema};
pub use constants::{DEFAULT_ROWS_PER_FRAME, INTEGER_MISSING, REAL_MISSING};
pub use reader::{FrameReader, OdbReader};
pub use result::{Error, Result};
pub use value::Cell;
