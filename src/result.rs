use thiserror::Error;

pub type Result<A, E = Error> = std::result::Result<A, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoFailed(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    EncodingFailed(#[from] declio::Error),
    #[error("bad frame magic")]
    BadMagic,
    #[error("malformed frame: {0}")]
    FormatViolation(&'static str),
    #[error("unknown codec tag: {0}")]
    UnknownCodecTag(u8),
    #[error("codec parameter out of range: {0}")]
    CodecParamOutOfRange(&'static str),
    #[error("string id {id} outside dictionary of {size} entries")]
    InternIdOutOfRange { id: i64, size: i32 },
    #[error("frame ended before the byte count promised by its header")]
    UnexpectedEndOfFrame,
    #[error("row has {actual} cells, schema has {expected} columns")]
    SchemaMismatch { expected: usize, actual: usize },
}
