use std::io;
use thiserror::Error;

use crate::types::FileType;

#[derive(Debug, Error)]
pub enum XdfError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    #[error("Unknown file type: {0}")]
    UnknownFileType(String),

    #[error("A file type is required when opening for writing")]
    FileTypeRequired,

    #[error("Writing {0} files is not implemented")]
    WriteUnsupported(FileType),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Physical min equals physical max")]
    PhysicalMinEqualsMax,

    #[error("Chunk ({start}, {end}) not within limits (0, {})", .total.saturating_sub(1))]
    ChunkOutOfRange { start: i64, end: i64, total: u64 },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Data has {actual} columns but the session declares {expected} channels")]
    ChannelCountMismatch { expected: usize, actual: usize },

    #[error("Channel descriptors have a fixed schema: no field named {0}")]
    FixedSchema(String),

    #[error("Wrong value type for channel field {field}")]
    FieldType { field: &'static str },

    #[error("Cannot change {0} after the first write")]
    Frozen(&'static str),

    #[error("Operation requires a session opened for {0}")]
    ModeMismatch(&'static str),

    #[error("Session is closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, XdfError>;
