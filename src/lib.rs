//! ColStream: columnar query results as Apache Arrow IPC streams.
//!
//! Takes pages of engine-native column blocks and serializes them into the
//! Arrow IPC Streaming format as a sequence of independently-producible byte
//! chunks, suitable for an HTTP chunked transfer. The output is one Schema
//! message, one RecordBatch message per page, and the end-of-stream marker,
//! readable by any Arrow IPC reader.

pub mod data;
pub mod encode;

// Re-export main types
pub use data::{Block, BoolBlock, BytesBlock, DoubleBlock, IntBlock, LongBlock, NullBlock, Page};
pub use encode::{ArrowResponse, BytesRecycler, Column, ReleasableBytes, ResponseChunk, CONTENT_TYPE};

/// Encoder error type
#[derive(Debug, thiserror::Error)]
pub enum ColStreamError {
    #[error("column type [{0}] is not supported by the Arrow format")]
    UnsupportedType(String),

    #[error("unsupported block shape: {0}")]
    UnsupportedBlockShape(String),

    #[error("variable-width column exceeds 2^31-1 content bytes")]
    OffsetOverflow,

    #[error("invalid value: {0}")]
    BadValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

pub type Result<T> = std::result::Result<T, ColStreamError>;
