//! Arrow IPC stream encoding for query result pages.
//!
//! Layout mirrors the wire format: `values` holds the per-row conversions,
//! `convert` the per-type block converters, `batch` the record-batch
//! assembler, `response` the chunked producers, and `types` the logical type
//! registry and schema binding.

pub mod batch;
pub mod convert;
pub mod response;
pub mod types;
pub mod values;


pub use response::{ArrowResponse, BytesRecycler, ReleasableBytes, ResponseChunk};
pub use types::{Column, CONTENT_TYPE};
