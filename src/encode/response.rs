//! Chunked Arrow response: one Schema chunk, one chunk per page, one
//! end-of-stream chunk.
//!
//! The transport pulls chunks in order on its own thread; each pull fills a
//! fresh sink obtained from the recycler and hands it back as a releasable
//! byte reference. A failed encode recycles its sink and leaves the producer
//! terminal, so the stream is cut at a message boundary and never mid-write.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use log::debug;
use parking_lot::Mutex;

use super::batch::{write_record_batch, write_schema};
use super::types::{Column, CONTENT_TYPE};
use crate::data::Page;
use crate::Result;

/// A query result bound to its output columns, ready to stream.
#[derive(Debug, Clone)]
pub struct ArrowResponse {
    parts: Arc<ResponseParts>,
}

#[derive(Debug)]
struct ResponseParts {
    columns: Vec<Column>,
    pages: Vec<Page>,
}

impl ArrowResponse {
    /// Bind columns to result pages. Every page must carry one block per
    /// column.
    pub fn new(columns: Vec<Column>, pages: Vec<Page>) -> Self {
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(
                page.block_count(),
                columns.len(),
                "page {i} block count does not match the column list"
            );
        }
        debug!("arrow response: {} columns, {} pages", columns.len(), pages.len());
        Self { parts: Arc::new(ResponseParts { columns, pages }) }
    }

    pub fn columns(&self) -> &[Column] {
        &self.parts.columns
    }

    pub fn pages(&self) -> &[Page] {
        &self.parts.pages
    }

    /// The chunk producers for this response, in stream order:
    /// Schema, one per page, End.
    pub fn chunked_response(&self) -> Vec<ResponseChunk> {
        // TODO dictionaries
        let mut chunks = Vec::with_capacity(self.parts.pages.len() + 2);
        chunks.push(ResponseChunk::Schema(SchemaChunk {
            parts: Arc::clone(&self.parts),
            done: false,
        }));
        for index in 0..self.parts.pages.len() {
            chunks.push(ResponseChunk::Page(PageChunk {
                parts: Arc::clone(&self.parts),
                index,
                done: false,
            }));
        }
        chunks.push(ResponseChunk::End(EndChunk { done: false }));
        chunks
    }
}

/// One producer in the chunk sequence. Emits a single complete Arrow message
/// (or the end-of-stream marker) per `encode_chunk` call.
#[derive(Debug)]
pub enum ResponseChunk {
    Schema(SchemaChunk),
    Page(PageChunk),
    End(EndChunk),
}

#[derive(Debug)]
pub struct SchemaChunk {
    parts: Arc<ResponseParts>,
    done: bool,
}

#[derive(Debug)]
pub struct PageChunk {
    parts: Arc<ResponseParts>,
    index: usize,
    done: bool,
}

#[derive(Debug)]
pub struct EndChunk {
    done: bool,
}

impl ResponseChunk {
    pub fn is_done(&self) -> bool {
        match self {
            ResponseChunk::Schema(c) => c.done,
            ResponseChunk::Page(c) => c.done,
            ResponseChunk::End(c) => c.done,
        }
    }

    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }

    /// Encode this producer's message into a recycled sink.
    ///
    /// The producer is terminal after the call, on success and on error
    /// alike; a failed encode recycles the sink before propagating.
    /// `size_hint` is advisory and currently ignored.
    pub fn encode_chunk(&mut self, size_hint: usize, recycler: &BytesRecycler) -> Result<ReleasableBytes> {
        debug_assert!(!self.is_done(), "encode_chunk called on a finished producer");
        let _ = size_hint; // one message per chunk for now. kindness.

        let mut sink = recycler.obtain();
        let result = self.fill(&mut sink);
        self.mark_done();
        match result {
            Ok(()) => Ok(ReleasableBytes::new(sink, recycler.clone())),
            Err(e) => {
                recycler.recycle(sink);
                Err(e)
            }
        }
    }

    fn fill(&self, sink: &mut BytesMut) -> Result<()> {
        match self {
            ResponseChunk::Schema(c) => write_schema(sink, &c.parts.columns),
            ResponseChunk::Page(c) => {
                write_record_batch(sink, &c.parts.columns, &c.parts.pages[c.index])
            }
            ResponseChunk::End(_) => {
                // continuation sentinel plus a zero length
                sink.put_slice(&[0xff_u8; 4]);
                sink.put_i32_le(0);
                Ok(())
            }
        }
    }

    fn mark_done(&mut self) {
        match self {
            ResponseChunk::Schema(c) => c.done = true,
            ResponseChunk::Page(c) => c.done = true,
            ResponseChunk::End(c) => c.done = true,
        }
    }
}

/// Pool of chunk sinks, shared by cloning. Thread-safe, though each response
/// drives its pulls from a single thread at a time.
#[derive(Debug, Clone, Default)]
pub struct BytesRecycler {
    pool: Arc<Mutex<Vec<BytesMut>>>,
}

impl BytesRecycler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a cleared sink from the pool, or allocate a fresh one.
    pub fn obtain(&self) -> BytesMut {
        self.pool.lock().pop().unwrap_or_default()
    }

    /// Return a sink to the pool.
    pub fn recycle(&self, mut sink: BytesMut) {
        sink.clear();
        self.pool.lock().push(sink);
    }

    /// Number of sinks currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.pool.lock().len()
    }
}

/// A produced chunk: a contiguous byte range plus a single-shot release hook
/// that returns the backing sink to its recycler. Dropping an unreleased
/// chunk releases it, so transport abandonment cannot leak pool buffers.
#[derive(Debug)]
pub struct ReleasableBytes {
    sink: Option<BytesMut>,
    recycler: BytesRecycler,
}

impl ReleasableBytes {
    fn new(sink: BytesMut, recycler: BytesRecycler) -> Self {
        Self { sink: Some(sink), recycler }
    }

    pub fn as_slice(&self) -> &[u8] {
        self.sink.as_deref().unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the backing sink to the recycler.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if let Some(sink) = self.sink.take() {
            self.recycler.recycle(sink);
        }
    }
}

impl AsRef<[u8]> for ReleasableBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Drop for ReleasableBytes {
    fn drop(&mut self) {
        self.release_once();
    }
}
