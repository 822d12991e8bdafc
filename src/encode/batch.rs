//! Record-batch assembly and Arrow IPC message serialization.
//!
//! The batch header (field nodes, buffer table, body length) is computed from
//! size-only buffer descriptors before any payload byte exists; the body is
//! then streamed through a write channel that invokes the deferred writers in
//! order and pads to 8-byte boundaries against the running virtual position.
//! This keeps engine block memory out of Arrow-managed buffers while emitting
//! exactly the bytes a materialized writer would.

use arrow::datatypes::Schema;
use arrow::ipc;
use arrow::ipc::writer::{write_message, DictionaryTracker, EncodedData, IpcDataGenerator};
use bytes::{BufMut, BytesMut};
use flatbuffers::FlatBufferBuilder;

use super::convert::{BufWriter, BufferDescriptor};
use super::types::{write_options, Column};
use crate::data::Page;
use crate::Result;

/// Serialize the stream's Schema message.
pub(crate) fn write_schema(out: &mut BytesMut, columns: &[Column]) -> Result<()> {
    let schema = Schema::new(columns.iter().map(Column::arrow_field).collect::<Vec<_>>());
    let data_gen = IpcDataGenerator::default();
    let mut dict_tracker = DictionaryTracker::new(false);
    let encoded =
        data_gen.schema_to_bytes_with_dictionary_tracker(&schema, &mut dict_tracker, write_options());
    write_message((&mut *out).writer(), encoded, write_options())?;
    Ok(())
}

/// Serialize one page as a RecordBatch message.
pub(crate) fn write_record_batch(out: &mut BytesMut, columns: &[Column], page: &Page) -> Result<()> {
    let position_count = page.position_count();

    // Field nodes plus (descriptor, writer) pairs for every block, in column
    // order. Descriptors carry lengths only; writers produce the bytes later.
    let mut nodes: Vec<ipc::FieldNode> = Vec::with_capacity(page.block_count());
    let mut descriptors: Vec<BufferDescriptor> = Vec::with_capacity(page.block_count() * 3);
    let mut writers: Vec<BufWriter<'_>> = Vec::with_capacity(page.block_count() * 3);
    for (column, block) in columns.iter().zip(page.blocks()) {
        let converter = column.converter();
        nodes.push(ipc::FieldNode::new(
            block.position_count() as i64,
            converter.null_count(block) as i64,
        ));
        converter.convert(block, &mut descriptors, &mut writers)?;
    }
    debug_assert_eq!(descriptors.len(), writers.len());

    // Lay out the body from descriptor lengths alone: each buffer starts at
    // the previous end rounded up to 8, and the body ends on an 8-byte
    // boundary.
    let mut buffers: Vec<ipc::Buffer> = Vec::with_capacity(descriptors.len());
    let mut offset: i64 = 0;
    for descriptor in &descriptors {
        buffers.push(ipc::Buffer::new(offset, descriptor.length as i64));
        offset += descriptor.length as i64;
        offset += pad_len(offset as u64) as i64;
    }
    let body_length = offset;

    // Batch header flatbuffer, built the way the reference stream writer
    // builds it so the wire bytes match.
    let mut fbb = FlatBufferBuilder::new();
    let fb_buffers = fbb.create_vector(&buffers);
    let fb_nodes = fbb.create_vector(&nodes);
    let batch = {
        let mut builder = ipc::RecordBatchBuilder::new(&mut fbb);
        builder.add_length(position_count as i64);
        builder.add_nodes(fb_nodes);
        builder.add_buffers(fb_buffers);
        builder.finish()
    };
    let message = {
        let mut builder = ipc::MessageBuilder::new(&mut fbb);
        builder.add_version(ipc::MetadataVersion::V5);
        builder.add_header_type(ipc::MessageHeader::RecordBatch);
        builder.add_bodyLength(body_length);
        builder.add_header(batch.as_union_value());
        builder.finish()
    };
    fbb.finish(message, None);

    let encoded = EncodedData {
        ipc_message: fbb.finished_data().to_vec(),
        arrow_data: vec![],
    };
    write_message((&mut *out).writer(), encoded, write_options())?;

    // Stream the body: each writer must produce exactly its declared length,
    // then the channel pads to the next 8-byte boundary.
    let mut channel = WriteChannel::new(out);
    for (descriptor, writer) in descriptors.iter().zip(writers) {
        let written = channel.write_buffer(writer)?;
        debug_assert_eq!(written, descriptor.length, "buffer writer length mismatch");
        channel.align();
    }
    debug_assert_eq!(channel.position, body_length as u64, "body length mismatch");
    Ok(())
}

fn pad_len(position: u64) -> u64 {
    let trailing = position % 8;
    if trailing == 0 {
        0
    } else {
        8 - trailing
    }
}

/// Channel the deferred writers stream through. `position` is the virtual
/// body position: the sum of writer returns and padding, independent of
/// whatever framing preceded the body in the sink.
struct WriteChannel<'a> {
    out: &'a mut BytesMut,
    position: u64,
}

impl<'a> WriteChannel<'a> {
    fn new(out: &'a mut BytesMut) -> Self {
        Self { out, position: 0 }
    }

    fn write_buffer(&mut self, writer: BufWriter<'_>) -> Result<u64> {
        let written = writer(self.out)?;
        self.position += written;
        Ok(written)
    }

    /// Zero-pad to the next 8-byte boundary of the virtual position.
    fn align(&mut self) {
        let pad = pad_len(self.position);
        if pad > 0 {
            self.out.put_bytes(0, pad as usize);
            self.position += pad;
        }
    }
}
