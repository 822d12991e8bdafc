//! Per-type block converters.
//!
//! A converter declares the Arrow field type for its logical type, counts
//! nulls in a block, and appends `(descriptor, writer)` pairs to a record
//! batch under construction. Descriptors carry only byte lengths so the batch
//! header can be computed up front; the paired writers later stream the actual
//! payload straight from the block into the chunk sink.

use std::borrow::Cow;

use arrow::datatypes::DataType;
use bytes::{BufMut, BytesMut};
use log::warn;

use super::values;
use crate::data::Block;
use crate::{ColStreamError, Result};

/// Size-only stand-in for an Arrow body buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferDescriptor {
    pub(crate) length: u64,
}

/// Deferred payload writer. Returns the number of bytes written, which must
/// equal the paired descriptor's length.
pub(crate) type BufWriter<'a> = Box<dyn FnOnce(&mut BytesMut) -> Result<u64> + 'a>;

/// Value transform applied to each cell of a variable-width column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueTransform {
    ShortenIp,
    VersionToString,
    SourceToJson,
}

impl ValueTransform {
    fn apply<'a>(&self, raw: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match self {
            ValueTransform::ShortenIp => Ok(Cow::Borrowed(values::shorten_ip(raw))),
            ValueTransform::VersionToString => values::version_to_string(raw).map(Cow::Borrowed),
            ValueTransform::SourceToJson => values::source_to_json(raw).map(Cow::Owned),
        }
    }
}

/// Cell bytes after the optional transform. A rejected value becomes an empty
/// cell; the row itself stays valid.
fn cell_bytes<'a>(transform: Option<ValueTransform>, raw: &'a [u8]) -> Cow<'a, [u8]> {
    let Some(transform) = transform else {
        return Cow::Borrowed(raw);
    };
    match transform.apply(raw) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("emitting empty cell for value rejected by {transform:?}: {e}");
            Cow::Borrowed(&[])
        }
    }
}

/// Converter for one logical column type. A closed set: the registry in
/// `types.rs` owns the name → converter mapping.
#[derive(Debug, Clone)]
pub(crate) enum BlockConverter {
    /// `null` / `unsupported`: no buffers, every position null.
    Null,
    /// Bit-packed boolean values.
    Bool,
    /// 4-byte little-endian values.
    Int32,
    /// 8-byte little-endian values; the Arrow type distinguishes
    /// long / unsigned_long / date payloads.
    Int64(DataType),
    /// 8-byte IEEE-754 values.
    Float64,
    /// Variable-width values with 32-bit offsets and an optional per-cell
    /// transform.
    Bytes {
        dtype: DataType,
        transform: Option<ValueTransform>,
    },
}

impl BlockConverter {
    /// Arrow type this converter declares in the schema.
    pub(crate) fn arrow_field_type(&self) -> DataType {
        match self {
            BlockConverter::Null => DataType::Null,
            BlockConverter::Bool => DataType::Boolean,
            BlockConverter::Int32 => DataType::Int32,
            BlockConverter::Int64(dtype) => dtype.clone(),
            BlockConverter::Float64 => DataType::Float64,
            BlockConverter::Bytes { dtype, .. } => dtype.clone(),
        }
    }

    /// Null count reported in the field node.
    pub(crate) fn null_count(&self, block: &Block) -> usize {
        match self {
            BlockConverter::Null => block.position_count(),
            _ => block.null_count(),
        }
    }

    /// Append this block's buffer descriptors and paired writers.
    pub(crate) fn convert<'a>(
        &self,
        block: &'a Block,
        descriptors: &mut Vec<BufferDescriptor>,
        writers: &mut Vec<BufWriter<'a>>,
    ) -> Result<()> {
        if block.is_multivalued() {
            return Err(ColStreamError::UnsupportedBlockShape(
                "multi-valued cells are not supported by the Arrow format".to_string(),
            ));
        }
        match (self, block) {
            (BlockConverter::Null, _) => {
                // No buffers; the field node alone says every position is null.
            }
            (BlockConverter::Bool, Block::Bool(b)) => {
                let n = b.position_count();
                push_validity(block, descriptors, writers);
                descriptors.push(BufferDescriptor { length: bitmap_byte_len(n) });
                writers.push(Box::new(move |out| {
                    Ok(write_packed_bits(out, n, |i| b.get(i)))
                }));
            }
            (BlockConverter::Int32, Block::Int(b)) => {
                let n = b.position_count();
                push_validity(block, descriptors, writers);
                descriptors.push(BufferDescriptor { length: 4 * n as u64 });
                writers.push(Box::new(move |out| {
                    for p in 0..n {
                        out.put_i32_le(b.get(p));
                    }
                    Ok(4 * n as u64)
                }));
            }
            (BlockConverter::Int64(_), Block::Long(b)) => {
                let n = b.position_count();
                push_validity(block, descriptors, writers);
                descriptors.push(BufferDescriptor { length: 8 * n as u64 });
                writers.push(Box::new(move |out| {
                    for p in 0..n {
                        out.put_i64_le(b.get(p));
                    }
                    Ok(8 * n as u64)
                }));
            }
            (BlockConverter::Float64, Block::Double(b)) => {
                let n = b.position_count();
                push_validity(block, descriptors, writers);
                descriptors.push(BufferDescriptor { length: 8 * n as u64 });
                writers.push(Box::new(move |out| {
                    for p in 0..n {
                        out.put_f64_le(b.get(p));
                    }
                    Ok(8 * n as u64)
                }));
            }
            (BlockConverter::Bytes { transform, .. }, Block::Bytes(b)) => {
                let n = b.position_count();
                let transform = *transform;
                push_validity(block, descriptors, writers);

                // Length pass: the values descriptor must know the total
                // before any payload byte exists. Offsets are 32-bit.
                let mut total: u64 = 0;
                for p in 0..n {
                    if !b.is_null(p) {
                        total += cell_bytes(transform, b.get_bytes(p)).len() as u64;
                    }
                }
                if total > i32::MAX as u64 {
                    return Err(ColStreamError::OffsetOverflow);
                }

                descriptors.push(BufferDescriptor { length: 4 * (n as u64 + 1) });
                writers.push(Box::new(move |out| {
                    let mut offset = 0i32;
                    out.put_i32_le(offset);
                    for p in 0..n {
                        if !b.is_null(p) {
                            offset += cell_bytes(transform, b.get_bytes(p)).len() as i32;
                        }
                        out.put_i32_le(offset);
                    }
                    Ok(4 * (n as u64 + 1))
                }));

                descriptors.push(BufferDescriptor { length: total });
                writers.push(Box::new(move |out| {
                    let mut written = 0u64;
                    for p in 0..n {
                        if !b.is_null(p) {
                            let bytes = cell_bytes(transform, b.get_bytes(p));
                            out.put_slice(&bytes);
                            written += bytes.len() as u64;
                        }
                    }
                    Ok(written)
                }));
            }
            (converter, block) => {
                return Err(ColStreamError::UnsupportedBlockShape(format!(
                    "{converter:?} converter cannot encode this {} block",
                    block_kind(block)
                )));
            }
        }
        Ok(())
    }
}

fn block_kind(block: &Block) -> &'static str {
    match block {
        Block::Bool(_) => "boolean",
        Block::Int(_) => "int",
        Block::Long(_) => "long",
        Block::Double(_) => "double",
        Block::Bytes(_) => "bytes",
        Block::Null(_) => "null",
    }
}

fn bitmap_byte_len(positions: usize) -> u64 {
    positions.div_ceil(8) as u64
}

/// Append the validity buffer descriptor and writer shared by every non-null
/// converter.
fn push_validity<'a>(
    block: &'a Block,
    descriptors: &mut Vec<BufferDescriptor>,
    writers: &mut Vec<BufWriter<'a>>,
) {
    let n = block.position_count();
    descriptors.push(BufferDescriptor { length: bitmap_byte_len(n) });
    writers.push(Box::new(move |out| Ok(write_validity(out, block))));
}

fn write_validity(out: &mut BytesMut, block: &Block) -> u64 {
    let n = block.position_count();
    if !block.may_have_nulls() {
        return write_all_valid(out, n);
    }
    write_packed_bits(out, n, |i| !block.is_null(i))
}

/// Fast path for blocks without nulls: whole 0xFF bytes plus one partial
/// trailing byte with the low `n % 8` bits set.
fn write_all_valid(out: &mut BytesMut, n: usize) -> u64 {
    let full = n / 8;
    out.put_bytes(0xff, full);
    let mut written = full as u64;
    if n % 8 != 0 {
        out.put_u8((1u8 << (n % 8)) - 1);
        written += 1;
    }
    written
}

/// LSB-first bit packing, one bit per position, zero-padded trailing byte.
fn write_packed_bits(out: &mut BytesMut, n: usize, bit: impl Fn(usize) -> bool) -> u64 {
    let mut written = 0u64;
    let mut current = 0u8;
    for i in 0..n {
        if bit(i) {
            current |= 1 << (i % 8);
        }
        if i % 8 == 7 {
            out.put_u8(current);
            current = 0;
            written += 1;
        }
    }
    if n % 8 != 0 {
        out.put_u8(current);
        written += 1;
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BoolBlock, BytesBlock, IntBlock, LongBlock, NullBlock};

    /// Run a conversion and materialize each buffer separately.
    fn run(converter: &BlockConverter, block: &Block) -> (Vec<u64>, Vec<Vec<u8>>) {
        let mut descriptors = Vec::new();
        let mut writers = Vec::new();
        converter.convert(block, &mut descriptors, &mut writers).unwrap();
        assert_eq!(descriptors.len(), writers.len());

        let mut buffers = Vec::with_capacity(writers.len());
        for (descriptor, writer) in descriptors.iter().zip(writers) {
            let mut out = BytesMut::new();
            let written = writer(&mut out).unwrap();
            assert_eq!(written, descriptor.length, "writer/descriptor length mismatch");
            assert_eq!(out.len() as u64, descriptor.length);
            buffers.push(out.to_vec());
        }
        (descriptors.into_iter().map(|d| d.length).collect(), buffers)
    }

    #[test]
    fn test_no_null_validity_fast_path() {
        let block = Block::Int(IntBlock::vector((0..10).collect()));
        let (lengths, buffers) = run(&BlockConverter::Int32, &block);
        assert_eq!(lengths, vec![2, 40]);
        assert_eq!(buffers[0], vec![0xff, 0x03]);
    }

    #[test]
    fn test_int_values_little_endian() {
        let block = Block::Int(IntBlock::vector(vec![1, -1]));
        let (_, buffers) = run(&BlockConverter::Int32, &block);
        assert_eq!(buffers[1], vec![1, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_validity_bits_with_nulls() {
        let rows = (0..10).map(|i| if i % 2 == 0 { Some(i) } else { None }).collect();
        let block = Block::Int(IntBlock::from_options(rows));
        let (_, buffers) = run(&BlockConverter::Int32, &block);
        // valid at even positions: bits 0,2,4,6 then 8
        assert_eq!(buffers[0], vec![0b0101_0101, 0b0000_0001]);
        // null rows store the zero placeholder
        assert_eq!(&buffers[1][4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_boolean_bit_packing() {
        let block = Block::Bool(BoolBlock::vector(vec![
            true, false, true, true, false, false, true, false, true,
        ]));
        let (lengths, buffers) = run(&BlockConverter::Bool, &block);
        assert_eq!(lengths, vec![2, 2]);
        assert_eq!(buffers[1], vec![0b0100_1101, 0b0000_0001]);
    }

    #[test]
    fn test_keyword_offsets_and_values() {
        let rows: Vec<&str> = (0..10).map(|i| if i % 2 == 0 { "foo" } else { "bar" }).collect();
        let block = Block::Bytes(BytesBlock::vector(rows));
        let converter = BlockConverter::Bytes { dtype: DataType::Utf8, transform: None };
        assert_eq!(converter.null_count(&block), 0);

        let (lengths, buffers) = run(&converter, &block);
        assert_eq!(lengths, vec![2, 44, 30]);
        let offsets: Vec<i32> = buffers[1]
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(offsets, vec![0, 3, 6, 9, 12, 15, 18, 21, 24, 27, 30]);
        assert_eq!(buffers[2], b"foobarfoobarfoobarfoobarfoobar".to_vec());
    }

    #[test]
    fn test_bytes_nulls_keep_offsets_flat() {
        let block = Block::Bytes(BytesBlock::from_options([Some("ab"), None, Some("c")]));
        let converter = BlockConverter::Bytes { dtype: DataType::Utf8, transform: None };
        let (_, buffers) = run(&converter, &block);
        let offsets: Vec<i32> = buffers[1]
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(offsets, vec![0, 2, 2, 3]);
        assert_eq!(buffers[2], b"abc".to_vec());
    }

    #[test]
    fn test_ip_cells_shortened() {
        let mut mapped = [0u8; 16];
        mapped[10] = 0xff;
        mapped[11] = 0xff;
        mapped[12..].copy_from_slice(&[192, 0, 2, 1]);
        let plain = [0x20u8; 16];

        let block = Block::Bytes(BytesBlock::vector([&mapped[..], &plain[..]]));
        let converter = BlockConverter::Bytes {
            dtype: DataType::Binary,
            transform: Some(ValueTransform::ShortenIp),
        };
        let (lengths, buffers) = run(&converter, &block);
        assert_eq!(lengths[2], 20);
        let offsets: Vec<i32> = buffers[1]
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(offsets, vec![0, 4, 20]);
        assert_eq!(&buffers[2][..4], &[0xc0, 0x00, 0x02, 0x01]);
    }

    #[test]
    fn test_rejected_version_becomes_empty_cell() {
        let block = Block::Bytes(BytesBlock::vector([
            crate::encode::values::pack_version("1.2.3"),
            vec![0x7f, b'x'],
        ]));
        let converter = BlockConverter::Bytes {
            dtype: DataType::Utf8,
            transform: Some(ValueTransform::VersionToString),
        };
        let (_, buffers) = run(&converter, &block);
        let offsets: Vec<i32> = buffers[1]
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(offsets, vec![0, 5, 5]);
        assert_eq!(buffers[2], b"1.2.3".to_vec());
    }

    #[test]
    fn test_null_converter_emits_no_buffers() {
        let block = Block::Null(NullBlock::new(7));
        let mut descriptors = Vec::new();
        let mut writers = Vec::new();
        BlockConverter::Null.convert(&block, &mut descriptors, &mut writers).unwrap();
        assert!(descriptors.is_empty());
        assert!(writers.is_empty());
        assert_eq!(BlockConverter::Null.null_count(&block), 7);
    }

    #[test]
    fn test_multivalued_block_rejected() {
        let block = Block::Int(IntBlock::multivalued(vec![1, 2, 3], vec![0, 2, 3]));
        let mut descriptors = Vec::new();
        let mut writers = Vec::new();
        let err = BlockConverter::Int32
            .convert(&block, &mut descriptors, &mut writers)
            .unwrap_err();
        assert!(matches!(err, ColStreamError::UnsupportedBlockShape(_)));
    }

    #[test]
    fn test_mismatched_block_rejected() {
        let block = Block::Long(LongBlock::vector(vec![1]));
        let mut descriptors = Vec::new();
        let mut writers = Vec::new();
        let err = BlockConverter::Int32
            .convert(&block, &mut descriptors, &mut writers)
            .unwrap_err();
        assert!(matches!(err, ColStreamError::UnsupportedBlockShape(_)));
    }

    #[test]
    fn test_validity_full_bytes_only() {
        let block = Block::Int(IntBlock::vector((0..16).collect()));
        let (lengths, buffers) = run(&BlockConverter::Int32, &block);
        assert_eq!(lengths[0], 2);
        assert_eq!(buffers[0], vec![0xff, 0xff]);
    }
}
