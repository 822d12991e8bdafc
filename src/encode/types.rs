//! Logical type registry and column → Arrow schema binding.

use std::collections::HashMap;

use arrow::datatypes::{DataType, Field, TimeUnit};
use arrow::ipc::writer::IpcWriteOptions;
use arrow::ipc::MetadataVersion;
use once_cell::sync::Lazy;

use super::convert::{BlockConverter, ValueTransform};
use crate::{ColStreamError, Result};

/// Content type of a chunked Arrow response.
pub const CONTENT_TYPE: &str = "application/vnd.apache.arrow.stream";

/// Converters for every supported logical type.
static CONVERTERS: Lazy<HashMap<&'static str, BlockConverter>> = Lazy::new(|| {
    let mut map = HashMap::new();

    map.insert("null", BlockConverter::Null);
    map.insert("unsupported", BlockConverter::Null);

    map.insert("boolean", BlockConverter::Bool);

    map.insert("integer", BlockConverter::Int32);
    map.insert("counter_integer", BlockConverter::Int32);

    map.insert("long", BlockConverter::Int64(DataType::Int64));
    // counters stay signed, unsigned_long keeps its 64 value bits
    map.insert("counter_long", BlockConverter::Int64(DataType::Int64));
    map.insert("unsigned_long", BlockConverter::Int64(DataType::UInt64));

    map.insert("double", BlockConverter::Float64);
    map.insert("counter_double", BlockConverter::Float64);

    // date: milliseconds since epoch, time zone unset
    map.insert(
        "date",
        BlockConverter::Int64(DataType::Timestamp(TimeUnit::Millisecond, None)),
    );

    map.insert("keyword", BlockConverter::Bytes { dtype: DataType::Utf8, transform: None });
    map.insert("text", BlockConverter::Bytes { dtype: DataType::Utf8, transform: None });

    // ip: 16-byte ipv6 values, with mapped ipv4 addresses shortened to 4 bytes
    map.insert(
        "ip",
        BlockConverter::Bytes {
            dtype: DataType::Binary,
            transform: Some(ValueTransform::ShortenIp),
        },
    );

    // spatial types keep their WKB form
    map.insert("geo_point", BlockConverter::Bytes { dtype: DataType::Binary, transform: None });
    map.insert("geo_shape", BlockConverter::Bytes { dtype: DataType::Binary, transform: None });
    map.insert(
        "cartesian_point",
        BlockConverter::Bytes { dtype: DataType::Binary, transform: None },
    );
    map.insert(
        "cartesian_shape",
        BlockConverter::Bytes { dtype: DataType::Binary, transform: None },
    );

    map.insert(
        "version",
        BlockConverter::Bytes {
            dtype: DataType::Utf8,
            transform: Some(ValueTransform::VersionToString),
        },
    );

    map.insert(
        "_source",
        BlockConverter::Bytes {
            dtype: DataType::Utf8,
            transform: Some(ValueTransform::SourceToJson),
        },
    );

    map
});

/// Shared IPC write options: 8-byte buffer alignment, V5 metadata, no
/// compression. Initialized once per process.
static WRITE_OPTIONS: Lazy<IpcWriteOptions> = Lazy::new(|| {
    IpcWriteOptions::try_new(8, false, MetadataVersion::V5)
        .expect("stream write options are statically valid")
});

pub(crate) fn write_options() -> &'static IpcWriteOptions {
    &WRITE_OPTIONS
}

/// An output column: a logical type bound to a converter, plus the field name
/// placed into the Arrow schema. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Column {
    logical_type: &'static str,
    name: String,
    converter: BlockConverter,
}

impl Column {
    /// Bind a logical type name to its converter. Unknown names fail fast.
    pub fn new(logical_type: &str, name: impl Into<String>) -> Result<Self> {
        let (canonical, converter) = CONVERTERS
            .get_key_value(logical_type)
            .ok_or_else(|| ColStreamError::UnsupportedType(logical_type.to_string()))?;
        Ok(Self {
            logical_type: *canonical,
            name: name.into(),
            converter: converter.clone(),
        })
    }

    pub fn logical_type(&self) -> &str {
        self.logical_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn converter(&self) -> &BlockConverter {
        &self.converter
    }

    /// The nullable Arrow field this column contributes to the schema.
    pub(crate) fn arrow_field(&self) -> Field {
        Field::new(&self.name, self.converter.arrow_field_type(), true)
    }
}
