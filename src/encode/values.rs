//! Per-row value conversions applied while streaming variable-width columns.
//!
//! These are pure and allocation-bounded; the encoder may call them once per
//! row per pass (a length pass for offset arithmetic, a payload pass for the
//! actual bytes), so the same input must always produce the same output.

use crate::{ColStreamError, Result};

/// The IPv4-mapped IPv6 prefix, `::ffff:0:0/96`.
const IPV4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

/// Marker for a packed version whose text parsed as a release version.
const VERSION_RELEASE: u8 = 0x01;
/// Marker for a packed version kept verbatim (did not parse as a release).
const VERSION_RAW: u8 = 0x02;

/// Shorten an IPv4-mapped IPv6 address to its trailing 4 bytes.
///
/// Addresses are stored as 16-byte IPv6. Mapped IPv4 addresses come out as
/// 4 bytes, everything else passes through unchanged.
pub fn shorten_ip(bytes: &[u8]) -> &[u8] {
    if bytes.len() == 16 && bytes[..12] == IPV4_MAPPED_PREFIX {
        &bytes[12..]
    } else {
        bytes
    }
}

/// Render a packed version value to its textual form.
///
/// The packed layout is one marker byte followed by the UTF-8 version text.
/// Anything else is structurally invalid.
pub fn version_to_string(packed: &[u8]) -> Result<&[u8]> {
    match packed.split_first() {
        Some((&marker, text)) if marker == VERSION_RELEASE || marker == VERSION_RAW => {
            if std::str::from_utf8(text).is_err() {
                return Err(ColStreamError::BadValue("version text is not UTF-8".to_string()));
            }
            Ok(text)
        }
        Some((&marker, _)) => Err(ColStreamError::BadValue(format!(
            "unknown version marker 0x{marker:02x}"
        ))),
        None => Err(ColStreamError::BadValue("empty version value".to_string())),
    }
}

/// Pack a version string into the engine encoding read by
/// [`version_to_string`]. A version is a release when every dot-separated
/// part is plain ASCII digits; anything else is kept verbatim under the raw
/// marker.
pub fn pack_version(text: &str) -> Vec<u8> {
    let is_release = !text.is_empty()
        && text
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    let marker = if is_release { VERSION_RELEASE } else { VERSION_RAW };
    let mut packed = Vec::with_capacity(1 + text.len());
    packed.push(marker);
    packed.extend_from_slice(text.as_bytes());
    packed
}

/// Re-encode a `_source` document as canonical JSON bytes.
///
/// The output is compact JSON with object keys in sorted order; a strict JSON
/// parser reading it yields the same logical tree as the input. Payloads that
/// do not parse as JSON (e.g. a binary-tagged source) are rejected.
pub fn source_to_json(raw: &[u8]) -> Result<Vec<u8>> {
    let tree: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| ColStreamError::BadValue(format!("source is not valid JSON: {e}")))?;
    serde_json::to_vec(&tree)
        .map_err(|e| ColStreamError::BadValue(format!("source re-encoding failed: {e}")))
}
