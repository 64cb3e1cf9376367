//! Zstandard primitives (requires the `compression` feature).
//!
//! Switch titles compress archives as single Zstd frames, most of them
//! against a trained dictionary shipped in a separate pack. This module is
//! the thin layer over the `zstd` crate; dictionary *selection* lives in
//! [`super::dictionary`].

#![cfg(feature = "compression")]

use std::io::Read;

use crate::{Error, Result};

/// Magic number opening every Zstandard frame (`0xFD2FB528` LE).
pub const FRAME_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Magic number opening a trained dictionary (`0xEC30A437` LE).
pub const DICTIONARY_MAGIC: [u8; 4] = [0x37, 0xA4, 0x30, 0xEC];

/// Whether `data` starts with a Zstd frame.
pub fn is_zstd(data: &[u8]) -> bool {
    data.starts_with(&FRAME_MAGIC)
}

/// Dictionary id declared in a frame header, `None` when the frame does not
/// record one (or `data` is not a frame).
///
/// ```text
/// [0x00] Magic                      (4 bytes)
/// [0x04] Frame_Header_Descriptor    (1 byte)
///          bits 0-1  Dictionary_ID_flag (0, 1, 2 or 4 bytes)
///          bit  5    Single_Segment_flag
/// [0x05] Window_Descriptor          (1 byte, absent if single segment)
/// [....] Dictionary_ID              (LE, size per flag)
/// ```
pub fn frame_dictionary_id(data: &[u8]) -> Option<u32> {
    if !is_zstd(data) {
        return None;
    }
    let descriptor = *data.get(4)?;
    let id_len = match descriptor & 0b11 {
        0 => return None,
        1 => 1,
        2 => 2,
        _ => 4,
    };
    let single_segment = descriptor & 0x20 != 0;
    let start = if single_segment { 5 } else { 6 };
    let bytes = data.get(start..start + id_len)?;
    let mut id = [0u8; 4];
    id[..id_len].copy_from_slice(bytes);
    match u32::from_le_bytes(id) {
        0 => None,
        id => Some(id),
    }
}

/// Id recorded in a trained dictionary's header, `None` for raw-content
/// dictionaries.
pub fn dictionary_id(dictionary: &[u8]) -> Option<u32> {
    if !dictionary.starts_with(&DICTIONARY_MAGIC) {
        return None;
    }
    let b = dictionary.get(4..8)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Decompress a complete Zstandard-compressed buffer.
///
/// Returns [`Error::Decompression`] on any decompression failure.
pub fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data).map_err(|_| Error::Decompression {
        dictionary: None,
        available: Vec::new(),
    })
}

/// Decompress a frame that was compressed against `dictionary`.
///
/// The error carries no dictionary names; the adapter fills them in.
pub fn decompress_zstd_with_dictionary(data: &[u8], dictionary: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut decoder = zstd::stream::read::Decoder::with_dictionary(data, dictionary)?;
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Compress `data`, optionally against a dictionary.
pub fn compress_zstd(data: &[u8], dictionary: Option<&[u8]>, level: i32) -> Result<Vec<u8>> {
    let compressed = match dictionary {
        Some(dict) => zstd::bulk::Compressor::with_dictionary(level, dict)
            .and_then(|mut c| c.compress(data)),
        None => zstd::bulk::compress(data, level),
    };
    compressed.map_err(|e| Error::Compression(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_without_dictionary() {
        let data = b"SARC SARC SARC SARC message message message".repeat(8);
        let packed = compress_zstd(&data, None, 3).unwrap();
        assert!(is_zstd(&packed));
        assert_eq!(frame_dictionary_id(&packed), None);
        assert_eq!(decompress_zstd(&packed).unwrap(), data);
    }

    #[test]
    fn round_trip_with_raw_content_dictionary() {
        let dict = b"common prefix shared by every message table ".repeat(4);
        let data = b"common prefix shared by every message table, then a tail".to_vec();
        let packed = compress_zstd(&data, Some(&dict), 3).unwrap();
        assert_eq!(decompress_zstd_with_dictionary(&packed, &dict).unwrap(), data);
    }

    #[test]
    fn frame_header_dictionary_id() {
        // descriptor: single segment, 4-byte dictionary id
        let frame = [0x28, 0xB5, 0x2F, 0xFD, 0x23, 0x78, 0x56, 0x34, 0x12];
        assert_eq!(frame_dictionary_id(&frame), Some(0x1234_5678));
        // descriptor: windowed, 1-byte dictionary id
        let frame = [0x28, 0xB5, 0x2F, 0xFD, 0x01, 0x00, 0x07];
        assert_eq!(frame_dictionary_id(&frame), Some(7));
        assert_eq!(frame_dictionary_id(b"SARC"), None);
    }

    #[test]
    fn trained_dictionary_id() {
        let mut dict = DICTIONARY_MAGIC.to_vec();
        dict.extend_from_slice(&42u32.to_le_bytes());
        assert_eq!(dictionary_id(&dict), Some(42));
        assert_eq!(dictionary_id(b"raw content"), None);
    }
}
