//! SARC (SEAD ARChive) - the named-file container every other asset lives in.
//!
//! Message tables, record tables and dictionary packs all arrive inside a
//! SARC, usually Zstandard-compressed (`.pack.zs`, `.sarc.zs`).
//!
//! ## Layout
//! ```text
//! [0x00] SARC header  (0x14 bytes)
//! [0x14] SFAT header  (0x0C bytes) + FAT entries (FileCount × 0x10)
//! [...]  SFNT header  (0x08 bytes) + null-terminated filenames (4-byte aligned)
//! [...]  Data section (begins at offset given in SARC header)
//! ```
//!
//! ## Endianness
//! Determined by the BOM bytes at 0x06: `FF FE` = little endian,
//! `FE FF` = big endian. Everything after the BOM follows it.
//!
//! ## SARC Header (0x14 bytes)
//! ```text
//! [0x00] Magic "SARC"       (4 bytes)
//! [0x04] HeaderSize (0x14)  (u16)
//! [0x06] BOM                (2 bytes)
//! [0x08] TotalFileSize      (u32)
//! [0x0C] DataOffset         (u32)
//! [0x10] Version (0x0100)   (u16)
//! [0x12] Padding
//! ```
//!
//! ## SFAT Header (0x0C bytes) / Entry (0x10 bytes)
//! ```text
//! [0x00] Magic "SFAT"           [0x00] FilenameHash (u32)
//! [0x04] HeaderSize (0x0C)      [0x04] FilenameAttrs (u32)
//! [0x06] FileCount (max 0x3FFF)        0 = no name; else 0x01BBBBBB where
//! [0x08] HashMultiplier (101)          BBBBBB = name-table word offset
//!                               [0x08] DataStart (u32, rel. to data section)
//!                               [0x0C] DataEnd   (u32)
//! ```
//! Entries are sorted by hash; runtime uses binary search.
//!
//! ## Repacking
//! [`pack`] never moves data. A replacement that fits its original slot is
//! written in place; one that does not is skipped and reported. This keeps
//! every other offset in the archive valid, which matters because several
//! games cache FAT offsets.

use std::collections::HashSet;
use std::io::{Cursor, Read, Seek, SeekFrom};

use log::{trace, warn};

use crate::config::PackOptions;
use crate::utils::{align_up, bytesa, end_u16, end_u32, magic, read_null_string};
use crate::{Error, Result};

/// Hash multiplier used by every SARC seen in the wild.
pub const DEFAULT_HASH_MULTIPLIER: u32 = 0x65;

/// Parsed SARC archive (metadata only).
#[derive(Debug, Clone)]
pub struct Sarc {
    /// All file entries in FAT order.
    pub files: Vec<SarcFile>,
    /// Whether the archive uses little-endian encoding.
    pub le: bool,
    /// Format version from the SARC header (normally 0x0100).
    pub version: u16,
    /// Hash multiplier from the SFAT header (always 101 = 0x65).
    pub hash_multiplier: u32,
    /// Absolute offset where file data begins.
    pub data_offset: u64,
}

/// A single file entry inside a SARC archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SarcFile {
    /// Filename ([`None`] if the archive has no name table entry for this file).
    pub name: Option<String>,
    /// Hash of the filename.
    pub hash: u32,
    /// Start byte offset within the SARC data section.
    pub data_start: u32,
    /// End byte offset within the SARC data section (exclusive).
    pub data_end: u32,
}

impl SarcFile {
    /// Size of this file's data in bytes.
    pub fn size(&self) -> u64 {
        self.data_end.saturating_sub(self.data_start) as u64
    }
}

/// A named file borrowed from the archive buffer.
#[derive(Debug, Clone, Copy)]
pub struct SarcEntry<'a> {
    /// Filename; empty for entries without a name table record.
    pub name: &'a str,
    /// Absolute byte range of the data inside the archive buffer.
    pub range: (usize, usize),
    /// The file's bytes.
    pub data: &'a [u8],
}

impl Sarc {
    /// Parse a SARC archive held entirely in memory.
    ///
    /// Beyond the header checks this validates the archive invariants:
    /// every data range lies within the data region, ranges do not overlap
    /// and names are unique.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let sarc = Self::parse_reader(&mut Cursor::new(data))?;
        sarc.validate(data.len() as u64)?;
        Ok(sarc)
    }

    /// Parse a SARC archive from `r`.
    ///
    /// `r` must be positioned at the very beginning of the SARC magic.
    /// Only the header, FAT and name table are read.
    pub fn parse_reader<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let sarc_start = r.stream_position()?;

        magic(r, b"SARC")?;

        let header_size = bytesa::<2>(r)?;
        let le = match bytesa::<2>(r)? {
            [0xFF, 0xFE] => true,
            [0xFE, 0xFF] => false,
            _ => return Err(Error::Parse("invalid SARC BOM")),
        };
        let header_size = if le {
            u16::from_le_bytes(header_size)
        } else {
            u16::from_be_bytes(header_size)
        };
        if header_size != 0x14 {
            return Err(Error::Parse("unexpected SARC header size"));
        }

        let _total_size = end_u32(r, le)?;
        let data_offset = end_u32(r, le)? as u64;
        let version = end_u16(r, le)?;
        let _padding = end_u16(r, le)?;

        // SFAT header (0x0C bytes)
        magic(r, b"SFAT")?;
        let sfat_size = end_u16(r, le)?;
        if sfat_size != 0x0C {
            return Err(Error::Parse("unexpected SFAT header size"));
        }
        let file_count = end_u16(r, le)?;
        let hash_multiplier = end_u32(r, le)?;

        if file_count > 0x3FFF {
            return Err(Error::Parse("SARC file count exceeds maximum"));
        }

        let mut fat = Vec::with_capacity(file_count as usize);
        for _ in 0..file_count {
            let hash = end_u32(r, le)?;
            let name_attrs = end_u32(r, le)?;
            let data_start = end_u32(r, le)?;
            let data_end = end_u32(r, le)?;
            fat.push((hash, name_attrs, data_start, data_end));
        }

        // SFNT header (0x08 bytes)
        magic(r, b"SFNT")?;
        let sfnt_size = end_u16(r, le)?;
        if sfnt_size != 8 {
            return Err(Error::Parse("unexpected SFNT header size"));
        }
        let _sfnt_padding = end_u16(r, le)?;

        let name_table_start = r.stream_position()?;
        let data_start_abs = sarc_start + data_offset;
        if data_start_abs < name_table_start {
            return Err(Error::InvalidRange);
        }
        let name_table_len = data_start_abs - name_table_start;

        let mut files = Vec::with_capacity(file_count as usize);
        for (hash, name_attrs, data_start, data_end) in fat {
            let name = if name_attrs == 0 {
                None
            } else {
                // name_attrs = 0xAABBBBBB; BBBBBB is the word offset (× 4)
                // into the name table.
                let byte_off = (name_attrs & 0x00FF_FFFF) as u64 * 4;
                if byte_off >= name_table_len {
                    return Err(Error::InvalidRange);
                }
                r.seek(SeekFrom::Start(name_table_start + byte_off))?;
                let mut bounded = (&mut *r).take(name_table_len - byte_off);
                Some(read_null_string(&mut bounded).map_err(|e| match e {
                    Error::UnexpectedEof => Error::UnterminatedName,
                    other => other,
                })?)
            };
            files.push(SarcFile {
                name,
                hash,
                data_start,
                data_end,
            });
        }

        Ok(Self {
            files,
            le,
            version,
            hash_multiplier,
            data_offset: data_start_abs,
        })
    }

    fn validate(&self, total_len: u64) -> Result<()> {
        if self.data_offset > total_len {
            return Err(Error::InvalidRange);
        }
        let region = total_len - self.data_offset;

        let mut names = HashSet::with_capacity(self.files.len());
        let mut ranges = Vec::with_capacity(self.files.len());
        for file in &self.files {
            if file.data_start > file.data_end || file.data_end as u64 > region {
                return Err(Error::InvalidRange);
            }
            if let Some(name) = &file.name
                && !names.insert(name.as_str())
            {
                return Err(Error::Parse("duplicate SARC file name"));
            }
            ranges.push((file.data_start, file.data_end));
        }

        ranges.sort_unstable();
        if ranges.windows(2).any(|w| w[1].0 < w[0].1) {
            return Err(Error::Parse("overlapping SARC file data"));
        }
        Ok(())
    }

    /// Borrow every file's bytes out of `data`, the buffer this archive was
    /// parsed from.
    pub fn entries<'a>(&'a self, data: &'a [u8]) -> Result<Vec<SarcEntry<'a>>> {
        self.files
            .iter()
            .map(|f| {
                let (start, end) = self.absolute_range(f);
                let bytes = data.get(start..end).ok_or(Error::InvalidRange)?;
                Ok(SarcEntry {
                    name: f.name.as_deref().unwrap_or(""),
                    range: (start, end),
                    data: bytes,
                })
            })
            .collect()
    }

    /// Absolute `[start, end)` of a file inside the archive buffer.
    pub fn absolute_range(&self, file: &SarcFile) -> (usize, usize) {
        let base = self.data_offset as usize;
        (base + file.data_start as usize, base + file.data_end as usize)
    }

    /// Compute the canonical hash for a filename using this archive's
    /// multiplier.
    pub fn hash_filename(&self, name: &str) -> u32 {
        sarc_hash(name.as_bytes(), self.hash_multiplier)
    }

    /// Find a file by its exact name.
    ///
    /// Uses hash-then-name comparison.
    pub fn get_file_by_name(&self, name: &str) -> Option<&SarcFile> {
        let target = self.hash_filename(name);
        self.files
            .iter()
            .find(|f| f.hash == target && f.name.as_deref() == Some(name))
    }
}

/// Why a replacement was not written by [`pack`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SkipReason {
    /// The new data is longer than the original slot.
    TooLarge { needed: usize, available: usize },
    /// No file with that name exists in the archive.
    UnknownFile,
}

/// A replacement [`pack`] refused to write.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Skip {
    pub name: String,
    pub reason: SkipReason,
}

/// Output of [`pack`].
#[derive(Debug, Clone)]
pub struct Packed {
    /// The repacked archive; always the same length as the original.
    pub bytes: Vec<u8>,
    /// Names written in place.
    pub written: Vec<String>,
    /// Replacements left untouched.
    pub skipped: Vec<Skip>,
}

/// Write `replacements` into a copy of `original` without moving any data.
///
/// A replacement no longer than its original slot overwrites the start of
/// that slot. The tail of a shortened slot keeps its stale bytes unless
/// [`PackOptions::zero_fill`] is set. A longer replacement leaves the slot
/// untouched and is reported in [`Packed::skipped`]; with
/// [`PackOptions::strict`] it becomes an [`Error::Overflow`] instead.
pub fn pack<N, D>(original: &[u8], replacements: &[(N, D)], options: &PackOptions) -> Result<Packed>
where
    N: AsRef<str>,
    D: AsRef<[u8]>,
{
    let sarc = Sarc::parse(original)?;
    let mut bytes = original.to_vec();
    let mut written = Vec::new();
    let mut skipped = Vec::new();

    for (name, data) in replacements {
        let (name, data) = (name.as_ref(), data.as_ref());
        let Some(file) = sarc.get_file_by_name(name) else {
            warn!("SARC repack: no file named {name}");
            if options.strict {
                return Err(Error::Parse("replacement names a file missing from the archive"));
            }
            skipped.push(Skip {
                name: name.to_owned(),
                reason: SkipReason::UnknownFile,
            });
            continue;
        };

        let (start, end) = sarc.absolute_range(file);
        let available = end - start;
        if data.len() > available {
            warn!(
                "SARC repack: {name} grew from {available} to {} bytes, keeping original",
                data.len()
            );
            if options.strict {
                return Err(Error::Overflow {
                    key: name.to_owned(),
                    needed: data.len(),
                    available,
                });
            }
            skipped.push(Skip {
                name: name.to_owned(),
                reason: SkipReason::TooLarge {
                    needed: data.len(),
                    available,
                },
            });
            continue;
        }

        trace!("SARC repack: {name} {} / {available} bytes", data.len());
        bytes[start..start + data.len()].copy_from_slice(data);
        if options.zero_fill {
            bytes[start + data.len()..end].fill(0);
        }
        written.push(name.to_owned());
    }

    Ok(Packed {
        bytes,
        written,
        skipped,
    })
}

/// Builds a fresh little-endian SARC.
///
/// Used for new dictionary packs and for archives that are assembled from
/// scratch rather than patched.
#[derive(Debug, Clone)]
pub struct SarcWriter {
    files: Vec<(String, Vec<u8>)>,
    alignment: usize,
}

impl Default for SarcWriter {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            alignment: 8,
        }
    }
}

impl SarcWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data alignment for every file (a power of two).
    pub fn alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment.max(1).next_power_of_two();
        self
    }

    /// Add or replace a file.
    pub fn add_file(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        let name = name.into();
        let data = data.into();
        match self.files.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = data,
            None => self.files.push((name, data)),
        }
        self
    }

    /// Serialize the archive.
    pub fn build(&self) -> Vec<u8> {
        let mut order: Vec<(u32, &(String, Vec<u8>))> = self
            .files
            .iter()
            .map(|f| (sarc_hash(f.0.as_bytes(), DEFAULT_HASH_MULTIPLIER), f))
            .collect();
        order.sort_by_key(|(hash, _)| *hash);

        let mut names = Vec::new();
        let mut name_offsets = Vec::with_capacity(order.len());
        for (_, (name, _)) in &order {
            name_offsets.push(names.len());
            names.extend_from_slice(name.as_bytes());
            names.push(0);
            names.resize(align_up(names.len(), 4), 0);
        }

        let fat_end = 0x14 + 0x0C + 0x10 * order.len();
        let data_offset = align_up(fat_end + 0x08 + names.len(), self.alignment);

        let mut data = Vec::new();
        let mut ranges = Vec::with_capacity(order.len());
        for (_, (_, bytes)) in &order {
            let start = align_up(data.len(), self.alignment);
            data.resize(start, 0);
            data.extend_from_slice(bytes);
            ranges.push((start, data.len()));
        }

        let total = data_offset + data.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"SARC");
        out.extend_from_slice(&0x14u16.to_le_bytes());
        out.extend_from_slice(&[0xFF, 0xFE]);
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(data_offset as u32).to_le_bytes());
        out.extend_from_slice(&0x0100u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());

        out.extend_from_slice(b"SFAT");
        out.extend_from_slice(&0x0Cu16.to_le_bytes());
        out.extend_from_slice(&(order.len() as u16).to_le_bytes());
        out.extend_from_slice(&DEFAULT_HASH_MULTIPLIER.to_le_bytes());
        for (i, (hash, _)) in order.iter().enumerate() {
            let attrs = 0x0100_0000 | (name_offsets[i] / 4) as u32;
            out.extend_from_slice(&hash.to_le_bytes());
            out.extend_from_slice(&attrs.to_le_bytes());
            out.extend_from_slice(&(ranges[i].0 as u32).to_le_bytes());
            out.extend_from_slice(&(ranges[i].1 as u32).to_le_bytes());
        }

        out.extend_from_slice(b"SFNT");
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&names);
        out.resize(data_offset, 0);
        out.extend_from_slice(&data);
        out
    }
}

/// SARC filename hash algorithm.
///
/// Each byte is sign-extended (cast to `i8`) before accumulating. This is
/// required to correctly handle non-ASCII characters in Switch game paths.
pub fn sarc_hash(name: &[u8], multiplier: u32) -> u32 {
    let mut h: u32 = 0;
    for &b in name {
        h = h.wrapping_mul(multiplier).wrapping_add(b as i8 as u32);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_files() -> Vec<u8> {
        let mut w = SarcWriter::new();
        w.add_file("a", vec![0xAA; 100]).add_file("b", vec![0xBB; 200]);
        w.build()
    }

    #[test]
    fn parse_written_archive() {
        let bytes = two_files();
        let sarc = Sarc::parse(&bytes).unwrap();
        assert!(sarc.le);
        assert_eq!(sarc.files.len(), 2);

        let entries = sarc.entries(&bytes).unwrap();
        let a = entries.iter().find(|e| e.name == "a").unwrap();
        assert_eq!(a.data, &[0xAA; 100][..]);
        let b = entries.iter().find(|e| e.name == "b").unwrap();
        assert_eq!(b.data.len(), 200);
        assert!(sarc.files.windows(2).all(|w| w[0].hash <= w[1].hash));
    }

    #[test]
    fn bad_magic() {
        let mut bytes = two_files();
        bytes[0] = b'X';
        assert!(matches!(Sarc::parse(&bytes), Err(Error::BadMagic)));
    }

    #[test]
    fn out_of_bounds_name_offset() {
        let mut bytes = two_files();
        // First FAT entry's name attributes live at 0x20 + 4.
        bytes[0x24..0x28].copy_from_slice(&0x01FF_FFFFu32.to_le_bytes());
        assert!(matches!(Sarc::parse(&bytes), Err(Error::InvalidRange)));
    }

    #[test]
    fn data_range_past_end() {
        let mut bytes = two_files();
        bytes[0x2C..0x30].copy_from_slice(&0x00FF_FFFFu32.to_le_bytes());
        assert!(Sarc::parse(&bytes).unwrap_err().is_format());
    }

    #[test]
    fn shorter_replacement_keeps_stale_tail() {
        let bytes = two_files();
        let packed = pack(&bytes, &[("a", vec![0x11; 80])], &PackOptions::default()).unwrap();
        assert_eq!(packed.bytes.len(), bytes.len());
        assert_eq!(packed.written, vec!["a".to_string()]);

        let sarc = Sarc::parse(&packed.bytes).unwrap();
        let (start, end) = sarc.absolute_range(sarc.get_file_by_name("a").unwrap());
        assert_eq!(&packed.bytes[start..start + 80], &[0x11; 80][..]);
        assert_eq!(&packed.bytes[start + 80..end], &[0xAA; 20][..]);
    }

    #[test]
    fn zero_fill_clears_tail() {
        let bytes = two_files();
        let options = PackOptions {
            zero_fill: true,
            ..PackOptions::default()
        };
        let packed = pack(&bytes, &[("a", vec![0x11; 80])], &options).unwrap();
        let sarc = Sarc::parse(&packed.bytes).unwrap();
        let (start, end) = sarc.absolute_range(sarc.get_file_by_name("a").unwrap());
        assert!(packed.bytes[start + 80..end].iter().all(|&b| b == 0));
    }

    #[test]
    fn longer_replacement_is_skipped() {
        let bytes = two_files();
        let packed = pack(
            &bytes,
            &[("a", vec![0x11; 101]), ("missing", vec![])],
            &PackOptions::default(),
        )
        .unwrap();
        assert_eq!(packed.bytes, bytes);
        assert_eq!(
            packed.skipped,
            vec![
                Skip {
                    name: "a".into(),
                    reason: SkipReason::TooLarge {
                        needed: 101,
                        available: 100
                    }
                },
                Skip {
                    name: "missing".into(),
                    reason: SkipReason::UnknownFile
                },
            ]
        );
    }

    #[test]
    fn strict_mode_fails_on_skip() {
        let bytes = two_files();
        let options = PackOptions {
            strict: true,
            ..PackOptions::default()
        };
        let err = pack(&bytes, &[("b", vec![0; 201])], &options).unwrap_err();
        assert!(matches!(
            err,
            Error::Overflow {
                needed: 201,
                available: 200,
                ..
            }
        ));
    }

    #[test]
    fn hash_sign_extends() {
        assert_eq!(sarc_hash(b"", 0x65), 0);
        assert_eq!(sarc_hash(b"a", 0x65), 0x61);
        assert_eq!(sarc_hash(&[0xFF], 0x65), 0xFFFF_FFFF);
    }
}
