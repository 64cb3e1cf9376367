//! MSBT (Message Studio Binary Text) - the per-screen message table.
//!
//! Each file holds the player-visible strings of one screen or character,
//! stored as UTF-16 with inline control tags.
//!
//! ## Layout
//! ```text
//! [0x00] Header     (0x20 bytes)
//! [0x20] Sections   each: magic (4) + size (u32) + padding (8) + data,
//!                   data padded with 0xAB to a 16-byte boundary
//! ```
//!
//! ## Header (0x20 bytes)
//! ```text
//! [0x00] Magic "MsgStdBn"   (8 bytes)
//! [0x08] BOM                (2 bytes, FF FE = little endian)
//! [0x0A] Unknown            (u16)
//! [0x0C] Encoding           (u8: 0 UTF-8, 1 UTF-16, 2 UTF-32)
//! [0x0D] Version (3)        (u8)
//! [0x0E] SectionCount       (u16)
//! [0x10] Unknown            (u16)
//! [0x12] FileSize           (u32)
//! [0x16] Padding            (10 bytes)
//! ```
//!
//! ## Sections used here
//! * `LBL1` - hash-bucketed labels: `u32` group count, groups of
//!   (`u32` label count, `u32` offset), then per label a `u8` length, the
//!   name, and a `u32` message index.
//! * `TXT2` - `u32` count, `u32` offsets relative to the section data,
//!   then NUL-terminated UTF-16 strings.
//!
//! ## Tags
//! Code unit `0x000E` opens a tag: `group u16, type u16, size u16` and
//! `size` parameter bytes. `0x000F` closes one: `group u16, type u16`. Tags
//! are kept as raw bytes and shown in the decoded text as
//! [`TAG_PLACEHOLDER`].
//!
//! Fonts map button glyphs into the private-use area, so a message may also
//! hold U+E000 as plain text. Such a unit decodes to [`LITERAL_PLACEHOLDER`]
//! and a literal U+E001 decodes to two of them; [`encode_text`] reverses
//! both.

use log::{trace, warn};

use crate::config::InjectOptions;
use crate::text::tags::TAG_PLACEHOLDER;
use crate::utils::{align_up, le_u16_at, le_u32_at, magic_at, put_u32, slice_at};
use crate::{Error, Result};

const MAGIC: &[u8; 8] = b"MsgStdBn";
const HEADER_SIZE: usize = 0x20;
const SECTION_HEADER_SIZE: usize = 0x10;
const TAG_OPEN: u16 = 0x000E;
const TAG_CLOSE: u16 = 0x000F;
const LABEL_GROUPS: u32 = 101;

/// Stands for a literal U+E000 unit in decoded text.
pub const LITERAL_PLACEHOLDER: char = '\u{E001}';

/// One message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageEntry {
    /// Position in the `TXT2` offset table.
    pub index: usize,
    /// Label from `LBL1`, when the file has one for this message.
    pub label: Option<String>,
    /// Decoded text; each tag appears as one [`TAG_PLACEHOLDER`].
    pub text: String,
    /// Raw bytes of each tag, in order of appearance.
    pub tags: Vec<Vec<u8>>,
    /// Absolute offset of the message's slot in the file.
    pub slot_offset: usize,
    /// Bytes available to the message, terminator included.
    pub slot_size: usize,
}

/// A section header found while walking the file.
#[derive(Debug, Clone, Copy)]
struct Section {
    magic: [u8; 4],
    data_offset: usize,
    size: usize,
}

fn check_header(data: &[u8]) -> Result<usize> {
    magic_at(data, 0, MAGIC)?;
    if slice_at(data, 8, 2)? != [0xFF, 0xFE] {
        return Err(Error::Parse("only little-endian message tables are supported"));
    }
    if slice_at(data, 0x0C, 1)?[0] != 1 {
        return Err(Error::Parse("only UTF-16 message tables are supported"));
    }
    Ok(le_u16_at(data, 0x0E)? as usize)
}

fn sections(data: &[u8]) -> Result<Vec<Section>> {
    let count = check_header(data)?;
    let mut out = Vec::with_capacity(count);
    let mut pos = HEADER_SIZE;
    for _ in 0..count {
        if pos + SECTION_HEADER_SIZE > data.len() {
            break;
        }
        let magic: [u8; 4] = slice_at(data, pos, 4)?.try_into().map_err(|_| Error::InvalidRange)?;
        let size = le_u32_at(data, pos + 4)? as usize;
        let data_offset = pos + SECTION_HEADER_SIZE;
        slice_at(data, data_offset, size)?;
        out.push(Section {
            magic,
            data_offset,
            size,
        });
        pos = align_up(data_offset + size, 16);
    }
    Ok(out)
}

fn find_section(sections: &[Section], magic: &[u8; 4]) -> Option<Section> {
    sections.iter().copied().find(|s| &s.magic == magic)
}

/// `(absolute offset, slot size)` of every `TXT2` entry.
fn slots(data: &[u8], txt2: Section) -> Result<Vec<(usize, usize)>> {
    let count = le_u32_at(data, txt2.data_offset)? as usize;
    if 4 + count * 4 > txt2.size {
        return Err(Error::InvalidRange);
    }
    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let rel = le_u32_at(data, txt2.data_offset + 4 + i * 4)? as usize;
        if rel > txt2.size {
            return Err(Error::InvalidRange);
        }
        offsets.push(rel);
    }
    let mut out = Vec::with_capacity(count);
    for (i, &start) in offsets.iter().enumerate() {
        let end = offsets.get(i + 1).copied().unwrap_or(txt2.size);
        if end < start {
            return Err(Error::Parse("message offsets are not ascending"));
        }
        out.push((txt2.data_offset + start, end - start));
    }
    Ok(out)
}

fn labels(data: &[u8], lbl1: Section, count: usize) -> Result<Vec<Option<String>>> {
    let mut out = vec![None; count];
    let base = lbl1.data_offset;
    let groups = le_u32_at(data, base)? as usize;
    for g in 0..groups {
        let label_count = le_u32_at(data, base + 4 + g * 8)? as usize;
        let mut pos = base + le_u32_at(data, base + 8 + g * 8)? as usize;
        for _ in 0..label_count {
            let len = slice_at(data, pos, 1)?[0] as usize;
            let name = String::from_utf8_lossy(slice_at(data, pos + 1, len)?).into_owned();
            let index = le_u32_at(data, pos + 1 + len)? as usize;
            if let Some(slot) = out.get_mut(index) {
                *slot = Some(name);
            }
            pos += 1 + len + 4;
        }
    }
    Ok(out)
}

/// Decode one slot into text and raw tags.
fn decode_slot(slot: &[u8]) -> Result<(String, Vec<Vec<u8>>)> {
    let mut units = Vec::with_capacity(slot.len() / 2);
    let mut tags = Vec::new();
    let mut text = String::new();
    let mut pos = 0;

    let flush = |units: &mut Vec<u16>, text: &mut String| {
        let decoded = char::decode_utf16(units.drain(..));
        text.extend(decoded.map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)));
    };

    loop {
        let unit = le_u16_at(slot, pos).map_err(|_| Error::Parse("unterminated message"))?;
        match unit {
            0 => break,
            0xE000 | 0xE001 => {
                flush(&mut units, &mut text);
                text.push(LITERAL_PLACEHOLDER);
                if unit == 0xE001 {
                    text.push(LITERAL_PLACEHOLDER);
                }
                pos += 2;
            }
            TAG_OPEN => {
                let param_size = le_u16_at(slot, pos + 6)? as usize;
                let len = 8 + param_size;
                flush(&mut units, &mut text);
                tags.push(slice_at(slot, pos, len)?.to_vec());
                text.push(TAG_PLACEHOLDER);
                pos += len;
            }
            TAG_CLOSE => {
                flush(&mut units, &mut text);
                tags.push(slice_at(slot, pos, 6)?.to_vec());
                text.push(TAG_PLACEHOLDER);
                pos += 6;
            }
            _ => {
                units.push(unit);
                pos += 2;
            }
        }
    }
    flush(&mut units, &mut text);
    Ok((text, tags))
}

/// Parse every message in a UTF-16 little-endian MSBT.
pub fn parse(data: &[u8]) -> Result<Vec<MessageEntry>> {
    let sections = sections(data)?;
    let txt2 = find_section(&sections, b"TXT2")
        .ok_or(Error::Parse("message table has no TXT2 section"))?;
    let slots = slots(data, txt2)?;
    let labels = match find_section(&sections, b"LBL1") {
        Some(lbl1) => labels(data, lbl1, slots.len())?,
        None => vec![None; slots.len()],
    };

    slots
        .into_iter()
        .zip(labels)
        .enumerate()
        .map(|(index, ((slot_offset, slot_size), label))| {
            let (text, tags) = decode_slot(slice_at(data, slot_offset, slot_size)?)?;
            Ok(MessageEntry {
                index,
                label,
                text,
                tags,
                slot_offset,
                slot_size,
            })
        })
        .collect()
}

/// Encode text back to UTF-16LE, expanding placeholders from `tags`.
///
/// Fails with [`Error::TagMismatch`] when the text's placeholders do not
/// match the number of tags.
pub fn encode_text(text: &str, tags: &[Vec<u8>]) -> Result<Vec<u8>> {
    let placeholders = text.chars().filter(|&c| c == TAG_PLACEHOLDER).count();
    if placeholders != tags.len() {
        return Err(Error::TagMismatch {
            expected: tags.len(),
            found: placeholders,
        });
    }
    let mut out = Vec::with_capacity(text.len() * 2);
    let mut tags = tags.iter();
    let mut buf = [0u16; 2];
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == TAG_PLACEHOLDER {
            if let Some(tag) = tags.next() {
                out.extend_from_slice(tag);
            }
            continue;
        }
        if c == LITERAL_PLACEHOLDER {
            let unit: u16 = if chars.next_if_eq(&LITERAL_PLACEHOLDER).is_some() {
                0xE001
            } else {
                0xE000
            };
            out.extend_from_slice(&unit.to_le_bytes());
            continue;
        }
        for unit in c.encode_utf16(&mut buf) {
            out.extend_from_slice(&unit.to_le_bytes());
        }
    }
    Ok(out)
}

/// Why [`inject`] left a message alone.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageSkipReason {
    TooLarge { needed: usize, available: usize },
    TagMismatch { expected: usize, found: usize },
    UnknownIndex,
}

/// A message [`inject`] did not write.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageSkip {
    pub index: usize,
    pub label: Option<String>,
    pub reason: MessageSkipReason,
}

/// Output of [`inject`].
#[derive(Debug, Clone)]
pub struct Injected {
    /// The patched file; always the same length as the input.
    pub bytes: Vec<u8>,
    /// Number of messages written.
    pub written: usize,
    pub skipped: Vec<MessageSkip>,
}

fn entry_key(entry: &MessageEntry) -> String {
    entry
        .label
        .clone()
        .unwrap_or_else(|| format!("#{}", entry.index))
}

/// Write `entries` back into a copy of `data`.
///
/// An entry is written only if its encoding plus the two-byte terminator
/// fits the original slot; the rest of the slot is zeroed. Anything else is
/// left byte-identical and reported, or fails the call in strict mode.
pub fn inject(data: &[u8], entries: &[MessageEntry], options: &InjectOptions) -> Result<Injected> {
    let sections = sections(data)?;
    let txt2 = find_section(&sections, b"TXT2")
        .ok_or(Error::Parse("message table has no TXT2 section"))?;
    let slots = slots(data, txt2)?;

    let mut bytes = data.to_vec();
    let mut written = 0;
    let mut skipped = Vec::new();

    for entry in entries {
        let skip = |reason: MessageSkipReason| MessageSkip {
            index: entry.index,
            label: entry.label.clone(),
            reason,
        };

        let Some(&(offset, available)) = slots.get(entry.index) else {
            if options.strict {
                return Err(Error::Parse("message index outside the offset table"));
            }
            skipped.push(skip(MessageSkipReason::UnknownIndex));
            continue;
        };

        let encoded = match encode_text(&entry.text, &entry.tags) {
            Ok(encoded) => encoded,
            Err(Error::TagMismatch { expected, found }) => {
                warn!("{}: {found} tag placeholders for {expected} tags", entry_key(entry));
                if options.strict {
                    return Err(Error::TagMismatch { expected, found });
                }
                skipped.push(skip(MessageSkipReason::TagMismatch { expected, found }));
                continue;
            }
            Err(e) => return Err(e),
        };

        if encoded.len() + 2 > available {
            warn!(
                "{}: {} bytes do not fit a {available}-byte slot, keeping original",
                entry_key(entry),
                encoded.len() + 2
            );
            if options.strict {
                return Err(Error::Overflow {
                    key: entry_key(entry),
                    needed: encoded.len() + 2,
                    available,
                });
            }
            skipped.push(skip(MessageSkipReason::TooLarge {
                needed: encoded.len() + 2,
                available,
            }));
            continue;
        }

        trace!("{}: writing {} / {available} bytes", entry_key(entry), encoded.len() + 2);
        let slot = &mut bytes[offset..offset + available];
        slot[..encoded.len()].copy_from_slice(&encoded);
        slot[encoded.len()..].fill(0);
        written += 1;
    }

    Ok(Injected {
        bytes,
        written,
        skipped,
    })
}

/// Bucket of a label in the `LBL1` hash table.
pub fn label_bucket(label: &str, groups: u32) -> u32 {
    let hash = label
        .bytes()
        .fold(0u32, |h, b| h.wrapping_mul(0x492).wrapping_add(b as u32));
    hash % groups
}

/// Builds a little-endian UTF-16 MSBT with `LBL1` and `TXT2` sections.
#[derive(Debug, Clone, Default)]
pub struct MsbtBuilder {
    messages: Vec<(String, String, Vec<Vec<u8>>)>,
}

impl MsbtBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. `text` uses [`TAG_PLACEHOLDER`] for each of `tags`.
    pub fn message(mut self, label: &str, text: &str, tags: Vec<Vec<u8>>) -> Self {
        self.messages.push((label.to_owned(), text.to_owned(), tags));
        self
    }

    fn section(out: &mut Vec<u8>, magic: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(magic);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&[0; 8]);
        out.extend_from_slice(data);
        out.resize(align_up(out.len(), 16), 0xAB);
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        let mut buckets: Vec<Vec<(&str, u32)>> = vec![Vec::new(); LABEL_GROUPS as usize];
        for (i, (label, ..)) in self.messages.iter().enumerate() {
            buckets[label_bucket(label, LABEL_GROUPS) as usize].push((label, i as u32));
        }
        let mut lbl1 = Vec::new();
        lbl1.extend_from_slice(&LABEL_GROUPS.to_le_bytes());
        let mut names = Vec::new();
        let names_base = 4 + 8 * LABEL_GROUPS as usize;
        for bucket in &buckets {
            lbl1.extend_from_slice(&(bucket.len() as u32).to_le_bytes());
            lbl1.extend_from_slice(&((names_base + names.len()) as u32).to_le_bytes());
            for (label, index) in bucket {
                let len = u8::try_from(label.len())
                    .map_err(|_| Error::Parse("label longer than 255 bytes"))?;
                names.push(len);
                names.extend_from_slice(label.as_bytes());
                names.extend_from_slice(&index.to_le_bytes());
            }
        }
        lbl1.extend_from_slice(&names);

        let mut txt2 = Vec::new();
        txt2.extend_from_slice(&(self.messages.len() as u32).to_le_bytes());
        let mut strings = Vec::new();
        let strings_base = 4 + 4 * self.messages.len();
        for (_, text, tags) in &self.messages {
            txt2.extend_from_slice(&((strings_base + strings.len()) as u32).to_le_bytes());
            strings.extend_from_slice(&encode_text(text, tags)?);
            strings.extend_from_slice(&[0, 0]);
        }
        txt2.extend_from_slice(&strings);

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[0xFF, 0xFE]);
        out.extend_from_slice(&0u16.to_le_bytes());
        out.push(1);
        out.push(3);
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.resize(HEADER_SIZE, 0);
        Self::section(&mut out, b"LBL1", &lbl1);
        Self::section(&mut out, b"TXT2", &txt2);
        let size = out.len() as u32;
        put_u32(&mut out, 0x12, size)?;
        Ok(out)
    }
}

/// Bytes of an opening tag with the given parameters.
pub fn open_tag(group: u16, kind: u16, params: &[u8]) -> Vec<u8> {
    let mut tag = Vec::with_capacity(8 + params.len());
    tag.extend_from_slice(&TAG_OPEN.to_le_bytes());
    tag.extend_from_slice(&group.to_le_bytes());
    tag.extend_from_slice(&kind.to_le_bytes());
    tag.extend_from_slice(&(params.len() as u16).to_le_bytes());
    tag.extend_from_slice(params);
    tag
}

/// Bytes of a closing tag.
pub fn close_tag(group: u16, kind: u16) -> Vec<u8> {
    let mut tag = Vec::with_capacity(6);
    tag.extend_from_slice(&TAG_CLOSE.to_le_bytes());
    tag.extend_from_slice(&group.to_le_bytes());
    tag.extend_from_slice(&kind.to_le_bytes());
    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let color = open_tag(0, 3, &[0xFF, 0x00]);
        let end = close_tag(0, 3);
        MsbtBuilder::new()
            .message("Greeting", "Hello!", vec![])
            .message("Warning", "\u{E000}Danger\u{E000} ahead", vec![color, end])
            .message("Nine", "123456789", vec![])
            .build()
            .unwrap()
    }

    #[test]
    fn parses_text_tags_and_labels() {
        let entries = parse(&sample()).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].text, "Hello!");
        assert_eq!(entries[0].label.as_deref(), Some("Greeting"));
        assert_eq!(entries[0].slot_size, 14);
        assert_eq!(entries[1].text, "\u{E000}Danger\u{E000} ahead");
        assert_eq!(entries[1].tags.len(), 2);
        assert_eq!(entries[1].tags[0].len(), 10);
        assert_eq!(entries[1].tags[1].len(), 6);
    }

    #[test]
    fn bad_magic() {
        let mut data = sample();
        data[0] = b'X';
        assert!(matches!(parse(&data), Err(Error::BadMagic)));
        assert!(matches!(
            inject(&data, &[], &InjectOptions::default()),
            Err(Error::BadMagic)
        ));
    }

    #[test]
    fn same_length_injection_round_trips() {
        let data = sample();
        let mut entries = parse(&data).unwrap();
        entries[0].text = "Salut!".into();
        entries[1].text = "\u{E000}Gefahr\u{E000} vorne".into();
        let injected = inject(&data, &entries, &InjectOptions::default()).unwrap();
        assert_eq!(injected.written, 3);
        assert!(injected.skipped.is_empty());
        assert_eq!(injected.bytes.len(), data.len());
        assert_eq!(parse(&injected.bytes).unwrap(), entries);
    }

    #[test]
    fn shorter_text_is_terminated_and_zeroed() {
        let data = sample();
        let mut entries = parse(&data).unwrap();
        entries[2].text = "1".into();
        let injected = inject(&data, &entries[2..], &InjectOptions::default()).unwrap();
        let reparsed = parse(&injected.bytes).unwrap();
        assert_eq!(reparsed[2].text, "1");
        let slot = &injected.bytes[reparsed[2].slot_offset..][..reparsed[2].slot_size];
        assert!(slot[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn overflowing_entry_is_left_identical() {
        // "123456789" + NUL occupies a 20-byte slot.
        let data = sample();
        let mut entries = parse(&data).unwrap();
        assert_eq!(entries[2].slot_size, 20);
        entries[2].text = "abcdefghij".into(); // 20 bytes + terminator = 22
        let injected = inject(&data, &entries[2..], &InjectOptions::default()).unwrap();
        assert_eq!(injected.bytes, data);
        assert_eq!(
            injected.skipped[0].reason,
            MessageSkipReason::TooLarge {
                needed: 22,
                available: 20
            }
        );
    }

    #[test]
    fn lost_placeholder_is_a_skip() {
        let data = sample();
        let mut entries = parse(&data).unwrap();
        entries[1].text = "Danger".into();
        let injected = inject(&data, &entries[1..2], &InjectOptions::default()).unwrap();
        assert_eq!(injected.bytes, data);
        assert!(matches!(
            injected.skipped[0].reason,
            MessageSkipReason::TagMismatch {
                expected: 2,
                found: 0
            }
        ));
        let strict = InjectOptions { strict: true };
        assert!(inject(&data, &entries[1..2], &strict).is_err());
    }

    #[test]
    fn surrogate_pairs_survive() {
        let data = MsbtBuilder::new()
            .message("Emoji", "A\u{1F600}B", vec![])
            .build()
            .unwrap();
        assert_eq!(parse(&data).unwrap()[0].text, "A\u{1F600}B");
    }

    #[test]
    fn private_use_glyphs_are_not_tags() {
        let text = "Press \u{E001} or \u{E001}\u{E001}";
        let data = MsbtBuilder::new().message("Button", text, vec![]).build().unwrap();
        let units: Vec<u16> = encode_text(text, &[])
            .unwrap()
            .chunks(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(units[6], 0xE000);
        assert_eq!(units[11], 0xE001);

        let entries = parse(&data).unwrap();
        assert_eq!(entries[0].text, text);
        assert!(entries[0].tags.is_empty());
        let injected = inject(&data, &entries, &InjectOptions::default()).unwrap();
        assert_eq!(injected.written, 1);
        assert!(injected.skipped.is_empty());
        assert_eq!(injected.bytes, data);
    }
}
