//! Whole-archive extraction and rebuild.
//!
//! A localized resource archive is a (usually Zstd-compressed) SARC whose
//! entries are message tables and record tables. [`extract_archive`] turns
//! one into translatable [`ExtractedText`] units; [`build_archive`] writes
//! translations back and returns an archive of the original length,
//! recompressed with the dictionary it came with.
//!
//! Files are independent: a file that fails to parse or patch is reported
//! in the result and the remaining files are still processed. Only a
//! failure of the archive itself (decompression, SARC header) is an `Err`.

#![cfg(feature = "compression")]

use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};

use crate::compression::{DictionarySet, compress, decompress};
use crate::config::{BudgetConfig, BuildOptions};
use crate::formats::msbt::{self, MessageEntry};
use crate::formats::rtbl::{self, CellKey, TranslationMap};
use crate::formats::sarc::{self, Sarc, Skip};
use crate::hash::HashResolver;
use crate::text::prepare;
use crate::{Error, Result};

/// What an archive entry holds, judged by its magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntryKind {
    Messages,
    Records,
    Other,
}

impl EntryKind {
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(b"MsgStdBn") {
            Self::Messages
        } else if data.starts_with(b"RTBL") {
            Self::Records
        } else {
            Self::Other
        }
    }
}

/// Identity of a text unit within its file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextKey {
    /// Position in a message table.
    Message(usize),
    Cell(CellKey),
}

impl fmt::Display for TextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextKey::Message(index) => write!(f, "#{index}"),
            TextKey::Cell(key) => write!(f, "{key}"),
        }
    }
}

/// One translatable string.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtractedText {
    pub file: String,
    pub key: TextKey,
    /// Message label, when the table has one.
    pub label: Option<String>,
    pub text: String,
    /// Soft budget in encoded bytes.
    pub max_bytes: usize,
    /// Size of the slot in bytes. Message slots also hold a two-byte
    /// terminator.
    pub slot_size: usize,
}

/// A file that could not be processed.
#[derive(Debug)]
pub struct FileError {
    pub file: String,
    pub error: Error,
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file, self.error)
    }
}

/// Output of [`extract_archive`].
#[derive(Debug)]
pub struct Extraction {
    pub units: Vec<ExtractedText>,
    pub errors: Vec<FileError>,
    /// Dictionary the archive was compressed with.
    pub dictionary: Option<String>,
}

fn message_units(file: &str, data: &[u8]) -> Result<Vec<ExtractedText>> {
    Ok(msbt::parse(data)?
        .into_iter()
        .map(|entry| ExtractedText {
            file: file.to_owned(),
            key: TextKey::Message(entry.index),
            label: entry.label,
            text: entry.text,
            max_bytes: entry.slot_size.saturating_sub(2),
            slot_size: entry.slot_size,
        })
        .collect())
}

fn record_units(
    file: &str,
    data: &[u8],
    resolver: &dyn HashResolver,
    budget: &BudgetConfig,
) -> Result<Vec<ExtractedText>> {
    Ok(rtbl::parse(data, resolver)?
        .iter()
        .flat_map(|table| rtbl::extract_strings(table, file, budget))
        .map(|unit| ExtractedText {
            file: unit.file,
            key: TextKey::Cell(unit.key),
            label: None,
            text: unit.text,
            max_bytes: unit.max_bytes,
            slot_size: unit.slot_size,
        })
        .collect())
}

/// Extract every translatable string from an archive.
pub fn extract_archive(
    payload: &[u8],
    archive_name: &str,
    dictionaries: &DictionarySet,
    resolver: &dyn HashResolver,
    budget: &BudgetConfig,
) -> Result<Extraction> {
    let decompressed = decompress(payload, dictionaries, archive_name)?;
    let bytes = &decompressed.bytes;
    let archive = Sarc::parse(bytes)?;

    let mut units = Vec::new();
    let mut errors = Vec::new();
    for entry in archive.entries(bytes)? {
        let result = match EntryKind::detect(entry.data) {
            EntryKind::Messages => message_units(entry.name, entry.data),
            EntryKind::Records => record_units(entry.name, entry.data, resolver, budget),
            EntryKind::Other => continue,
        };
        match result {
            Ok(found) => {
                debug!("{archive_name}/{}: {} strings", entry.name, found.len());
                units.extend(found);
            }
            Err(error) => {
                warn!("{archive_name}/{}: {error}", entry.name);
                errors.push(FileError {
                    file: entry.name.to_owned(),
                    error,
                });
            }
        }
    }

    Ok(Extraction {
        units,
        errors,
        dictionary: decompressed.dictionary,
    })
}

/// Translations for a whole archive, keyed by file and [`TextKey`].
#[derive(Debug, Clone, Default)]
pub struct Translations {
    files: HashMap<String, HashMap<TextKey, String>>,
}

impl Translations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: &str, key: TextKey, text: impl Into<String>) {
        self.files
            .entry(file.to_owned())
            .or_default()
            .insert(key, text.into());
    }

    pub fn is_empty(&self) -> bool {
        self.files.values().all(HashMap::is_empty)
    }

    fn for_file(&self, file: &str) -> Option<&HashMap<TextKey, String>> {
        self.files.get(file).filter(|m| !m.is_empty())
    }
}

/// Per-file counters of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileStats {
    pub file: String,
    pub kind: EntryKind,
    pub written: usize,
    /// Translations that did not fit or lost their tags.
    pub rejected: usize,
}

/// Output of [`build_archive`].
#[derive(Debug)]
pub struct BuildReport {
    /// The rebuilt archive, compressed like the input.
    pub bytes: Vec<u8>,
    pub files: Vec<FileStats>,
    pub errors: Vec<FileError>,
    /// Files the archive repack refused.
    pub skipped: Vec<Skip>,
}

fn build_messages(
    data: &[u8],
    translations: &HashMap<TextKey, String>,
    options: &BuildOptions,
) -> Result<(Vec<u8>, usize, usize)> {
    let entries: Vec<MessageEntry> = msbt::parse(data)?
        .into_iter()
        .filter_map(|entry| {
            let translation = translations.get(&TextKey::Message(entry.index))?;
            let text = prepare(&entry.text, translation, &options.patch);
            Some(MessageEntry { text, ..entry })
        })
        .collect();
    let injected = msbt::inject(data, &entries, &options.inject)?;
    Ok((injected.bytes, injected.written, injected.skipped.len()))
}

fn build_records(
    data: &[u8],
    resolver: &dyn HashResolver,
    translations: &HashMap<TextKey, String>,
    options: &BuildOptions,
) -> Result<(Vec<u8>, usize, usize)> {
    let map: TranslationMap = translations
        .iter()
        .filter_map(|(key, text)| match key {
            TextKey::Cell(cell) => Some((cell.clone(), text.clone())),
            TextKey::Message(_) => None,
        })
        .collect();
    let outcome = rtbl::patch(data, resolver, &map, &options.patch)?;
    Ok((outcome.bytes, outcome.patched, outcome.overflows.len()))
}

/// Write `translations` into an archive.
///
/// Every entry keeps its size, so the rebuilt archive has the layout of the
/// original. Compressed input is recompressed with the same dictionary.
pub fn build_archive(
    payload: &[u8],
    archive_name: &str,
    dictionaries: &DictionarySet,
    resolver: &dyn HashResolver,
    translations: &Translations,
    options: &BuildOptions,
) -> Result<BuildReport> {
    let decompressed = decompress(payload, dictionaries, archive_name)?;
    let bytes = &decompressed.bytes;
    let archive = Sarc::parse(bytes)?;

    let mut replacements = Vec::new();
    let mut files = Vec::new();
    let mut errors = Vec::new();
    for entry in archive.entries(bytes)? {
        let Some(file_translations) = translations.for_file(entry.name) else {
            continue;
        };
        let kind = EntryKind::detect(entry.data);
        let result = match kind {
            EntryKind::Messages => build_messages(entry.data, file_translations, options),
            EntryKind::Records => build_records(entry.data, resolver, file_translations, options),
            EntryKind::Other => Err(Error::Parse("translations given for a file with no text")),
        };
        match result {
            Ok((data, written, rejected)) => {
                debug!("{archive_name}/{}: {written} written, {rejected} rejected", entry.name);
                files.push(FileStats {
                    file: entry.name.to_owned(),
                    kind,
                    written,
                    rejected,
                });
                replacements.push((entry.name.to_owned(), data));
            }
            Err(error) => {
                warn!("{archive_name}/{}: {error}", entry.name);
                errors.push(FileError {
                    file: entry.name.to_owned(),
                    error,
                });
            }
        }
    }

    let packed = sarc::pack(bytes, &replacements, &options.pack)?;
    let out = if decompressed.was_compressed {
        let dictionary = decompressed
            .dictionary
            .as_deref()
            .and_then(|name| dictionaries.get(name));
        compress(&packed.bytes, dictionary, options.compression.level)
    } else {
        packed.bytes
    };

    Ok(BuildReport {
        bytes: out,
        files,
        errors,
        skipped: packed.skipped,
    })
}
