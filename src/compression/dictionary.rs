//! Compression dictionaries and the filename convention that selects them.
//!
//! Titles ship their dictionaries as a pack (`ZsDic.pack.zs`): a SARC,
//! itself Zstd-compressed without a dictionary, holding one `.zsdic` file
//! per resource family:
//!
//! | Dictionary | Used for |
//! |------------|----------|
//! | `bcett.byml.zsdic` | files ending in `.bcett.byml.zs` |
//! | `pack.zsdic`       | files ending in `.pack.zs` |
//! | `zs.zsdic`         | everything else |
//!
//! Selection prefers the most specific match: the file's last two
//! extensions, then its last extension, then the general `zs` dictionary,
//! then whatever the set holds first.

#![cfg(feature = "compression")]

use log::debug;

use super::zstd::{decompress_zstd, dictionary_id, is_zstd};
use crate::formats::sarc::Sarc;
use crate::{Error, Result};

/// Extension of dictionary files inside a dictionary pack.
pub const DICTIONARY_EXTENSION: &str = ".zsdic";

/// Name of the catch-all dictionary.
pub const GENERAL_DICTIONARY: &str = "zs";

/// One named dictionary. `name` omits the `.zsdic` extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    pub name: String,
    pub data: Vec<u8>,
}

/// An ordered set of dictionaries.
#[derive(Debug, Clone, Default)]
pub struct DictionarySet {
    dictionaries: Vec<Dictionary>,
}

impl DictionarySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `.zsdic` entry from a dictionary pack.
    ///
    /// The pack may be Zstd-compressed (without a dictionary) or a bare
    /// SARC.
    pub fn from_pack(pack: &[u8]) -> Result<Self> {
        let decompressed;
        let sarc_bytes = if is_zstd(pack) {
            decompressed = decompress_zstd(pack)?;
            &decompressed[..]
        } else {
            pack
        };

        let sarc = Sarc::parse(sarc_bytes)?;
        let mut set = Self::new();
        for entry in sarc.entries(sarc_bytes)? {
            let base = entry.name.rsplit('/').next().unwrap_or(entry.name);
            if let Some(name) = base.strip_suffix(DICTIONARY_EXTENSION) {
                set.insert(name, entry.data.to_vec());
            }
        }
        debug!("loaded dictionaries: [{}]", set.names().join(", "));
        Ok(set)
    }

    /// Add a dictionary, replacing one with the same name. A trailing
    /// `.zsdic` on `name` is ignored.
    pub fn insert(&mut self, name: &str, data: Vec<u8>) {
        let name = name.strip_suffix(DICTIONARY_EXTENSION).unwrap_or(name);
        match self.dictionaries.iter_mut().find(|d| d.name == name) {
            Some(existing) => existing.data = data,
            None => self.dictionaries.push(Dictionary {
                name: name.to_owned(),
                data,
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Dictionary> {
        self.dictionaries.iter().find(|d| d.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.dictionaries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dictionaries.len()
    }

    /// Names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.dictionaries.iter().map(|d| d.name.clone()).collect()
    }

    /// The trained dictionary whose header records `id`.
    pub fn with_id(&self, id: u32) -> Option<&Dictionary> {
        self.dictionaries
            .iter()
            .find(|d| dictionary_id(&d.data) == Some(id))
    }

    /// Pick the dictionary for `file_name`.
    ///
    /// `Mals/USen.Product.pack.zs` tries `Product.pack`, then `pack`, then
    /// `zs`, then the first dictionary in the set.
    pub fn select(&self, file_name: &str) -> Result<&Dictionary> {
        let first = self.dictionaries.first().ok_or(Error::DictionaryNotFound)?;

        let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
        let base = base.strip_suffix(".zs").unwrap_or(base);
        let extensions: Vec<&str> = base.split('.').skip(1).collect();

        let mut candidates = Vec::with_capacity(3);
        if let [.., a, b] = extensions.as_slice() {
            candidates.push(format!("{a}.{b}"));
        }
        if let Some(last) = extensions.last() {
            candidates.push((*last).to_owned());
        }
        candidates.push(GENERAL_DICTIONARY.to_owned());

        let chosen = candidates
            .iter()
            .find_map(|c| self.get(c))
            .unwrap_or(first);
        debug!("{file_name}: using dictionary {}", chosen.name);
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::sarc::SarcWriter;

    fn set(names: &[&str]) -> DictionarySet {
        let mut s = DictionarySet::new();
        for n in names {
            s.insert(n, n.as_bytes().to_vec());
        }
        s
    }

    #[test]
    fn double_suffix_beats_single() {
        let s = set(&["zs", "byml", "bcett.byml"]);
        assert_eq!(s.select("Banc/Map.bcett.byml.zs").unwrap().name, "bcett.byml");
        assert_eq!(s.select("Other.byml.zs").unwrap().name, "byml");
    }

    #[test]
    fn falls_back_to_general_then_first() {
        let s = set(&["pack", "zs"]);
        assert_eq!(s.select("Mals/USen.Product.sarc.zs").unwrap().name, "zs");
        let s = set(&["pack", "bcett.byml"]);
        assert_eq!(s.select("Mals/USen.Product.sarc.zs").unwrap().name, "pack");
    }

    #[test]
    fn empty_set_has_no_dictionary() {
        assert!(matches!(
            DictionarySet::new().select("a.pack.zs"),
            Err(Error::DictionaryNotFound)
        ));
    }

    #[test]
    fn loads_pack() {
        let mut w = SarcWriter::new();
        w.add_file("zs.zsdic", b"general".to_vec())
            .add_file("pack.zsdic", b"pack".to_vec())
            .add_file("readme.txt", b"ignored".to_vec());
        let set = DictionarySet::from_pack(&w.build()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("pack").unwrap().data, b"pack");
        assert!(set.get("readme.txt").is_none());
    }
}
