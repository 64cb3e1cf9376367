//! Hashed label resolution.
//!
//! Record tables store table and column names as 32-bit hashes. Resolving
//! them needs names from outside the file, so resolution is modelled as a
//! partial function: a hash either maps to exactly one known name or it is
//! rendered as hex. Names are never guessed.

use std::collections::HashMap;

use crate::formats::sarc::{DEFAULT_HASH_MULTIPLIER, sarc_hash};

/// Hash a label the way record tables do (the SARC filename hash, multiplier
/// 101).
pub fn label_hash(name: &str) -> u32 {
    sarc_hash(name.as_bytes(), DEFAULT_HASH_MULTIPLIER)
}

/// Render an unresolved hash.
pub fn hex_label(hash: u32) -> String {
    format!("0x{hash:08X}")
}

/// Maps a label hash back to its name.
pub trait HashResolver {
    /// The name for `hash`, or `None` when it is unknown.
    fn resolve(&self, hash: u32) -> Option<String>;

    /// The name for `hash`, falling back to [`hex_label`].
    fn label(&self, hash: u32) -> String {
        self.resolve(hash).unwrap_or_else(|| hex_label(hash))
    }
}

impl<F> HashResolver for F
where
    F: Fn(u32) -> Option<String>,
{
    fn resolve(&self, hash: u32) -> Option<String> {
        self(hash)
    }
}

/// Resolves nothing; every label renders as hex.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNames;

impl HashResolver for NoNames {
    fn resolve(&self, _hash: u32) -> Option<String> {
        None
    }
}

/// A resolver built from candidate names.
///
/// If two different names hash to the same value the hash becomes
/// ambiguous and resolves to nothing.
#[derive(Debug, Clone, Default)]
pub struct NameDictionary {
    names: HashMap<u32, Option<String>>,
}

impl NameDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate name.
    pub fn insert(&mut self, name: &str) {
        let hash = label_hash(name);
        self.names
            .entry(hash)
            .and_modify(|existing| {
                if existing.as_deref() != Some(name) {
                    *existing = None;
                }
            })
            .or_insert_with(|| Some(name.to_owned()));
    }

    /// Hashes that more than one candidate name produced.
    pub fn collisions(&self) -> impl Iterator<Item = u32> + '_ {
        self.names
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
    }
}

impl<S: AsRef<str>> FromIterator<S> for NameDictionary {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut dict = Self::new();
        for name in iter {
            dict.insert(name.as_ref());
        }
        dict
    }
}

impl HashResolver for NameDictionary {
    fn resolve(&self, hash: u32) -> Option<String> {
        self.names.get(&hash).cloned().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_and_renders_unknown() {
        let dict: NameDictionary = ["ItemName", "Price"].into_iter().collect();
        assert_eq!(dict.label(label_hash("ItemName")), "ItemName");
        assert_eq!(dict.label(0xDEAD_BEEF), "0xDEADBEEF");
    }

    #[test]
    fn collisions_resolve_to_nothing() {
        // With multiplier 101, "a\x65" and "b\x00" collide: 97*101+101 == 98*101.
        let a = "a\u{65}";
        let b = "b\u{0}";
        assert_eq!(label_hash(a), label_hash(b));
        let dict: NameDictionary = [a, b].into_iter().collect();
        assert_eq!(dict.resolve(label_hash(a)), None);
        assert_eq!(dict.collisions().count(), 1);
    }

    #[test]
    fn closures_are_resolvers() {
        let resolver = |h: u32| (h == 1).then(|| "one".to_string());
        assert_eq!(resolver.label(1), "one");
        assert_eq!(resolver.label(2), "0x00000002");
    }
}
