//! Dictionary-seeded compression adapter (requires the `compression` feature).
//!
//! The adapter sits at both ends of an archive build:
//!
//! * [`decompress`] turns whatever the game shipped into a bare SARC. A
//!   payload without the Zstd magic is passed through untouched, so callers
//!   never need to know whether a file was compressed.
//! * [`compress`] puts the rebuilt SARC back, using the dictionary that
//!   [`decompress`] reported. It never fails: if Zstd refuses, the build
//!   keeps the uncompressed bytes and logs a warning.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`zstd`]       | Frame detection, raw compress/decompress |
//! | [`dictionary`] | [`DictionarySet`] and filename-based selection |

#[cfg(feature = "compression")]
pub mod dictionary;

#[cfg(feature = "compression")]
pub mod zstd;

#[cfg(feature = "compression")]
pub use self::adapter::*;

#[cfg(feature = "compression")]
pub use dictionary::{Dictionary, DictionarySet};

#[cfg(feature = "compression")]
mod adapter {
    use log::{debug, warn};

    use super::dictionary::{Dictionary, DictionarySet};
    use super::zstd::{
        compress_zstd, decompress_zstd, decompress_zstd_with_dictionary, frame_dictionary_id,
        is_zstd,
    };
    use crate::{Error, Result};

    /// Output of [`decompress`].
    #[derive(Debug, Clone)]
    pub struct Decompressed {
        pub bytes: Vec<u8>,
        /// Whether the input was a Zstd frame at all.
        pub was_compressed: bool,
        /// Dictionary used, to be handed back to [`compress`].
        pub dictionary: Option<String>,
    }

    /// Decompress `payload` if it is a Zstd frame.
    ///
    /// Frames that declare a dictionary id are decompressed with the trained
    /// dictionary carrying that id, or else the one [`DictionarySet::select`]
    /// picks for `file_name`; frames without one are decompressed plainly.
    /// Non-frames are returned as-is.
    pub fn decompress(
        payload: &[u8],
        dictionaries: &DictionarySet,
        file_name: &str,
    ) -> Result<Decompressed> {
        if !is_zstd(payload) {
            return Ok(Decompressed {
                bytes: payload.to_vec(),
                was_compressed: false,
                dictionary: None,
            });
        }

        let Some(frame_id) = frame_dictionary_id(payload) else {
            debug!("{file_name}: frame declares no dictionary");
            let bytes = decompress_zstd(payload).map_err(|_| Error::Decompression {
                dictionary: None,
                available: dictionaries.names(),
            })?;
            return Ok(Decompressed {
                bytes,
                was_compressed: true,
                dictionary: None,
            });
        };

        let dict = match dictionaries.with_id(frame_id) {
            Some(dict) => dict,
            None => dictionaries.select(file_name)?,
        };
        debug!(
            "{file_name}: frame wants dictionary {frame_id:#010x}, trying {}",
            dict.name
        );
        let bytes = decompress_zstd_with_dictionary(payload, &dict.data).map_err(|_| {
            Error::Decompression {
                dictionary: Some(dict.name.clone()),
                available: dictionaries.names(),
            }
        })?;
        Ok(Decompressed {
            bytes,
            was_compressed: true,
            dictionary: Some(dict.name.clone()),
        })
    }

    /// Compress `bytes`, with `dictionary` when one was used to decompress.
    ///
    /// On failure the uncompressed bytes are returned and a warning logged;
    /// a build is never lost to a compression error.
    pub fn compress(bytes: &[u8], dictionary: Option<&Dictionary>, level: i32) -> Vec<u8> {
        match compress_zstd(bytes, dictionary.map(|d| d.data.as_slice()), level) {
            Ok(out) => out,
            Err(e) => {
                warn!(
                    "compression with dictionary {} failed, writing uncompressed: {e}",
                    dictionary.map_or("none", |d| d.name.as_str())
                );
                bytes.to_vec()
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::compression::zstd::DICTIONARY_MAGIC;

        #[test]
        fn passthrough_when_not_compressed() {
            let out = decompress(b"SARC....", &DictionarySet::new(), "a.pack.zs").unwrap();
            assert_eq!(out.bytes, b"SARC....");
            assert!(!out.was_compressed);
            assert_eq!(out.dictionary, None);
        }

        #[test]
        fn dictionary_less_round_trip() {
            let data = b"plain archive bytes ".repeat(16);
            let packed = compress(&data, None, 3);
            let out = decompress(&packed, &DictionarySet::new(), "a.sarc.zs").unwrap();
            assert_eq!(out.bytes, data);
            assert!(out.was_compressed);
        }

        #[test]
        fn missing_dictionary_is_reported() {
            // single-segment frame header declaring dictionary id 7
            let frame = [0x28, 0xB5, 0x2F, 0xFD, 0x21, 0x07, 0x00];
            assert!(matches!(
                decompress(&frame, &DictionarySet::new(), "a.pack.zs"),
                Err(Error::DictionaryNotFound)
            ));
        }

        #[test]
        fn frame_id_beats_file_name() {
            let trained = |id: u32| {
                let mut dict = DICTIONARY_MAGIC.to_vec();
                dict.extend_from_slice(&id.to_le_bytes());
                dict.extend_from_slice(b"junk");
                dict
            };
            let mut set = DictionarySet::new();
            set.insert("pack", trained(1));
            set.insert("bcett.byml", trained(7));
            assert_eq!(set.with_id(7).map(|d| d.name.as_str()), Some("bcett.byml"));
            assert!(set.with_id(9).is_none());

            let frame = [0x28, 0xB5, 0x2F, 0xFD, 0x21, 0x07, 0x00];
            match decompress(&frame, &set, "a.pack.zs") {
                Err(Error::Decompression { dictionary, .. }) => {
                    assert_eq!(dictionary.as_deref(), Some("bcett.byml"));
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn compress_falls_back_to_plain_bytes() {
            let mut junk = DICTIONARY_MAGIC.to_vec();
            junk.extend_from_slice(&[0xFF; 32]);
            let dictionary = Dictionary {
                name: "zs".to_owned(),
                data: junk,
            };
            let data = b"archive bytes".repeat(8);
            assert_eq!(compress(&data, Some(&dictionary), 3), data);
        }

        #[test]
        fn failed_decompression_names_dictionaries() {
            let frame = [0x28, 0xB5, 0x2F, 0xFD, 0x21, 0x07, 0x00];
            let mut set = DictionarySet::new();
            set.insert("zs.zsdic", b"not really a dictionary".to_vec());
            set.insert("pack.zsdic", b"nor this".to_vec());
            match decompress(&frame, &set, "a.pack.zs") {
                Err(Error::Decompression {
                    dictionary,
                    available,
                }) => {
                    assert_eq!(dictionary.as_deref(), Some("pack"));
                    assert_eq!(available, vec!["zs".to_string(), "pack".to_string()]);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
